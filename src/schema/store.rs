use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::validator::Validator;
use crate::error::JobsetError;

const JOBSET_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["jobs"],
    "properties": {
        "jobs": { "type": "array", "items": { "$ref": "job" } }
    }
}"#;

const JOB_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["product_id"],
    "properties": {
        "product_id": { "type": "string" },
        "job_id": { "type": "string" },
        "job_status": { "type": "string" },
        "errors": { "type": "array", "items": { "type": "string" } },
        "traceback": { "type": "string" }
    }
}"#;

/// JSON value kinds a schema node can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl SchemaType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::String => value.is_string(),
            SchemaType::Integer => value.is_i64() || value.is_u64(),
            SchemaType::Number => value.is_number(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Null => value.is_null(),
        }
    }
}

/// The `type` keyword: one kind, or a list of acceptable kinds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SchemaKind {
    One(SchemaType),
    Any(Vec<SchemaType>),
}

impl SchemaKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaKind::One(kind) => kind.matches(value),
            SchemaKind::Any(kinds) => kinds.iter().any(|k| k.matches(value)),
        }
    }

    /// Lowercase description used in validation messages.
    pub fn describe(&self) -> String {
        let names = match self {
            SchemaKind::One(kind) => vec![*kind],
            SchemaKind::Any(kinds) => kinds.clone(),
        };
        names
            .iter()
            .map(|k| format!("{k:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

fn allow_additional() -> bool {
    true
}

/// One node of a structural schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaNode {
    /// Required JSON kind(s); any kind when absent.
    #[serde(rename = "type")]
    pub kind: Option<SchemaKind>,
    /// Keys that must be present when the value is an object.
    #[serde(default)]
    pub required: Vec<String>,
    /// Per-key child schemas for object values.
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaNode>,
    /// Schema every element of an array value must satisfy.
    pub items: Option<Box<SchemaNode>>,
    /// Name of another schema in the same store.
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
    /// Closed set of permitted values.
    #[serde(rename = "enum")]
    pub allowed: Option<Vec<Value>>,
    #[serde(rename = "minItems")]
    pub min_items: Option<usize>,
    #[serde(rename = "maxItems")]
    pub max_items: Option<usize>,
    /// When false, object keys outside `properties` are rejected.
    #[serde(rename = "additionalProperties", default = "allow_additional")]
    pub additional_properties: bool,
}

impl SchemaNode {
    fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(r) = &self.reference {
            out.push(r.as_str());
        }
        for node in self.properties.values() {
            node.collect_references(out);
        }
        if let Some(items) = &self.items {
            items.collect_references(out);
        }
    }
}

/// Named schemas, resolvable by name and by `$ref` from one another.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    schemas: HashMap<String, SchemaNode>,
    prefix: Option<String>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the `jobset` and `job` schemas.
    pub fn builtin() -> Result<Self, JobsetError> {
        let mut store = Self::new();
        store.insert_json("jobset", JOBSET_SCHEMA)?;
        store.insert_json("job", JOB_SCHEMA)?;
        Ok(store)
    }

    /// Strip `prefix` from names before lookup, so `<prefix>jobset` and
    /// `jobset` resolve to the same schema.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.schemas.insert(name.into(), node);
    }

    pub fn insert_json(&mut self, name: impl Into<String>, json: &str) -> Result<(), JobsetError> {
        let node: SchemaNode = serde_json::from_str(json)?;
        self.insert(name, node);
        Ok(())
    }

    /// Load every `<name>.json` file in `dir`, replacing same-named schemas.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, JobsetError> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = std::fs::read_to_string(&path)?;
            self.insert_json(name, &contents)?;
            debug!(schema = name, path = %path.display(), "Loaded schema");
            loaded += 1;
        }
        Ok(loaded)
    }

    fn normalize<'a>(&self, name: &'a str) -> &'a str {
        strip_prefix(self.prefix.as_deref(), name)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.schemas.get(self.normalize(name))
    }

    /// Compile the named schema into a validator.
    ///
    /// Every `$ref` reachable from the root must resolve; a dangling reference
    /// fails here rather than during validation. So does a chain of bare
    /// `$ref`s that leads back to itself.
    pub fn compile(&self, name: &str) -> Result<Validator, JobsetError> {
        let root = self.normalize(name).to_string();
        let mut pending = vec![root.clone()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if seen.contains(&current) {
                continue;
            }
            let node = self
                .get(&current)
                .ok_or_else(|| JobsetError::SchemaNotFound(current.clone()))?;
            pending.extend(node.references().into_iter().map(|r| self.normalize(r).to_string()));
            seen.push(current);
        }

        let schemas: HashMap<String, SchemaNode> = seen
            .into_iter()
            .filter_map(|n| self.schemas.get(&n).cloned().map(|s| (n, s)))
            .collect();
        for name in schemas.keys() {
            self.check_ref_chain(name, &schemas)?;
        }
        Ok(Validator::new(root, Arc::new(schemas), self.prefix.clone()))
    }

    /// Follow top-level `$ref`s from `start`. These resolve against the same
    /// value, so revisiting a name would never terminate during validation.
    fn check_ref_chain(
        &self,
        start: &str,
        schemas: &HashMap<String, SchemaNode>,
    ) -> Result<(), JobsetError> {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(next) = schemas.get(current).and_then(|n| n.reference.as_deref()) {
            let next = self.normalize(next);
            if chain.contains(&next) {
                chain.push(next);
                return Err(JobsetError::SchemaCycle(chain.join(" -> ")));
            }
            chain.push(next);
            current = next;
        }
        Ok(())
    }
}

/// `name` without the store prefix, if it carries one.
pub(super) fn strip_prefix<'a>(prefix: Option<&str>, name: &'a str) -> &'a str {
    match prefix {
        Some(prefix) => name.strip_prefix(prefix).unwrap_or(name),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_contains_jobset_and_job() {
        let store = SchemaStore::builtin().unwrap();
        assert!(store.get("jobset").is_some());
        assert!(store.get("job").is_some());
        assert!(store.get("granule").is_none());
    }

    #[test]
    fn prefix_is_stripped_on_lookup() {
        let store = SchemaStore::builtin().unwrap().with_prefix("sds-");
        assert!(store.get("sds-jobset").is_some());
        assert!(store.compile("sds-jobset").is_ok());
    }

    #[test]
    fn dangling_reference_fails_compile() {
        let mut store = SchemaStore::new();
        store
            .insert_json("jobset", r#"{"type":"object","properties":{"jobs":{"$ref":"missing"}}}"#)
            .unwrap();
        let err = store.compile("jobset").unwrap_err();
        assert!(matches!(err, JobsetError::SchemaNotFound(name) if name == "missing"));
    }

    #[test]
    fn unknown_root_fails_compile() {
        let store = SchemaStore::builtin().unwrap();
        assert!(matches!(
            store.compile("nope"),
            Err(JobsetError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn type_matching() {
        assert!(SchemaType::Integer.matches(&json!(3)));
        assert!(!SchemaType::Integer.matches(&json!(3.5)));
        assert!(SchemaType::Number.matches(&json!(3.5)));
        assert!(SchemaType::Null.matches(&Value::Null));
    }

    #[test]
    fn type_keyword_accepts_a_list() {
        let node: SchemaNode = serde_json::from_str(r#"{"type":["string","null"]}"#).unwrap();
        let kind = node.kind.unwrap();
        assert_eq!(kind, SchemaKind::Any(vec![SchemaType::String, SchemaType::Null]));
        assert!(kind.matches(&json!("x")));
        assert!(kind.matches(&Value::Null));
        assert!(!kind.matches(&json!(1)));
        assert_eq!(kind.describe(), "string or null");
    }

    #[test]
    fn self_referencing_chain_fails_compile() {
        let mut store = SchemaStore::new();
        store.insert_json("a", r#"{"$ref":"b"}"#).unwrap();
        store.insert_json("b", r#"{"$ref":"a"}"#).unwrap();
        let err = store.compile("a").unwrap_err();
        assert!(matches!(err, JobsetError::SchemaCycle(_)));
    }

    #[test]
    fn recursion_through_properties_is_allowed() {
        let mut store = SchemaStore::new();
        store
            .insert_json(
                "tree",
                r#"{"type":"object","properties":{"children":{"type":"array","items":{"$ref":"tree"}}}}"#,
            )
            .unwrap();
        assert!(store.compile("tree").is_ok());
    }

    #[test]
    fn load_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("job.json"),
            r#"{"type":"object","required":["product_id","job_id"]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut store = SchemaStore::builtin().unwrap();
        let loaded = store.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(store.get("job").unwrap().required, vec!["product_id", "job_id"]);
    }
}
