use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::store::{SchemaNode, strip_prefix};
use crate::job::JobSet;

/// A value did not conform to its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct SchemaError {
    /// JSONPath-like location of the offending value, e.g. `$.jobs[2].product_id`.
    pub path: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Checks raw transport payloads and decodes them into jobsets.
///
/// Used on both ingress and egress.
pub trait JobsetValidator: Send + Sync {
    fn validate(&self, raw: &Value) -> Result<JobSet, SchemaError>;
}

/// A compiled schema: a root name plus every schema it references.
#[derive(Clone)]
pub struct Validator {
    root: String,
    schemas: Arc<HashMap<String, SchemaNode>>,
    prefix: Option<String>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("root", &self.root)
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

impl Validator {
    pub(super) fn new(
        root: String,
        schemas: Arc<HashMap<String, SchemaNode>>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            root,
            schemas,
            prefix,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Structural check only, without decoding.
    pub fn check(&self, raw: &Value) -> Result<(), SchemaError> {
        let root = self.lookup(&self.root, "$")?;
        self.check_node(root, raw, "$")
    }

    fn lookup(&self, name: &str, path: &str) -> Result<&SchemaNode, SchemaError> {
        self.schemas
            .get(strip_prefix(self.prefix.as_deref(), name))
            .ok_or_else(|| SchemaError::new(path, format!("unresolved schema reference `{name}`")))
    }

    fn check_node(&self, node: &SchemaNode, value: &Value, path: &str) -> Result<(), SchemaError> {
        if let Some(name) = &node.reference {
            let target = self.lookup(name, path)?;
            self.check_node(target, value, path)?;
        }

        if let Some(kind) = &node.kind
            && !kind.matches(value)
        {
            return Err(SchemaError::new(path, format!("expected {}", kind.describe())));
        }

        if let Some(allowed) = &node.allowed
            && !allowed.contains(value)
        {
            return Err(SchemaError::new(path, "value not in enum"));
        }

        if let Value::Object(map) = value {
            for key in &node.required {
                if !map.contains_key(key) {
                    return Err(SchemaError::new(path, format!("missing required property `{key}`")));
                }
            }
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                match node.properties.get(key) {
                    Some(child_node) => self.check_node(child_node, child, &child_path)?,
                    None if !node.additional_properties => {
                        return Err(SchemaError::new(child_path, "additional property not allowed"));
                    }
                    None => {}
                }
            }
        }

        if let Value::Array(items) = value {
            if let Some(min) = node.min_items
                && items.len() < min
            {
                return Err(SchemaError::new(path, format!("expected at least {min} items")));
            }
            if let Some(max) = node.max_items
                && items.len() > max
            {
                return Err(SchemaError::new(path, format!("expected at most {max} items")));
            }
            if let Some(item_node) = &node.items {
                for (i, item) in items.iter().enumerate() {
                    self.check_node(item_node, item, &format!("{path}[{i}]"))?;
                }
            }
        }

        Ok(())
    }
}

impl JobsetValidator for Validator {
    fn validate(&self, raw: &Value) -> Result<JobSet, SchemaError> {
        self.check(raw)?;
        serde_json::from_value(raw.clone()).map_err(|e| SchemaError::new("$", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaStore;
    use serde_json::json;

    fn jobset_validator() -> Validator {
        SchemaStore::builtin().unwrap().compile("jobset").unwrap()
    }

    #[test]
    fn accepts_valid_jobset() {
        let raw = json!({
            "jobs": [
                {"product_id": "a", "job_id": "1", "job_status": "new"},
                {"product_id": "b", "errors": ["x"], "extra": {"nested": true}}
            ]
        });
        let set = jobset_validator().validate(&raw).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.jobs[1].errors, Some(vec!["x".to_string()]));
    }

    #[test]
    fn rejects_missing_jobs_key() {
        let err = jobset_validator().validate(&json!({"items": []})).unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.reason.contains("jobs"));
    }

    #[test]
    fn reports_nested_path() {
        let raw = json!({"jobs": [{"product_id": "a"}, {"product_id": 42}]});
        let err = jobset_validator().validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.jobs[1].product_id");
        assert_eq!(err.reason, "expected string");
    }

    #[test]
    fn rejects_non_string_errors_entry() {
        let raw = json!({"jobs": [{"product_id": "a", "errors": ["ok", 3]}]});
        let err = jobset_validator().validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.jobs[0].errors[1]");
    }

    #[test]
    fn enforces_item_bounds_and_closed_objects() {
        let mut store = SchemaStore::builtin().unwrap();
        store
            .insert_json(
                "jobset",
                r#"{"type":"object","required":["jobs"],"additionalProperties":false,
                    "properties":{"jobs":{"type":"array","minItems":1,"maxItems":2,"items":{"$ref":"job"}}}}"#,
            )
            .unwrap();
        let validator = store.compile("jobset").unwrap();

        let empty = validator.check(&json!({"jobs": []})).unwrap_err();
        assert_eq!(empty.reason, "expected at least 1 items");

        let extra = validator
            .check(&json!({"jobs": [{"product_id": "a"}], "meta": 1}))
            .unwrap_err();
        assert_eq!(extra.path, "$.meta");

        let too_many = json!({"jobs": [{"product_id": "a"}, {"product_id": "b"}, {"product_id": "c"}]});
        assert!(validator.check(&too_many).is_err());
    }

    #[test]
    fn prefixed_reference_resolves() {
        let mut store = SchemaStore::builtin().unwrap().with_prefix("swodlr-");
        store
            .insert_json(
                "jobset",
                r#"{"type":"object","required":["jobs"],
                    "properties":{"jobs":{"type":"array","items":{"$ref":"swodlr-job"}}}}"#,
            )
            .unwrap();
        let validator = store.compile("swodlr-jobset").unwrap();

        let set = validator.validate(&json!({"jobs": [{"product_id": "a"}]})).unwrap();
        assert_eq!(set.jobs[0].product_id, "a");
        let err = validator.check(&json!({"jobs": [{"job_id": "1"}]})).unwrap_err();
        assert_eq!(err.path, "$.jobs[0]");
    }

    #[test]
    fn nullable_property_via_type_list() {
        let mut store = SchemaStore::new();
        store
            .insert_json(
                "job",
                r#"{"type":"object","properties":{"job_id":{"type":["string","null"]}}}"#,
            )
            .unwrap();
        let validator = store.compile("job").unwrap();
        assert!(validator.check(&json!({"job_id": null})).is_ok());
        let err = validator.check(&json!({"job_id": 7})).unwrap_err();
        assert_eq!(err.reason, "expected string or null");
    }

    #[test]
    fn enum_constraint() {
        let mut store = SchemaStore::new();
        store
            .insert_json("status", r#"{"type":"string","enum":["new","job-failed"]}"#)
            .unwrap();
        let validator = store.compile("status").unwrap();
        assert!(validator.check(&json!("new")).is_ok());
        assert!(validator.check(&json!("job-started")).is_err());
    }
}
