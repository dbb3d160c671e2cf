//! Semantic version parsing for job-spec release tags.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)").expect("valid version regex")
});

/// A `major.minor.patch` version, ordered field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Find the first `x.y.z` inside `s` (so `v1.2.3-rc` parses as 1.2.3).
    pub fn find(s: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(s)?;
        Some(Self {
            major: caps["major"].parse().ok()?,
            minor: caps["minor"].parse().ok()?,
            patch: caps["patch"].parse().ok()?,
        })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Result of resolving which job-spec version to submit against.
#[derive(Debug, Clone, PartialEq)]
pub enum JobVersion {
    /// Pinned via the `sds_pcm_release_tag` parameter; no lookup made.
    ReleaseTag(String),
    /// Newest spec found in the search index.
    Spec { version: SemVer, source: Value },
}

impl JobVersion {
    /// The version string to submit with.
    pub fn tag(&self) -> String {
        match self {
            JobVersion::ReleaseTag(tag) => tag.clone(),
            JobVersion::Spec { source, version } => source
                .get("job-version")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| version.to_string()),
        }
    }
}

/// Pick the spec with the highest version from search hits' `_source`s.
///
/// Hits without a parseable `job-version` are skipped. Among equal versions
/// the first hit wins.
pub fn newest(sources: Vec<Value>) -> Option<(SemVer, Value)> {
    let mut best: Option<(SemVer, Value)> = None;
    for source in sources {
        let Some(version) = source
            .get("job-version")
            .and_then(Value::as_str)
            .and_then(SemVer::find)
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(current, _)| version > *current) {
            best = Some((version, source));
        }
    }
    best
}
