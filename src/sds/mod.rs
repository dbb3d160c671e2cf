//! Client for the science data system: a credentialed HTTP session plus
//! job-spec version lookups against its search index.

pub mod client;
pub mod error;
pub mod version;

pub use client::SdsClient;
pub use error::SdsError;
pub use version::{JobVersion, SemVer};
