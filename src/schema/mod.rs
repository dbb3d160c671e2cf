//! Structural validation of jobsets at the transport boundary.
//!
//! A [`SchemaStore`] holds named schemas written in a small subset of JSON
//! Schema (`type`, including a list of types, `properties`, `required`, `items`, `$ref`, `enum`,
//! `minItems`, `maxItems`, `additionalProperties`). Compiling a schema by
//! name yields a [`Validator`], which checks a raw value and decodes it into
//! a typed [`JobSet`](crate::job::JobSet).

mod store;
mod validator;

pub use store::{SchemaKind, SchemaNode, SchemaStore, SchemaType};
pub use validator::{JobsetValidator, SchemaError, Validator};
