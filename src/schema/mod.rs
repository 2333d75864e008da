//! Schema elements and the schema registry.
//!
//! This module implements the RFC 4512 schema model: syntaxes, matching
//! rules, attribute types, object classes, name forms, DIT content rules,
//! DIT structure rules and matching rule uses, held in a concurrent
//! [`Schema`] registry.
//!
//! # Key Types
//!
//! - [`Schema`] - Registry holding every element kind with OID and name lookup
//! - [`AttributeType`] / [`ObjectClass`] - The elements entries are checked against
//! - [`ConcatenatedSchema`] - Single-file snapshot used to detect offline schema edits
//!
//! # Examples
//!
//! ```rust
//! use dirsrv_core::schema::{Schema, SchemaElement};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::with_core_schema()?;
//! let cn = schema.attribute_type("commonName").expect("core type");
//! assert_eq!(cn.oid(), "2.5.4.3");
//! # Ok(())
//! # }
//! ```

pub mod concat;
pub mod definition;
pub mod embedded;
pub mod matching;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use concat::ConcatenatedSchema;
pub use definition::with_schema_file;
pub use matching::{ConditionResult, MatchingAlgorithm, parse_generalized_time};
pub use registry::{DefinitionKind, Schema, SubTypes};
pub use types::{
    AttributeType, AttributeUsage, DitContentRule, DitStructureRule, MatchingRule,
    MatchingRuleKind, MatchingRuleUse, NameForm, ObjectClass, ObjectClassKind, SchemaElement,
    SchemaElementRef, Syntax,
};
