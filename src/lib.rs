//! Directory server core library for Rust.
//!
//! Provides the schema model, entry model and search filter engine of an
//! LDAP directory server, independent of any protocol front end or storage
//! backend.
//!
//! # Core Components
//!
//! - [`Schema`] - Concurrent registry of RFC 4512 schema elements
//! - [`Entry`] - Directory entries with schema checking, binary encoding and LDIF
//! - [`SearchFilter`] - RFC 4515 filters parsed from strings
//! - [`FilterEvaluator`] - Three-valued filter evaluation against entries
//!
//! # Quick Start
//!
//! ```rust
//! use dirsrv_core::{DirectoryConfig, Dn, Entry, FilterEvaluator, Schema, SearchFilter};
//! use dirsrv_core::entry::{Attribute, ParentEntry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::with_core_schema()?;
//! let config = DirectoryConfig::default();
//!
//! let mut entry = Entry::with_object_classes(
//!     Dn::parse("cn=Babs Jensen,dc=example,dc=com")?,
//!     &schema,
//!     &["top", "person"],
//! );
//! let mut duplicates = Vec::new();
//! for (name, value) in [("cn", "Babs Jensen"), ("sn", "Jensen")] {
//!     entry.add_attribute(
//!         &schema,
//!         Attribute::new(schema.attribute_type_or_default(name), [value]),
//!         &mut duplicates,
//!     );
//! }
//! entry.conforms_to_schema(&schema, &config, ParentEntry::Provided(None))?;
//!
//! let filter = SearchFilter::parse("(&(objectClass=person)(sn=jensen))", &schema)?;
//! assert!(FilterEvaluator::from_config(&schema, &config).matches_entry(&filter, &entry)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod schema;

// Re-export commonly used types for convenience
pub use config::{AcceptRejectWarn, DirectoryConfig, EntryEncodeConfig};
pub use dn::{Ava, Dn, Rdn};
pub use entry::{Attribute, AttributeValue, CompressedSchema, Entry, Modification, ModificationType};
pub use error::{
    DecodeError, DirectoryError, DirectoryResult, DnError, FilterError, FilterResult, LdifError,
    ModificationError, ResultCode, SchemaError, SchemaResult, SchemaViolation,
};
pub use filter::{FilterEvaluator, SearchFilter};
pub use schema::{AttributeType, ConditionResult, ObjectClass, Schema};
