//! LDAP search filters.
//!
//! [`SearchFilter`] trees are parsed from their RFC 4515 string form,
//! rendered back with [`Display`](std::fmt::Display), and evaluated against
//! entries by a [`FilterEvaluator`] under three-valued logic.
//!
//! # Examples
//!
//! ```rust
//! use dirsrv_core::filter::{FilterEvaluator, SearchFilter};
//! use dirsrv_core::entry::{Attribute, Entry};
//! use dirsrv_core::{Dn, Schema};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::with_core_schema()?;
//! let mut entry = Entry::with_object_classes(
//!     Dn::parse("cn=Babs Jensen,dc=example,dc=com")?,
//!     &schema,
//!     &["top", "person"],
//! );
//! let mut duplicates = Vec::new();
//! entry.add_attribute(
//!     &schema,
//!     Attribute::new(schema.attribute_type_or_default("cn"), ["Babs Jensen"]),
//!     &mut duplicates,
//! );
//!
//! let filter = SearchFilter::parse("(&(objectClass=person)(cn=B*ens*n))", &schema)?;
//! assert!(FilterEvaluator::new(&schema).matches_entry(&filter, &entry)?);
//! # Ok(())
//! # }
//! ```

pub mod display;
pub mod evaluate;
pub mod parser;
pub mod types;

pub use display::escape_value;
pub use evaluate::FilterEvaluator;
pub use parser::MAX_PARSE_NESTING;
pub use types::{AttributeValueAssertion, ExtensibleMatchAssertion, SearchFilter, SubstringAssertion};
