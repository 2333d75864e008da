//! The directory entry model.
//!
//! An [`Entry`] is a DN plus object classes and attributes, checked against
//! a [`Schema`](crate::schema::Schema), modified through
//! [`Modification`]s, encoded for storage and rendered as LDIF.
//!
//! # Examples
//!
//! ```rust
//! use dirsrv_core::entry::{Attribute, Entry, Modification};
//! use dirsrv_core::{Dn, Schema};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::with_core_schema()?;
//! let mut entry = Entry::with_object_classes(
//!     Dn::parse("uid=bjensen,dc=example,dc=com")?,
//!     &schema,
//!     &["top", "person"],
//! );
//! let cn = schema.attribute_type_or_default("cn");
//! entry.apply_modification(&schema, &Modification::add(Attribute::new(cn, ["Babs Jensen"])))?;
//! assert!(entry.to_ldif().contains("cn: Babs Jensen"));
//! # Ok(())
//! # }
//! ```

pub mod attribute;
pub mod codec;
pub mod compressed;
#[allow(clippy::module_inception)]
pub mod entry;
pub mod ldif;
pub mod modification;
pub mod validation;
pub mod virtual_attrs;

pub use attribute::{Attribute, AttributeBuilder, AttributeDescription, AttributeValue, split_options};
pub use codec::{ENCODING_VERSION_1, ENCODING_VERSION_2};
pub use compressed::CompressedSchema;
pub use entry::{AttributeMap, Entry, SearchScope};
pub use ldif::{ExportDecision, LdifExportConfig, LdifExportPlugin};
pub use modification::{Modification, ModificationType};
pub use validation::{EntryLocator, ParentEntry, ParentLookup};
pub use virtual_attrs::{
    ConflictBehavior, EntryDnProvider, EntryUuidProvider, SubschemaSubentryProvider,
    UserDefinedProvider, VirtualAttributeProvider, VirtualAttributeRule,
};
