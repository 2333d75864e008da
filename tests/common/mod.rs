//! Common test utilities for directory integration tests.
//!
//! Provides a shared core schema, sample entries in LDIF form and small
//! builders for entries with arbitrary attributes.

#![allow(dead_code)]

use dirsrv_core::entry::{Attribute, Entry};
use dirsrv_core::{Dn, Schema};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh registry preloaded with the core schema.
pub fn core_schema() -> Schema {
    init_logging();
    Schema::with_core_schema().expect("Failed to build core schema")
}

/// RFC 4515 style sample entries.
pub mod fixtures {
    pub const BABS_JENSEN: &str = "\
dn: cn=Babs Jensen,ou=People,dc=example,dc=com
objectClass: top
objectClass: person
objectClass: organizationalPerson
objectClass: inetOrgPerson
cn: Babs Jensen
cn: Barbara Jensen
sn: Jensen
givenName: Babs
uid: bjensen
mail: bjensen@example.com
telephoneNumber: +1 408 555 1212
description: Manager
";

    pub const PEOPLE_OU: &str = "\
dn: ou=People,dc=example,dc=com
objectClass: top
objectClass: organizationalUnit
ou: People
";

    pub const POSIX_USER: &str = "\
dn: uid=jdoe,ou=People,dc=example,dc=com
objectClass: top
objectClass: person
objectClass: posixAccount
cn: John Doe
sn: Doe
uid: jdoe
uidNumber: 1001
gidNumber: 100
homeDirectory: /home/jdoe
loginShell: /bin/sh
";
}

/// Parse one of the LDIF fixtures.
pub fn entry_from_ldif(schema: &Schema, ldif: &str) -> Entry {
    Entry::from_ldif(schema, ldif).expect("Failed to parse fixture LDIF")
}

pub fn babs_jensen(schema: &Schema) -> Entry {
    entry_from_ldif(schema, fixtures::BABS_JENSEN)
}

/// Build an entry from a DN, object classes and `(description, value)` pairs.
pub fn build_entry(schema: &Schema, dn: &str, classes: &[&str], values: &[(&str, &str)]) -> Entry {
    let dn = Dn::parse(dn).expect("Invalid test DN");
    let mut entry = Entry::with_object_classes(dn, schema, classes);
    let mut duplicates = Vec::new();
    for (description, value) in values {
        entry.add_attribute(schema, attribute(schema, description, &[*value]), &mut duplicates);
    }
    assert!(duplicates.is_empty(), "Fixture contains duplicate values: {duplicates:?}");
    entry
}

/// An attribute for `description`, which may carry `;options`.
pub fn attribute(schema: &Schema, description: &str, values: &[&str]) -> Attribute {
    let mut builder = dirsrv_core::entry::AttributeBuilder::from_description(description, schema);
    builder.add_all(values.iter().copied());
    builder.build()
}
