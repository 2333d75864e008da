//! Schema conformance integration tests.
//!
//! Exercises content rules, name forms and structure rules together with a
//! backend-style [`EntryLocator`].

mod common;

use common::{babs_jensen, build_entry, core_schema, entry_from_ldif, fixtures};
use dirsrv_core::entry::{EntryLocator, ParentEntry, ParentLookup};
use dirsrv_core::schema::DefinitionKind;
use dirsrv_core::{AcceptRejectWarn, DirectoryConfig, Dn, Entry, ResultCode, Schema, SchemaViolation};
use std::collections::HashMap;

/// An in-memory DIT keyed by normalized DN.
struct MemoryDit {
    entries: HashMap<Dn, Entry>,
}

impl MemoryDit {
    fn new(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.dn().clone(), e)).collect(),
        }
    }
}

impl EntryLocator for MemoryDit {
    fn try_read_entry(&self, dn: &Dn) -> ParentLookup {
        match self.entries.get(dn) {
            Some(entry) => ParentLookup::Found(entry.clone()),
            None => ParentLookup::Missing,
        }
    }
}

fn register(schema: &Schema, definitions: &[(DefinitionKind, &str)]) {
    for (kind, definition) in definitions {
        schema.register_definition(*kind, definition, true).unwrap();
    }
}

#[test]
fn test_fixture_entries_conform() {
    let schema = core_schema();
    let config = DirectoryConfig::default();
    for ldif in [fixtures::BABS_JENSEN, fixtures::PEOPLE_OU, fixtures::POSIX_USER] {
        let entry = entry_from_ldif(&schema, ldif);
        assert_eq!(
            entry.conforms_to_schema(&schema, &config, ParentEntry::Provided(None)),
            Ok(()),
            "{}",
            entry.dn()
        );
    }
}

#[test]
fn test_content_rule_controls_auxiliary_classes() {
    let schema = core_schema();
    let config = DirectoryConfig::default();
    let entry = entry_from_ldif(&schema, fixtures::POSIX_USER);

    register(&schema, &[(DefinitionKind::DitContentRule, "( 2.5.6.6 NAME 'personContentRule' )")]);
    let result = entry.conforms_to_schema(&schema, &config, ParentEntry::Provided(None));
    assert!(matches!(
        result,
        Err(SchemaViolation::AuxiliaryClassNotAllowed { ref object_class, .. }) if object_class == "posixAccount"
    ));

    let warn = DirectoryConfig::default().with_structural_policy(AcceptRejectWarn::Warn);
    assert_eq!(entry.conforms_to_schema(&schema, &warn, ParentEntry::Provided(None)), Ok(()));

    register(
        &schema,
        &[(DefinitionKind::DitContentRule, "( 2.5.6.6 NAME 'personContentRule' AUX posixAccount )")],
    );
    assert_eq!(entry.conforms_to_schema(&schema, &config, ParentEntry::Provided(None)), Ok(()));
}

#[test]
fn test_content_rule_attribute_lists() {
    let schema = core_schema();
    let config = DirectoryConfig::default();

    register(
        &schema,
        &[(
            DefinitionKind::DitContentRule,
            "( 2.5.6.6 NAME 'personContentRule' MAY mail NOT description )",
        )],
    );
    let with_mail = build_entry(
        &schema,
        "cn=Mail User,dc=example,dc=com",
        &["top", "person"],
        &[("cn", "Mail User"), ("sn", "User"), ("mail", "mail@example.com")],
    );
    assert_eq!(with_mail.conforms_to_schema(&schema, &config, ParentEntry::Provided(None)), Ok(()));

    let with_description = build_entry(
        &schema,
        "cn=Desc User,dc=example,dc=com",
        &["top", "person"],
        &[("cn", "Desc User"), ("sn", "User"), ("description", "prohibited")],
    );
    let err = with_description
        .conforms_to_schema(&schema, &config, ParentEntry::Provided(None))
        .unwrap_err();
    assert!(matches!(err, SchemaViolation::ContentRuleProhibitedAttribute { .. }));
    assert_eq!(err.result_code(), ResultCode::ObjectClassViolation);

    register(
        &schema,
        &[(DefinitionKind::DitContentRule, "( 2.5.6.6 NAME 'personContentRule' MUST telephoneNumber )")],
    );
    assert!(matches!(
        with_mail.conforms_to_schema(&schema, &config, ParentEntry::Provided(None)),
        Err(SchemaViolation::DisallowedAttribute { .. })
    ));
}

#[test]
fn test_missing_structural_class_policy() {
    let schema = core_schema();
    let entry = build_entry(&schema, "cn=Loose,dc=example,dc=com", &["top"], &[]);

    assert!(matches!(
        entry.conforms_to_schema(&schema, &DirectoryConfig::default(), ParentEntry::Provided(None)),
        Err(SchemaViolation::NoStructuralObjectClass { .. })
    ));
    let accept = DirectoryConfig::default().with_structural_policy(AcceptRejectWarn::Accept);
    assert_eq!(entry.conforms_to_schema(&schema, &accept, ParentEntry::Provided(None)), Ok(()));
}

#[test]
fn test_structure_rules_through_locator() {
    let schema = core_schema();
    register(
        &schema,
        &[
            (
                DefinitionKind::NameForm,
                "( 1.3.6.1.4.1.99999.15.1 NAME 'ouNameForm' OC organizationalUnit MUST ou )",
            ),
            (
                DefinitionKind::NameForm,
                "( 1.3.6.1.4.1.99999.15.2 NAME 'personNameForm' OC person MUST cn )",
            ),
            (DefinitionKind::DitStructureRule, "( 1 NAME 'ouRule' FORM ouNameForm )"),
            (DefinitionKind::DitStructureRule, "( 2 NAME 'personRule' FORM personNameForm SUP 1 )"),
        ],
    );
    let config = DirectoryConfig::default();
    let people = entry_from_ldif(&schema, fixtures::PEOPLE_OU);
    let dit = MemoryDit::new([people]);

    let person = build_entry(
        &schema,
        "cn=Babs Jensen,ou=People,dc=example,dc=com",
        &["top", "person"],
        &[("cn", "Babs Jensen"), ("sn", "Jensen")],
    );
    assert_eq!(person.conforms_to_schema(&schema, &config, ParentEntry::Lookup(&dit)), Ok(()));

    let orphan = build_entry(
        &schema,
        "cn=Orphan,ou=Nowhere,dc=example,dc=com",
        &["top", "person"],
        &[("cn", "Orphan"), ("sn", "Orphan")],
    );
    let err = orphan
        .conforms_to_schema(&schema, &config, ParentEntry::Lookup(&dit))
        .unwrap_err();
    assert!(matches!(err, SchemaViolation::ParentNotFound { .. }));
    assert_eq!(err.result_code(), ResultCode::NoSuchObject);

    let disabled = DirectoryConfig {
        validate_structure_rules: false,
        ..DirectoryConfig::default()
    };
    assert_eq!(orphan.conforms_to_schema(&schema, &disabled, ParentEntry::Lookup(&dit)), Ok(()));
}

#[test]
fn test_entry_without_rule_under_governed_parent() {
    let schema = core_schema();
    register(
        &schema,
        &[
            (
                DefinitionKind::NameForm,
                "( 1.3.6.1.4.1.99999.15.1 NAME 'ouNameForm' OC organizationalUnit MUST ou )",
            ),
            (DefinitionKind::DitStructureRule, "( 1 NAME 'ouRule' FORM ouNameForm )"),
        ],
    );
    let people = entry_from_ldif(&schema, fixtures::PEOPLE_OU);
    let dit = MemoryDit::new([people]);
    // inetOrgPerson has no name form of its own.
    let babs = babs_jensen(&schema);

    assert!(matches!(
        babs.conforms_to_schema(&schema, &DirectoryConfig::default(), ParentEntry::Lookup(&dit)),
        Err(SchemaViolation::StructureRuleViolation { .. })
    ));
}

#[test]
fn test_name_form_checks_can_be_disabled() {
    let schema = core_schema();
    register(
        &schema,
        &[(
            DefinitionKind::NameForm,
            "( 1.3.6.1.4.1.99999.15.2 NAME 'personNameForm' OC person MUST cn )",
        )],
    );
    let entry = entry_from_ldif(&schema, fixtures::POSIX_USER);
    assert!(matches!(
        entry.conforms_to_schema(&schema, &DirectoryConfig::default(), ParentEntry::Provided(None)),
        Err(SchemaViolation::NoMatchingNameForm { .. })
    ));

    let lenient = DirectoryConfig {
        validate_name_forms: false,
        ..DirectoryConfig::default()
    };
    assert_eq!(entry.conforms_to_schema(&schema, &lenient, ParentEntry::Provided(None)), Ok(()));
}
