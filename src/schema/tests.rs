//! Tests for the schema registry.
//!
//! Covers lookup, registration conflicts, overwrite and deregistration,
//! secondary indexes, snapshots and dependent-element rebuilding.

use super::registry::{DefinitionKind, Schema};
use super::types::{SchemaElement, SchemaElementRef};
use crate::error::SchemaError;
use std::sync::Arc;

fn core() -> Schema {
    Schema::with_core_schema().expect("Failed to build core schema")
}

#[test]
fn test_lookup_by_name_and_oid() {
    let schema = core();
    let by_name = schema.attribute_type("cn").unwrap();
    let by_alias = schema.attribute_type("COMMONNAME").unwrap();
    let by_oid = schema.attribute_type("2.5.4.3").unwrap();
    assert_eq!(by_name, by_alias);
    assert_eq!(by_name, by_oid);
    assert!(schema.attribute_type("noSuchType").is_none());

    assert!(schema.object_class("inetOrgPerson").is_some());
    assert!(schema.matching_rule("caseIgnoreMatch").is_some());
    assert!(schema.equality_matching_rule("caseIgnoreMatch").is_some());
    assert!(schema.ordering_matching_rule("caseIgnoreMatch").is_none());
}

#[test]
fn test_placeholders_are_not_registered() {
    let schema = core();
    let placeholder = schema.attribute_type_or_default("favouriteDrink");
    assert!(placeholder.is_placeholder());
    assert!(placeholder.equality_matching_rule().is_some());
    assert!(schema.attribute_type("favouriteDrink").is_none());

    let class = schema.object_class_or_default("madeUpClass");
    assert!(class.is_placeholder());
    assert!(schema.object_class("madeUpClass").is_none());
}

#[test]
fn test_conflicting_oid_and_name() {
    let schema = core();
    let oid_clash = schema.register_definition(
        DefinitionKind::AttributeType,
        "( 2.5.4.3 NAME 'notCn' SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
        false,
    );
    assert!(matches!(oid_clash, Err(SchemaError::ConflictingOid { .. })));

    let name_clash = schema.register_definition(
        DefinitionKind::AttributeType,
        "( 1.3.6.1.4.1.99999.1.9 NAME 'cn' SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
        false,
    );
    assert!(matches!(name_clash, Err(SchemaError::ConflictingName { .. })));
    assert_eq!(schema.attribute_type("cn").unwrap().oid(), "2.5.4.3");
}

#[test]
fn test_rejected_registration_leaves_registry_unchanged() {
    let schema = core();
    let cn = schema.attribute_type("cn").unwrap();
    let before = schema.definitions(DefinitionKind::AttributeType);

    for definition in [
        "( 2.5.4.3 NAME 'notCn' SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
        "( 1.3.6.1.4.1.99999.1.9 NAME ( 'freshName' 'commonName' ) SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
    ] {
        assert!(schema
            .register_definition(DefinitionKind::AttributeType, definition, false)
            .is_err());
    }

    assert_eq!(schema.definitions(DefinitionKind::AttributeType), before);
    for key in ["cn", "commonName", "2.5.4.3"] {
        let found = schema.attribute_type(key).unwrap();
        assert!(Arc::ptr_eq(&found, &cn), "{key}");
    }
    for key in ["notCn", "freshName", "1.3.6.1.4.1.99999.1.9"] {
        assert!(schema.attribute_type(key).is_none(), "{key}");
    }
}

#[test]
fn test_concurrent_readers_with_single_writer() {
    fn assert_shareable<T: Send + Sync>() {}
    assert_shareable::<Schema>();

    const FLICKER: &str =
        "( 1.3.6.1.4.1.99999.1.50 NAME 'exampleFlicker' SUP name SINGLE-VALUE )";
    let schema = core();
    let before = schema.definitions(DefinitionKind::AttributeType);
    let snapshot = schema.duplicate();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let cn = schema.attribute_type("commonName").expect("cn always resolvable");
                    assert_eq!(cn.oid(), "2.5.4.3");
                    if let Some(flicker) = schema.attribute_type("exampleFlicker") {
                        assert_eq!(flicker.oid(), "1.3.6.1.4.1.99999.1.50");
                    }
                    assert!(schema.object_class("person").is_some());
                    assert!(schema.definitions(DefinitionKind::AttributeType).len() >= before.len());
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..200 {
                let element = schema
                    .register_definition(DefinitionKind::AttributeType, FLICKER, false)
                    .unwrap();
                assert!(schema.attribute_type("exampleFlicker").is_some());
                assert!(schema.deregister_element(&element));
            }
        });
    });

    assert!(schema.attribute_type("exampleFlicker").is_none());
    assert_eq!(schema.definitions(DefinitionKind::AttributeType), before);
    let name = schema.attribute_type("name").unwrap();
    assert!(!schema.sub_types(&name).iter().any(|t| t.has_name("exampleFlicker")));
    assert_eq!(snapshot.definitions(DefinitionKind::AttributeType), before);
}

#[test]
fn test_reregistering_identical_definition_is_allowed() {
    let schema = core();
    let cn = schema.attribute_type("cn").unwrap();
    schema
        .register_definition(DefinitionKind::AttributeType, cn.definition(), false)
        .unwrap();
}

#[test]
fn test_overwrite_replaces_all_keys() {
    let schema = core();
    schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.1 NAME ( 'exampleColor' 'exampleColour' ) SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
            false,
        )
        .unwrap();
    schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.1 NAME 'exampleColor' SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 SINGLE-VALUE )",
            true,
        )
        .unwrap();

    assert!(schema.attribute_type("exampleColor").unwrap().is_single_value());
    assert!(schema.attribute_type("exampleColour").is_none());
}

#[test]
fn test_unknown_references_are_rejected() {
    let schema = core();
    let result = schema.register_definition(
        DefinitionKind::ObjectClass,
        "( 1.3.6.1.4.1.99999.2.1 NAME 'exampleThing' SUP top STRUCTURAL MUST missing )",
        false,
    );
    assert!(matches!(result, Err(SchemaError::UnknownElement { .. })));

    let result = schema.register_definition(
        DefinitionKind::AttributeType,
        "( 1.3.6.1.4.1.99999.1.2 NAME 'exampleBad' EQUALITY noSuchMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
        false,
    );
    assert!(matches!(result, Err(SchemaError::UnknownElement { .. })));
}

#[test]
fn test_deregister() {
    let schema = core();
    let element = schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.3 NAME 'exampleTemp' SUP name )",
            false,
        )
        .unwrap();
    let SchemaElementRef::AttributeType(temp) = element else {
        panic!("expected an attribute type");
    };
    let name = schema.attribute_type("name").unwrap();
    assert!(schema.sub_types(&name).iter().any(|t| t == &temp));

    assert!(schema.deregister_attribute_type(&temp));
    assert!(schema.attribute_type("exampleTemp").is_none());
    assert!(!schema.sub_types(&name).iter().any(|t| t == &temp));
    assert!(!schema.deregister_attribute_type(&temp));
}

#[test]
fn test_sub_types() {
    let schema = core();
    let name = schema.attribute_type("name").unwrap();
    let subtypes: Vec<String> = schema
        .sub_types(&name)
        .iter()
        .map(|t| t.name_or_oid().to_string())
        .collect();
    for expected in ["cn", "sn", "ou"] {
        assert!(subtypes.iter().any(|s| s == expected), "{expected} missing from {subtypes:?}");
    }
    assert!(schema.has_sub_types(&name));
    assert!(!schema.has_sub_types(&schema.attribute_type("cn").unwrap()));
}

#[test]
fn test_secondary_indexes() {
    let schema = core();
    for (kind, definition) in [
        (
            DefinitionKind::NameForm,
            "( 1.3.6.1.4.1.99999.15.1 NAME 'ouNameForm' OC organizationalUnit MUST ou )",
        ),
        (DefinitionKind::DitStructureRule, "( 7 NAME 'ouRule' FORM ouNameForm )"),
        (
            DefinitionKind::DitContentRule,
            "( 2.5.6.6 NAME 'personContentRule' AUX posixAccount NOT telephoneNumber )",
        ),
        (DefinitionKind::MatchingRuleUse, "( 2.5.13.5 NAME 'caseExactMatchUse' APPLIES ( cn $ sn ) )"),
    ] {
        schema.register_definition(kind, definition, false).unwrap();
    }

    let ou = schema.object_class("organizationalUnit").unwrap();
    let forms = schema.name_forms_for(&ou);
    assert_eq!(forms.len(), 1);
    assert_eq!(schema.dit_structure_rules_for(&forms[0]).len(), 1);
    assert_eq!(schema.dit_structure_rule(7).unwrap().name_or_oid(), "ouRule");
    assert!(schema.dit_structure_rule_by_name("ouRule").is_some());

    let person = schema.object_class("person").unwrap();
    let content_rule = schema.dit_content_rule_for(&person).unwrap();
    assert!(content_rule.allows_auxiliary_class(&schema.object_class("posixAccount").unwrap()));
    assert_eq!(content_rule.prohibited_attributes().len(), 1);

    let exact = schema.matching_rule("caseExactMatch").unwrap();
    let rule_use = schema.matching_rule_use(&exact).unwrap();
    assert!(rule_use.applies_to(&schema.attribute_type("cn").unwrap()));
    assert!(!rule_use.applies_to(&schema.attribute_type("description").unwrap()));
}

#[test]
fn test_duplicate_is_independent_snapshot() {
    let schema = core();
    let snapshot = schema.duplicate();
    assert_eq!(snapshot.oldest_modification_time(), schema.oldest_modification_time());
    assert_eq!(snapshot.youngest_modification_time(), schema.youngest_modification_time());

    snapshot
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.4 NAME 'exampleSnapshotOnly' SUP name )",
            false,
        )
        .unwrap();
    assert!(snapshot.attribute_type("exampleSnapshotOnly").is_some());
    assert!(schema.attribute_type("exampleSnapshotOnly").is_none());
    assert!(snapshot.youngest_modification_time() >= schema.youngest_modification_time());
    assert!(std::sync::Arc::ptr_eq(
        &snapshot.attribute_type("cn").unwrap(),
        &schema.attribute_type("cn").unwrap()
    ));
}

#[test]
fn test_modification_time_advances() {
    let schema = core();
    let before = schema.youngest_modification_time();
    schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.5 NAME 'exampleTimed' SUP name )",
            false,
        )
        .unwrap();
    assert!(schema.youngest_modification_time() >= before);
    assert!(schema.oldest_modification_time() <= schema.youngest_modification_time());
}

#[test]
fn test_rebuild_dependents_picks_up_inherited_rules() {
    let schema = core();
    schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.10 NAME 'exampleBase' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
            false,
        )
        .unwrap();
    schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.11 NAME 'exampleSub' SUP exampleBase )",
            false,
        )
        .unwrap();
    schema
        .register_definition(
            DefinitionKind::ObjectClass,
            "( 1.3.6.1.4.1.99999.2.10 NAME 'exampleHolder' SUP top AUXILIARY MAY exampleSub )",
            false,
        )
        .unwrap();

    let replaced = schema
        .register_definition(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.10 NAME 'exampleBase' EQUALITY caseExactMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
            true,
        )
        .unwrap();
    schema.rebuild_dependent_elements(&replaced).unwrap();

    let sub = schema.attribute_type("exampleSub").unwrap();
    assert_eq!(sub.equality_matching_rule().unwrap().name_or_oid(), "caseExactMatch");
    assert!(std::sync::Arc::ptr_eq(sub.superior().unwrap(), &schema.attribute_type("exampleBase").unwrap()));
    let holder = schema.object_class("exampleHolder").unwrap();
    assert!(holder.is_optional(&sub));
}

/// `exampleChain20` with three levels of subtypes beneath it.
fn chain_schema(depth_limit: usize) -> Schema {
    let schema = core().with_rebuild_depth_limit(depth_limit);
    let mut previous = "name".to_string();
    for index in 20..24 {
        let name = format!("exampleChain{index}");
        schema
            .register_definition(
                DefinitionKind::AttributeType,
                &format!("( 1.3.6.1.4.1.99999.1.{index} NAME '{name}' SUP {previous} )"),
                false,
            )
            .unwrap();
        previous = name;
    }
    schema
}

#[test]
fn test_rebuild_depth_limit_reports_circular_dependency() {
    for limit in [1, 2] {
        let schema = chain_schema(limit);
        let root = SchemaElementRef::AttributeType(schema.attribute_type("exampleChain20").unwrap());
        match schema.rebuild_dependent_elements(&root) {
            Err(SchemaError::CircularDependency { element }) => assert_eq!(element, "exampleChain20"),
            other => panic!("expected circular dependency at limit {limit}, got {other:?}"),
        }
    }
}

#[test]
fn test_rebuild_depth_limit_is_inclusive() {
    let schema = chain_schema(3);
    let root = SchemaElementRef::AttributeType(schema.attribute_type("exampleChain20").unwrap());
    schema.rebuild_dependent_elements(&root).unwrap();

    // Nothing depends on the leaf, so even a zero limit is not exceeded.
    let schema = chain_schema(0);
    let leaf = SchemaElementRef::AttributeType(schema.attribute_type("exampleChain23").unwrap());
    schema.rebuild_dependent_elements(&leaf).unwrap();
}

#[test]
fn test_definitions_are_published_per_kind() {
    let schema = core();
    let attribute_types = schema.definitions(DefinitionKind::AttributeType);
    assert!(attribute_types.iter().any(|d| d.contains("'commonname'")));
    let mut sorted = attribute_types.clone();
    sorted.sort();
    assert_eq!(attribute_types, sorted);
    assert!(!schema.syntax_definitions().is_empty());
    assert!(!schema.matching_rule_definitions().is_empty());
}
