//! Property-based tests for entry encoding and search filters.
//!
//! Uses proptest to generate entries and filter trees with automatic
//! shrinking.

mod common;

use common::{babs_jensen, build_entry};
use dirsrv_core::filter::escape_value;
use dirsrv_core::{CompressedSchema, Entry, EntryEncodeConfig, FilterEvaluator, Schema, SearchFilter};
use proptest::prelude::*;
use std::sync::OnceLock;

fn schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(common::core_schema)
}

const ATTRIBUTES: &[&str] = &["cn", "sn", "description", "telephoneNumber", "mail", "objectClass", "uidNumber"];
const OPERATORS: &[&str] = &["=", ">=", "<=", "~=", "=*"];

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9 ]{1,12}",
        "[ -~]{1,8}",
        Just("Jensen".to_string()),
        Just("person".to_string()),
    ]
}

/// Filter text built from escaped leaves.
fn filter_strategy() -> impl Strategy<Value = String> {
    let leaf = (
        prop::sample::select(ATTRIBUTES),
        prop::sample::select(OPERATORS),
        value_strategy(),
    )
        .prop_map(|(attribute, op, value)| {
            if op == "=*" {
                return format!("({attribute}=*)");
            }
            let mut escaped = String::new();
            escape_value(value.as_bytes(), &mut escaped);
            format!("({attribute}{op}{escaped})")
        });

    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|children| format!("(&{})", children.concat())),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|children| format!("(|{})", children.concat())),
            inner.prop_map(|child| format!("(!{child})")),
        ]
    })
}

fn entry_strategy() -> impl Strategy<Value = (Vec<String>, Option<String>, u8)> {
    (
        prop::collection::vec("[A-Za-z0-9 .,+=-]{1,16}", 0..6),
        prop::option::of("\\+?[0-9 ]{1,12}"),
        0u8..8,
    )
}

fn sample_entry(schema: &Schema, descriptions: &[String], phone: Option<&str>) -> Entry {
    let mut entry = build_entry(
        schema,
        "cn=Sample,ou=People,dc=example,dc=com",
        &["top", "person"],
        &[("cn", "Sample"), ("sn", "Entry")],
    );
    let mut duplicates = Vec::new();
    for description in descriptions {
        entry.add_attribute(schema, common::attribute(schema, "description", &[description.as_str()]), &mut duplicates);
    }
    if let Some(phone) = phone {
        entry.add_attribute(schema, common::attribute(schema, "telephoneNumber", &[phone]), &mut duplicates);
    }
    entry
}

proptest! {
    #[test]
    fn prop_encoded_entries_decode_to_the_same_entry((descriptions, phone, flags) in entry_strategy()) {
        let schema = schema();
        let compressed = CompressedSchema::new();
        let entry = sample_entry(schema, &descriptions, phone.as_deref());
        let config = EntryEncodeConfig::from_flags(flags);

        let decoded = Entry::decode(&entry.encode(config, &compressed), schema, &compressed).unwrap();
        let mut expected = entry.duplicate();
        if config.exclude_dn {
            expected.set_dn(dirsrv_core::Dn::null());
        }
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn prop_decoding_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Entry::decode(&bytes, schema(), &CompressedSchema::new());
    }

    #[test]
    fn prop_rendered_filters_parse_back(text in filter_strategy()) {
        let schema = schema();
        let parsed = SearchFilter::parse(&text, schema).unwrap();
        let rendered = parsed.to_string();
        let reparsed = SearchFilter::parse(&rendered, schema).unwrap();
        prop_assert_eq!(&parsed, &reparsed);
        prop_assert_eq!(rendered, reparsed.to_string());
    }

    #[test]
    fn prop_not_inverts_three_valued_result(text in filter_strategy()) {
        let schema = schema();
        let entry = babs_jensen(schema);
        let evaluator = FilterEvaluator::new(schema);

        let filter = SearchFilter::parse(&text, schema).unwrap();
        let negated = SearchFilter::not(filter.clone());
        let result = evaluator.evaluate(&filter, &entry).unwrap();
        prop_assert_eq!(evaluator.evaluate(&negated, &entry).unwrap(), !result);
    }

    #[test]
    fn prop_and_or_are_order_independent(a in filter_strategy(), b in filter_strategy()) {
        let schema = schema();
        let entry = babs_jensen(schema);
        let evaluator = FilterEvaluator::new(schema);

        let ab = SearchFilter::parse(&format!("(&{a}{b})"), schema).unwrap();
        let ba = SearchFilter::parse(&format!("(&{b}{a})"), schema).unwrap();
        prop_assert_eq!(&ab, &ba);
        prop_assert_eq!(evaluator.evaluate(&ab, &entry).unwrap(), evaluator.evaluate(&ba, &entry).unwrap());

        let or_ab = SearchFilter::parse(&format!("(|{a}{b})"), schema).unwrap();
        let or_ba = SearchFilter::parse(&format!("(|{b}{a})"), schema).unwrap();
        prop_assert_eq!(evaluator.evaluate(&or_ab, &entry).unwrap(), evaluator.evaluate(&or_ba, &entry).unwrap());
    }
}
