//! String representation of filters.

use super::types::{AttributeValueAssertion, SearchFilter};
use crate::schema::{AttributeType, SchemaElement};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

/// Append `value` with RFC 4515 escaping: NUL, parentheses, asterisk,
/// backslash and every byte that is not printable ASCII become `\XX`.
pub fn escape_value(value: &[u8], out: &mut String) {
    for &byte in value {
        match byte {
            b'(' | b')' | b'*' | b'\\' | 0x00..=0x1F | 0x7F..=0xFF => {
                let _ = write!(out, "\\{byte:02X}");
            }
            _ => out.push(char::from(byte)),
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    let mut escaped = String::with_capacity(value.len());
    escape_value(value, &mut escaped);
    f.write_str(&escaped)
}

fn write_attribute(
    f: &mut fmt::Formatter<'_>,
    attribute_type: &AttributeType,
    options: &BTreeSet<String>,
) -> fmt::Result {
    f.write_str(attribute_type.name_or_oid())?;
    for option in options {
        write!(f, ";{option}")?;
    }
    Ok(())
}

fn write_assertion(f: &mut fmt::Formatter<'_>, ava: &AttributeValueAssertion, operator: &str) -> fmt::Result {
    f.write_str("(")?;
    write_attribute(f, &ava.attribute_type, &ava.options)?;
    f.write_str(operator)?;
    write_value(f, ava.value.as_bytes())?;
    f.write_str(")")
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFilter::And(children) | SearchFilter::Or(children) => {
                f.write_str(if matches!(self, SearchFilter::And(_)) { "(&" } else { "(|" })?;
                for child in children {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            SearchFilter::Not(child) => write!(f, "(!{child})"),
            SearchFilter::Equality(ava) => write_assertion(f, ava, "="),
            SearchFilter::GreaterOrEqual(ava) => write_assertion(f, ava, ">="),
            SearchFilter::LessOrEqual(ava) => write_assertion(f, ava, "<="),
            SearchFilter::ApproximateMatch(ava) => write_assertion(f, ava, "~="),
            SearchFilter::Present(description) => write!(f, "({description}=*)"),
            SearchFilter::Substring(sub) => {
                f.write_str("(")?;
                write_attribute(f, &sub.attribute_type, &sub.options)?;
                f.write_str("=")?;
                // Empty segments have no textual form; a filter left with no
                // segments renders as `**` so it still parses as a substring.
                let initial = sub.sub_initial.as_deref().filter(|s| !s.is_empty());
                let fin = sub.sub_final.as_deref().filter(|s| !s.is_empty());
                if let Some(initial) = initial {
                    write_value(f, initial)?;
                }
                f.write_str("*")?;
                let mut any_written = false;
                for any in sub.sub_any.iter().filter(|s| !s.is_empty()) {
                    write_value(f, any)?;
                    f.write_str("*")?;
                    any_written = true;
                }
                match fin {
                    Some(fin) => write_value(f, fin)?,
                    None if initial.is_none() && !any_written => f.write_str("*")?,
                    None => {}
                }
                f.write_str(")")
            }
            SearchFilter::ExtensibleMatch(ext) => {
                f.write_str("(")?;
                if let Some(attribute_type) = &ext.attribute_type {
                    write_attribute(f, attribute_type, &ext.options)?;
                }
                if ext.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &ext.matching_rule_id {
                    write!(f, ":{rule}")?;
                }
                f.write_str(":=")?;
                write_value(f, ext.value.as_bytes())?;
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::sync::Arc;

    #[test]
    fn test_escape_value() {
        let mut out = String::new();
        escape_value("a*(b)\\\u{0}é".as_bytes(), &mut out);
        assert_eq!(out, r"a\2A\28b\29\5C\00\C3\A9");
    }

    #[test]
    fn test_display_reparses_to_equal_filter() {
        let schema = Schema::with_core_schema().unwrap();
        for text in [
            "(&(objectClass=person)(cn=Babs Jensen))",
            "(|(cn;lang-en>=m)(!(sn<=b)))",
            "(cn~=jensin)",
            "(cn=B*ens*n)",
            "(cn=*ens*)",
            "(telephoneNumber=*)",
            r"(description=a\2Ab\28c\29)",
            "(cn:dn:caseExactMatch:=Babs)",
            "(:2.5.13.2:=x)",
            "(&)",
            "(|)",
        ] {
            let parsed = SearchFilter::parse(text, &schema).unwrap();
            let rendered = parsed.to_string();
            let reparsed = SearchFilter::parse(&rendered, &schema).unwrap();
            assert_eq!(parsed, reparsed, "{text} rendered as {rendered}");
        }
        assert_eq!(
            SearchFilter::parse("(CN=x)", &schema).unwrap().to_string(),
            "(cn=x)"
        );
    }

    #[test]
    fn test_substring_with_empty_segments_round_trips() {
        let schema = Schema::with_core_schema().unwrap();
        let cn = schema.attribute_type("cn").unwrap();

        let filter = SearchFilter::substring(
            Arc::clone(&cn),
            Some(Vec::new()),
            vec![Vec::new(), b"ens".to_vec(), Vec::new()],
            Some(b"n".to_vec()),
        );
        let collapsed = SearchFilter::substring(Arc::clone(&cn), None, vec![b"ens".to_vec()], Some(b"n".to_vec()));
        assert_eq!(filter, collapsed);
        assert_eq!(filter.to_string(), "(cn=*ens*n)");
        assert_eq!(SearchFilter::parse(&filter.to_string(), &schema).unwrap(), filter);

        let empty = SearchFilter::substring(Arc::clone(&cn), None, vec![Vec::new(), Vec::new()], None);
        assert_eq!(empty.to_string(), "(cn=**)");
        assert_eq!(SearchFilter::parse(&empty.to_string(), &schema).unwrap(), empty);

        // Fields are public, so rendering skips empty segments on its own.
        let SearchFilter::Substring(mut raw) = SearchFilter::substring(cn, Some(b"B".to_vec()), vec![], None) else {
            unreachable!()
        };
        raw.sub_any = vec![Vec::new(), Vec::new()];
        assert_eq!(SearchFilter::Substring(raw).to_string(), "(cn=B*)");
    }
}
