//! RFC 4512 schema definition parsing.
//!
//! Definitions are tokenized into a flat keyword table first, then each
//! element kind pulls the keywords it understands and resolves references
//! against the [`Schema`] it is being built for. The original definition text
//! is kept on the element so that it can be recreated after a dependency
//! changes.

use super::registry::Schema;
use super::types::{
    AttributeType, AttributeUsage, DitContentRule, DitStructureRule, ElementCommon,
    MatchingRuleUse, NameForm, ObjectClass, ObjectClassKind, SCHEMA_FILE_EXTENSION, SchemaElement,
    TOP_OBJECT_CLASS_OID,
};
use crate::error::{SchemaError, SchemaResult};
use std::sync::Arc;

const FLAG_KEYWORDS: &[&str] = &[
    "OBSOLETE",
    "SINGLE-VALUE",
    "COLLECTIVE",
    "NO-USER-MODIFICATION",
    "ABSTRACT",
    "STRUCTURAL",
    "AUXILIARY",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Dollar,
    Quoted(String),
    Word(String),
}

fn tokenize(definition: &str) -> SchemaResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = definition.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '$' => tokens.push(Token::Dollar),
            '\'' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\'' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            let hex: String = chars.by_ref().take(2).map(|(_, c)| c).collect();
                            let byte = u8::from_str_radix(&hex, 16).map_err(|_| {
                                SchemaError::malformed(definition, "invalid escape in quoted string")
                            })?;
                            value.push(char::from(byte));
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(SchemaError::malformed(
                        definition,
                        "unterminated quoted string",
                    ));
                }
                tokens.push(Token::Quoted(value));
            }
            c => {
                let mut word = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | '$' | '\'') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

/// A definition split into its leading identifier and keyword/value pairs.
#[derive(Debug, Clone)]
pub(crate) struct ParsedDefinition {
    pub(crate) oid: String,
    fields: Vec<(String, Vec<String>)>,
    text: String,
}

impl ParsedDefinition {
    pub(crate) fn parse(definition: &str) -> SchemaResult<Self> {
        let text = definition.trim().to_string();
        let malformed = |reason: &str| SchemaError::malformed(text.clone(), reason);
        let tokens = tokenize(&text)?;
        let mut iter = tokens.into_iter().peekable();

        if iter.next() != Some(Token::Open) {
            return Err(malformed("definition must start with '('"));
        }
        let oid = match iter.next() {
            Some(Token::Word(oid)) => oid,
            _ => return Err(malformed("missing numeric OID")),
        };

        let mut fields = Vec::new();
        loop {
            let keyword = match iter.next() {
                Some(Token::Close) => break,
                Some(Token::Word(word)) => word.to_ascii_uppercase(),
                _ => return Err(malformed("expected a keyword")),
            };
            if FLAG_KEYWORDS.contains(&keyword.as_str()) {
                fields.push((keyword, Vec::new()));
                continue;
            }
            let values = match iter.next() {
                Some(Token::Open) => {
                    let mut values = Vec::new();
                    loop {
                        match iter.next() {
                            Some(Token::Close) => break,
                            Some(Token::Dollar) => {}
                            Some(Token::Quoted(v)) | Some(Token::Word(v)) => values.push(v),
                            _ => return Err(malformed("unterminated value list")),
                        }
                    }
                    values
                }
                Some(Token::Quoted(v)) | Some(Token::Word(v)) => vec![v],
                _ => return Err(malformed("keyword is missing its value")),
            };
            fields.push((keyword, values));
        }
        if iter.next().is_some() {
            return Err(malformed("unexpected content after closing ')'"));
        }

        Ok(Self { oid, fields, text })
    }

    fn values(&self, keyword: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    fn single(&self, keyword: &str) -> Option<&str> {
        self.values(keyword).first().map(String::as_str)
    }

    fn has_flag(&self, keyword: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == keyword)
    }

    fn common(&self) -> ElementCommon {
        ElementCommon {
            oid: self.oid.clone(),
            names: self.values("NAME").to_vec(),
            description: self.single("DESC").map(str::to_string),
            obsolete: self.has_flag("OBSOLETE"),
            extensions: self
                .fields
                .iter()
                .filter(|(k, _)| k.starts_with("X-"))
                .cloned()
                .collect(),
            definition: self.text.clone(),
        }
    }

    fn identifier(&self) -> String {
        self.values("NAME")
            .first()
            .cloned()
            .unwrap_or_else(|| self.oid.clone())
    }

    fn attribute_types(&self, schema: &Schema, keyword: &str) -> SchemaResult<Vec<Arc<AttributeType>>> {
        self.values(keyword)
            .iter()
            .map(|name| {
                schema
                    .attribute_type(name)
                    .ok_or_else(|| SchemaError::unknown(AttributeType::KIND, name, self.identifier()))
            })
            .collect()
    }

    fn object_classes(&self, schema: &Schema, keyword: &str) -> SchemaResult<Vec<Arc<ObjectClass>>> {
        self.values(keyword)
            .iter()
            .map(|name| {
                schema
                    .object_class(name)
                    .ok_or_else(|| SchemaError::unknown(ObjectClass::KIND, name, self.identifier()))
            })
            .collect()
    }
}

/// Insert an `X-SCHEMA-FILE` extension before the closing parenthesis
/// unless the definition already names its file.
pub fn with_schema_file(definition: &str, file: &str) -> String {
    let trimmed = definition.trim();
    if trimmed.to_ascii_uppercase().contains(SCHEMA_FILE_EXTENSION) {
        return trimmed.to_string();
    }
    match trimmed.rfind(')') {
        Some(end) => format!(
            "{} {SCHEMA_FILE_EXTENSION} '{file}' )",
            trimmed[..end].trim_end()
        ),
        None => trimmed.to_string(),
    }
}

impl AttributeType {
    /// Build an attribute type from its definition, resolving the superior
    /// type, syntax and matching rules against `schema`.
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;
        let id = parsed.identifier();

        let superior = match parsed.single("SUP") {
            Some(name) => Some(
                schema
                    .attribute_type(name)
                    .ok_or_else(|| SchemaError::unknown(AttributeType::KIND, name, &id))?,
            ),
            None => None,
        };

        let (syntax, syntax_length) = match parsed.single("SYNTAX") {
            Some(value) => {
                let (oid, length) = match value.split_once('{') {
                    Some((oid, rest)) => (oid, rest.trim_end_matches('}').parse().ok()),
                    None => (value, None),
                };
                let syntax = schema
                    .syntax(oid)
                    .ok_or_else(|| SchemaError::unknown("syntax", oid, &id))?;
                (syntax, length)
            }
            None => match &superior {
                Some(sup) => (Arc::clone(&sup.syntax), sup.syntax_length),
                None => (schema.default_syntax(), None),
            },
        };

        let rule = |keyword: &str,
                    inherited: Option<&Arc<_>>,
                    fallback: &Option<String>|
         -> SchemaResult<Option<Arc<_>>> {
            if let Some(name) = parsed.single(keyword) {
                return schema
                    .matching_rule(name)
                    .map(Some)
                    .ok_or_else(|| SchemaError::unknown("matching rule", name, &id));
            }
            if let Some(rule) = inherited {
                return Ok(Some(Arc::clone(rule)));
            }
            Ok(fallback.as_deref().and_then(|oid| schema.matching_rule(oid)))
        };

        let sup = superior.as_deref();
        let equality = rule(
            "EQUALITY",
            sup.and_then(|s| s.equality.as_ref()),
            &syntax.default_equality,
        )?;
        let ordering = rule(
            "ORDERING",
            sup.and_then(|s| s.ordering.as_ref()),
            &syntax.default_ordering,
        )?;
        let substring = rule(
            "SUBSTR",
            sup.and_then(|s| s.substring.as_ref()),
            &syntax.default_substring,
        )?;
        let approximate = rule(
            "X-APPROX",
            sup.and_then(|s| s.approximate.as_ref()),
            &syntax.default_approximate,
        )?;

        let usage = match parsed.single("USAGE") {
            Some(value) => AttributeUsage::parse(value).ok_or_else(|| {
                SchemaError::malformed(definition, format!("unknown USAGE '{value}'"))
            })?,
            None => AttributeUsage::UserApplications,
        };

        Ok(Self {
            common: parsed.common(),
            superior,
            syntax,
            syntax_length,
            equality,
            ordering,
            substring,
            approximate,
            single_value: parsed.has_flag("SINGLE-VALUE"),
            collective: parsed.has_flag("COLLECTIVE"),
            no_user_modification: parsed.has_flag("NO-USER-MODIFICATION"),
            usage,
            placeholder: false,
        })
    }
}

impl ObjectClass {
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;

        let kind = if parsed.has_flag("ABSTRACT") {
            ObjectClassKind::Abstract
        } else if parsed.has_flag("AUXILIARY") {
            ObjectClassKind::Auxiliary
        } else {
            ObjectClassKind::Structural
        };

        let mut superiors = parsed.object_classes(schema, "SUP")?;
        if superiors.is_empty() && parsed.oid != TOP_OBJECT_CLASS_OID {
            superiors.extend(schema.object_class(TOP_OBJECT_CLASS_OID));
        }

        Ok(Self {
            common: parsed.common(),
            superiors,
            kind,
            required: parsed.attribute_types(schema, "MUST")?,
            optional: parsed.attribute_types(schema, "MAY")?,
            placeholder: false,
        })
    }
}

impl NameForm {
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;
        let structural_class = parsed
            .object_classes(schema, "OC")?
            .into_iter()
            .next()
            .ok_or_else(|| SchemaError::malformed(definition, "name form requires OC"))?;

        Ok(Self {
            common: parsed.common(),
            structural_class,
            required: parsed.attribute_types(schema, "MUST")?,
            optional: parsed.attribute_types(schema, "MAY")?,
        })
    }
}

impl DitContentRule {
    /// The rule's numeric OID is the OID of its structural class.
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;
        let structural_class = schema.object_class(&parsed.oid).ok_or_else(|| {
            SchemaError::unknown(ObjectClass::KIND, &parsed.oid, parsed.identifier())
        })?;

        Ok(Self {
            common: parsed.common(),
            structural_class,
            auxiliary: parsed.object_classes(schema, "AUX")?,
            required: parsed.attribute_types(schema, "MUST")?,
            optional: parsed.attribute_types(schema, "MAY")?,
            prohibited: parsed.attribute_types(schema, "NOT")?,
        })
    }
}

impl DitStructureRule {
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;
        let id = parsed.identifier();
        let rule_id: u32 = parsed
            .oid
            .parse()
            .map_err(|_| SchemaError::malformed(definition, "rule ID must be an integer"))?;

        let form = parsed
            .single("FORM")
            .ok_or_else(|| SchemaError::malformed(definition, "structure rule requires FORM"))?;
        let name_form = schema
            .name_form(form)
            .ok_or_else(|| SchemaError::unknown(NameForm::KIND, form, &id))?;

        let superiors = parsed
            .values("SUP")
            .iter()
            .map(|value| {
                value
                    .parse::<u32>()
                    .ok()
                    .and_then(|superior_id| schema.dit_structure_rule(superior_id))
                    .ok_or_else(|| SchemaError::unknown(DitStructureRule::KIND, value, &id))
            })
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(Self {
            common: parsed.common(),
            rule_id,
            name_form,
            superiors,
        })
    }
}

impl MatchingRuleUse {
    /// The use's numeric OID is the OID of the matching rule it restricts.
    pub fn from_definition(definition: &str, schema: &Schema) -> SchemaResult<Self> {
        let parsed = ParsedDefinition::parse(definition)?;
        let matching_rule = schema.matching_rule(&parsed.oid).ok_or_else(|| {
            SchemaError::unknown("matching rule", &parsed.oid, parsed.identifier())
        })?;
        let attributes = parsed.attribute_types(schema, "APPLIES")?;
        if attributes.is_empty() {
            return Err(SchemaError::malformed(
                definition,
                "matching rule use requires APPLIES",
            ));
        }

        Ok(Self {
            common: parsed.common(),
            matching_rule,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        let parsed = ParsedDefinition::parse(
            "( 2.5.4.3 NAME ( 'cn' 'commonName' ) SUP name SINGLE-VALUE X-ORIGIN 'RFC 4519' )",
        )
        .unwrap();
        assert_eq!(parsed.oid, "2.5.4.3");
        assert_eq!(parsed.values("NAME"), ["cn", "commonName"]);
        assert_eq!(parsed.single("SUP"), Some("name"));
        assert!(parsed.has_flag("SINGLE-VALUE"));
        assert_eq!(parsed.common().extensions.len(), 1);
    }

    #[test]
    fn test_parse_dollar_lists() {
        let parsed =
            ParsedDefinition::parse("( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) )")
                .unwrap();
        assert_eq!(parsed.values("MUST"), ["sn", "cn"]);
        assert!(parsed.has_flag("STRUCTURAL"));
    }

    #[test]
    fn test_parse_escaped_quote() {
        let parsed = ParsedDefinition::parse("( 1.2.3 DESC 'it\\27s' )").unwrap();
        assert_eq!(parsed.single("DESC"), Some("it's"));
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(ParsedDefinition::parse("2.5.4.3 NAME 'cn'").is_err());
        assert!(ParsedDefinition::parse("( 2.5.4.3 NAME 'cn'").is_err());
        assert!(ParsedDefinition::parse("( 2.5.4.3 NAME ( 'cn' ").is_err());
        assert!(ParsedDefinition::parse("( 2.5.4.3 NAME 'cn ) ").is_err());
    }

    #[test]
    fn test_with_schema_file() {
        assert_eq!(
            with_schema_file("( 1.2.3 NAME 'x' )", "99-user.ldif"),
            "( 1.2.3 NAME 'x' X-SCHEMA-FILE '99-user.ldif' )"
        );
        let tagged = "( 1.2.3 NAME 'x' X-SCHEMA-FILE '00-core.ldif' )";
        assert_eq!(with_schema_file(tagged, "99-user.ldif"), tagged);
    }
}
