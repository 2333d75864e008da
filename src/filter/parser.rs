//! RFC 4515 string representation parser.

use super::types::{AttributeValueAssertion, ExtensibleMatchAssertion, SearchFilter, SubstringAssertion};
use crate::entry::{AttributeDescription, AttributeValue, split_options};
use crate::error::{FilterError, FilterParseErrorKind, FilterResult};
use crate::schema::Schema;
use log::trace;

/// Deepest nesting of compound filters the parser accepts.
pub const MAX_PARSE_NESTING: usize = 1024;

impl SearchFilter {
    /// Parse the string representation of a filter, resolving attribute
    /// names against `schema`. Names the schema does not know resolve to
    /// placeholder types; unknown matching rule IDs are kept and only
    /// matter at evaluation time.
    pub fn parse(filter: &str, schema: &Schema) -> FilterResult<SearchFilter> {
        let parsed = Parser::new(filter, schema).parse_filter()?;
        trace!("Parsed filter {filter} as {parsed}");
        Ok(parsed)
    }
}

struct Parser<'a> {
    input: &'a str,
    schema: &'a Schema,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, schema: &'a Schema) -> Self {
        Self { input, schema }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn error(&self, position: usize, kind: FilterParseErrorKind) -> FilterError {
        FilterError::parse(self.input, position, kind)
    }

    fn parse_filter(&self) -> FilterResult<SearchFilter> {
        let len = self.input.len();
        if len == 0 {
            return Err(self.error(0, FilterParseErrorKind::Empty));
        }
        if self.bytes()[0] == b'(' {
            let close = self.matching_close(0, len)?;
            if close != len - 1 {
                return Err(self.error(close + 1, FilterParseErrorKind::MismatchedParentheses));
            }
            self.parse_component(1, close, 1)
        } else {
            self.parse_component(0, len, 1)
        }
    }

    /// Index of the parenthesis closing the one at `open`.
    fn matching_close(&self, open: usize, end: usize) -> FilterResult<usize> {
        let mut depth = 0usize;
        for (offset, byte) in self.bytes()[open..end].iter().enumerate() {
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(open + offset);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(open, FilterParseErrorKind::MismatchedParentheses))
    }

    /// Parse the text between one pair of parentheses.
    fn parse_component(&self, start: usize, end: usize, depth: usize) -> FilterResult<SearchFilter> {
        if depth > MAX_PARSE_NESTING {
            return Err(self.error(start, FilterParseErrorKind::NestingTooDeep(MAX_PARSE_NESTING)));
        }
        if start >= end {
            return Err(self.error(start, FilterParseErrorKind::Empty));
        }
        match self.bytes()[start] {
            b'&' => Ok(SearchFilter::and(self.parse_children(start + 1, end, depth)?)),
            b'|' => Ok(SearchFilter::or(self.parse_children(start + 1, end, depth)?)),
            b'!' => {
                let mut children = self.parse_children(start + 1, end, depth)?;
                match children.pop() {
                    Some(child) if children.is_empty() => Ok(SearchFilter::not(child)),
                    popped => {
                        let count = children.len() + usize::from(popped.is_some());
                        Err(self.error(start, FilterParseErrorKind::NotComponentCount(count)))
                    }
                }
            }
            _ => self.parse_simple(start, end),
        }
    }

    fn parse_children(&self, start: usize, end: usize, depth: usize) -> FilterResult<Vec<SearchFilter>> {
        let bytes = self.bytes();
        let mut children = Vec::new();
        let mut pos = start;
        while pos < end {
            match bytes[pos] {
                b'(' => {
                    let close = self.matching_close(pos, end)?;
                    children.push(self.parse_component(pos + 1, close, depth + 1)?);
                    pos = close + 1;
                }
                b')' => return Err(self.error(pos, FilterParseErrorKind::MismatchedParentheses)),
                _ => return Err(self.error(pos, FilterParseErrorKind::UnparenthesizedComponent)),
            }
        }
        Ok(children)
    }

    fn parse_simple(&self, start: usize, end: usize) -> FilterResult<SearchFilter> {
        let bytes = self.bytes();
        let equals = bytes[start..end]
            .iter()
            .position(|&b| b == b'=')
            .map(|offset| start + offset)
            .ok_or_else(|| self.error(start, FilterParseErrorKind::NoEqualSign))?;
        if equals == start {
            return Err(self.error(start, FilterParseErrorKind::EmptyAttribute));
        }

        let value_start = equals + 1;
        let attribute_end = equals - 1;
        let marker = bytes[attribute_end];
        if marker == b':' {
            return self.parse_extensible(start, attribute_end, value_start, end);
        }

        let build: Option<fn(AttributeValueAssertion) -> SearchFilter> = match marker {
            b'~' => Some(SearchFilter::ApproximateMatch),
            b'>' => Some(SearchFilter::GreaterOrEqual),
            b'<' => Some(SearchFilter::LessOrEqual),
            _ => None,
        };
        if let Some(build) = build {
            let description = self.attribute_description(start, attribute_end)?;
            let value = self.unescape(value_start, end)?;
            return Ok(build(self.assertion(description, value)));
        }

        let description = self.attribute_description(start, equals)?;
        let raw = &bytes[value_start..end];
        if raw == b"*" {
            return Ok(SearchFilter::Present(description));
        }
        if raw.contains(&b'*') {
            return self.parse_substring(description, value_start, end);
        }
        let value = self.unescape(value_start, end)?;
        Ok(SearchFilter::Equality(self.assertion(description, value)))
    }

    fn parse_substring(
        &self,
        description: AttributeDescription,
        start: usize,
        end: usize,
    ) -> FilterResult<SearchFilter> {
        let mut segments = Vec::new();
        let mut segment_start = start;
        for (offset, &byte) in self.bytes()[start..end].iter().enumerate() {
            if byte == b'*' {
                segments.push((segment_start, start + offset));
                segment_start = start + offset + 1;
            }
        }
        segments.push((segment_start, end));

        let last = segments.len() - 1;
        let mut sub_initial = None;
        let mut sub_any = Vec::new();
        let mut sub_final = None;
        for (index, &(from, to)) in segments.iter().enumerate() {
            if from == to {
                continue;
            }
            let segment = self.unescape(from, to)?;
            if index == 0 {
                sub_initial = Some(segment);
            } else if index == last {
                sub_final = Some(segment);
            } else {
                sub_any.push(segment);
            }
        }

        Ok(SearchFilter::Substring(SubstringAssertion {
            attribute_type: description.attribute_type().clone(),
            options: description.options().clone(),
            sub_initial,
            sub_any,
            sub_final,
        }))
    }

    /// `attr[:dn][:rule]:=value`; the attribute may be empty when a rule is
    /// given.
    fn parse_extensible(
        &self,
        start: usize,
        colon: usize,
        value_start: usize,
        end: usize,
    ) -> FilterResult<SearchFilter> {
        let lhs = &self.input[start..colon];
        let mut parts = lhs.split(':');
        let attribute = parts.next().unwrap_or_default();
        let mut dn_attributes = false;
        let mut matching_rule_id = None;
        for part in parts {
            if part.eq_ignore_ascii_case("dn") {
                dn_attributes = true;
            } else if !part.is_empty() {
                matching_rule_id = Some(part.to_string());
            }
        }

        if attribute.is_empty() && matching_rule_id.is_none() {
            return Err(self.error(start, FilterParseErrorKind::ExtensibleMissingRuleAndType));
        }

        let (attribute_type, options) = if attribute.is_empty() {
            (None, Default::default())
        } else {
            let (name, options) = split_options(attribute);
            (Some(self.schema.attribute_type_or_default(name)), options)
        };
        let value = self.unescape(value_start, end)?;

        Ok(SearchFilter::ExtensibleMatch(ExtensibleMatchAssertion {
            attribute_type,
            options,
            matching_rule_id,
            value: AttributeValue::from(value),
            dn_attributes,
        }))
    }

    fn attribute_description(&self, start: usize, end: usize) -> FilterResult<AttributeDescription> {
        let text = &self.input[start..end];
        if text.is_empty() || text.starts_with(';') {
            return Err(self.error(start, FilterParseErrorKind::EmptyAttribute));
        }
        Ok(AttributeDescription::parse(text, self.schema))
    }

    fn assertion(&self, description: AttributeDescription, value: Vec<u8>) -> AttributeValueAssertion {
        AttributeValueAssertion::new(description.attribute_type().clone(), value)
            .with_options(description.options().clone())
    }

    /// Decode `\XX` hex escapes in `input[start..end]`.
    fn unescape(&self, start: usize, end: usize) -> FilterResult<Vec<u8>> {
        let bytes = self.bytes();
        let mut out = Vec::with_capacity(end - start);
        let mut pos = start;
        while pos < end {
            if bytes[pos] != b'\\' {
                out.push(bytes[pos]);
                pos += 1;
                continue;
            }
            let decoded = bytes
                .get(pos + 1..pos + 3)
                .filter(|hex| pos + 3 <= end && hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            match decoded {
                Some(byte) => out.push(byte),
                None => return Err(self.error(pos, FilterParseErrorKind::InvalidEscape)),
            }
            pos += 3;
        }
        Ok(out)
    }
}
