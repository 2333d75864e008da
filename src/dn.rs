//! Distinguished names.
//!
//! A [`Dn`] is a sequence of RDNs, leftmost (most specific) first. Parsing
//! follows the RFC 4514 string form, including `\XX` and `\<special>`
//! escapes and `#`-prefixed hex values. `PartialEq` and `Hash` use a
//! schema-free form that lowercases attribute names and applies case-ignore
//! matching to values. With a [`Schema`] in hand, [`Dn::normalized_with`]
//! and [`Dn::equals_with`] identify each attribute by OID and normalize its
//! value through the type's equality rule.

use crate::error::DnError;
use crate::schema::{Schema, SchemaElement};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One attribute value assertion within an RDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    attribute_name: String,
    value: Vec<u8>,
}

impl Ava {
    pub fn new(attribute_name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    fn normalized(&self) -> String {
        let value = String::from_utf8_lossy(&self.value);
        let folded = value.split_whitespace().collect::<Vec<_>>().join(" ");
        format!(
            "{}={}",
            self.attribute_name.to_ascii_lowercase(),
            escape_value(folded.to_lowercase().as_bytes())
        )
    }

    /// `oid=value` with the value normalized by the type's equality rule.
    /// Values the rule rejects are kept as given.
    pub fn normalized_with(&self, schema: &Schema) -> String {
        let attribute_type = schema.attribute_type_or_default(&self.attribute_name);
        format!(
            "{}={}",
            attribute_type.oid().to_ascii_lowercase(),
            escape_value(&attribute_type.value_key(&self.value))
        )
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_name, escape_value(&self.value))
    }
}

/// A relative distinguished name: one or more AVAs joined by `+`.
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    pub fn new(attribute_name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            avas: vec![Ava::new(attribute_name, value)],
        }
    }

    pub fn from_avas(avas: Vec<Ava>) -> Option<Self> {
        (!avas.is_empty()).then_some(Self { avas })
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    pub fn is_multi_valued(&self) -> bool {
        self.avas.len() > 1
    }

    /// The value asserted for `attribute_name`, if present.
    pub fn value_for(&self, attribute_name: &str) -> Option<&[u8]> {
        self.avas
            .iter()
            .find(|ava| ava.attribute_name.eq_ignore_ascii_case(attribute_name))
            .map(|ava| ava.value.as_slice())
    }

    pub fn normalized(&self) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }

    pub fn normalized_with(&self, schema: &Schema) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(|ava| ava.normalized_with(schema)).collect();
        parts.sort();
        parts.join("+")
    }

    pub fn equals_with(&self, other: &Rdn, schema: &Schema) -> bool {
        self.avas.len() == other.avas.len() && self.normalized_with(schema) == other.normalized_with(schema)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{ava}")?;
        }
        Ok(())
    }
}

/// A distinguished name.
#[derive(Debug, Clone, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The zero-length DN naming the root DSE.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// Parse the RFC 4514 string representation.
    pub fn parse(dn: &str) -> Result<Self, DnError> {
        Parser::new(dn).parse()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The leftmost RDN, absent for the null DN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The DN with the leftmost RDN removed, absent for the null DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    pub fn num_components(&self) -> usize {
        self.rdns.len()
    }

    /// True if this DN equals `base` or lies anywhere beneath it.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        if base.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - base.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&base.rdns)
            .all(|(a, b)| a == b)
    }

    /// Like [`Dn::is_descendant_of`], comparing RDNs through `schema`.
    pub fn is_descendant_of_with(&self, base: &Dn, schema: &Schema) -> bool {
        if base.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - base.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&base.rdns)
            .all(|(a, b)| a.equals_with(b, schema))
    }

    /// Lowercased, whitespace-folded string used for comparison and hashing.
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Normalized form keyed by attribute OIDs and equality-rule values.
    pub fn normalized_with(&self, schema: &Schema) -> String {
        self.rdns
            .iter()
            .map(|rdn| rdn.normalized_with(schema))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Equality through the attribute types' equality rules.
    pub fn equals_with(&self, other: &Dn, schema: &Schema) -> bool {
        self.rdns.len() == other.rdns.len()
            && self.rdns.iter().zip(&other.rdns).all(|(a, b)| a.equals_with(b, schema))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len() && self.normalized() == other.normalized()
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

/// Escape a value for the RFC 4514 string form.
fn escape_value(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len());
    let text = match std::str::from_utf8(value) {
        Ok(text) => text,
        Err(_) => {
            for byte in value {
                out.push_str(&format!("\\{byte:02X}"));
            }
            return out;
        }
    };
    let last = text.chars().count().saturating_sub(1);
    for (i, c) in text.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("\\{byte:02X}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> DnError {
        DnError::new(self.input, self.pos, reason)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Dn, DnError> {
        self.skip_spaces();
        if self.peek().is_none() {
            return Ok(Dn::null());
        }
        let mut rdns = Vec::new();
        loop {
            rdns.push(self.parse_rdn()?);
            match self.peek() {
                None => break,
                Some(b',') | Some(b';') => {
                    self.pos += 1;
                    self.skip_spaces();
                }
                Some(_) => return Err(self.error("expected ',' between RDNs")),
            }
        }
        Ok(Dn { rdns })
    }

    fn parse_rdn(&mut self) -> Result<Rdn, DnError> {
        let mut avas = Vec::new();
        loop {
            avas.push(self.parse_ava()?);
            if self.peek() == Some(b'+') {
                self.pos += 1;
                self.skip_spaces();
            } else {
                break;
            }
        }
        Ok(Rdn { avas })
    }

    fn parse_ava(&mut self) -> Result<Ava, DnError> {
        self.skip_spaces();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("missing attribute type"));
        }
        let attribute_name = self.input[start..self.pos].to_string();
        self.skip_spaces();
        if self.peek() != Some(b'=') {
            return Err(self.error("expected '=' after attribute type"));
        }
        self.pos += 1;
        self.skip_spaces();

        let value = match self.peek() {
            Some(b'#') => self.parse_hex_value()?,
            Some(b'"') => self.parse_quoted_value()?,
            _ => self.parse_string_value()?,
        };
        Ok(Ava {
            attribute_name,
            value,
        })
    }

    fn parse_hex_value(&mut self) -> Result<Vec<u8>, DnError> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
            self.pos += 1;
        }
        let hex = &self.input[start..self.pos];
        if hex.is_empty() || hex.len() % 2 != 0 {
            return Err(self.error("hex value must have an even number of digits"));
        }
        let value = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| self.error("invalid hex value"))?;
        self.skip_spaces();
        Ok(value)
    }

    fn parse_quoted_value(&mut self) -> Result<Vec<u8>, DnError> {
        self.pos += 1;
        let mut value = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted value")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => value.push(self.parse_escape()?),
                Some(b) => {
                    value.push(b);
                    self.pos += 1;
                }
            }
        }
        self.skip_spaces();
        Ok(value)
    }

    fn parse_string_value(&mut self) -> Result<Vec<u8>, DnError> {
        let mut value = Vec::new();
        // Length of `value` up to the last character that was escaped or
        // non-space; unescaped trailing spaces are dropped.
        let mut significant = 0;
        while let Some(b) = self.peek() {
            match b {
                b',' | b';' | b'+' => break,
                b'\\' => {
                    value.push(self.parse_escape()?);
                    significant = value.len();
                }
                b'"' | b'<' | b'>' | b'=' => {
                    return Err(self.error("special character must be escaped"));
                }
                b => {
                    value.push(b);
                    self.pos += 1;
                    if b != b' ' {
                        significant = value.len();
                    }
                }
            }
        }
        value.truncate(significant);
        Ok(value)
    }

    fn parse_escape(&mut self) -> Result<u8, DnError> {
        self.pos += 1;
        match self.peek() {
            Some(b) if b.is_ascii_hexdigit() => {
                let hex = self
                    .input
                    .get(self.pos..self.pos + 2)
                    .ok_or_else(|| self.error("truncated hex escape"))?;
                let byte =
                    u8::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
                self.pos += 2;
                Ok(byte)
            }
            Some(b) if b",+\"\\<>;=# ".contains(&b) => {
                self.pos += 1;
                Ok(b)
            }
            _ => Err(self.error("invalid escape sequence")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let dn = Dn::parse("uid=jdoe,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.num_components(), 4);
        assert_eq!(dn.rdn().unwrap().value_for("UID"), Some(&b"jdoe"[..]));
        assert_eq!(dn.to_string(), "uid=jdoe,ou=People,dc=example,dc=com");
    }

    #[test]
    fn test_null_dn() {
        let dn = Dn::parse("").unwrap();
        assert!(dn.is_null());
        assert!(dn.parent().is_none());
        assert_eq!(dn.to_string(), "");
    }

    #[test]
    fn test_normalized_equality() {
        let a = Dn::parse("CN=John  Doe, O=Example").unwrap();
        let b = Dn::parse("cn=john doe,o=example").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.normalized(), "cn=john doe,o=example");
    }

    #[test]
    fn test_multi_valued_rdn_order_independent() {
        let a = Dn::parse("cn=a+sn=b,o=x").unwrap();
        let b = Dn::parse("sn=b+cn=a,o=x").unwrap();
        assert!(a.rdn().unwrap().is_multi_valued());
        assert_eq!(a, b);
    }

    #[test]
    fn test_escapes() {
        let dn = Dn::parse(r"cn=Smith\, John,o=a\2Bb").unwrap();
        assert_eq!(dn.rdn().unwrap().value_for("cn"), Some(&b"Smith, John"[..]));
        assert_eq!(dn.rdns()[1].value_for("o"), Some(&b"a+b"[..]));
        assert_eq!(dn.to_string(), r"cn=Smith\, John,o=a\+b");

        let hex = Dn::parse("cn=#414243").unwrap();
        assert_eq!(hex.rdn().unwrap().value_for("cn"), Some(&b"ABC"[..]));
    }

    #[test]
    fn test_trailing_escaped_space_kept() {
        let dn = Dn::parse(r"cn=abc\ ,o=x").unwrap();
        assert_eq!(dn.rdn().unwrap().value_for("cn"), Some(&b"abc "[..]));
        let dn = Dn::parse("cn=abc   ,o=x").unwrap();
        assert_eq!(dn.rdn().unwrap().value_for("cn"), Some(&b"abc"[..]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Dn::parse("=value").is_err());
        assert!(Dn::parse("cn").is_err());
        assert!(Dn::parse("cn=a\\").is_err());
        assert!(Dn::parse("cn=#41Z").is_err());
        assert!(Dn::parse("cn=\"open").is_err());
    }

    #[test]
    fn test_schema_equality_uses_matching_rules() {
        let schema = Schema::with_core_schema().unwrap();

        let padded = Dn::parse("uidNumber=01,dc=example,dc=com").unwrap();
        let plain = Dn::parse("uidNumber=1,DC=Example,dc=com").unwrap();
        assert_ne!(padded, plain);
        assert!(padded.equals_with(&plain, &schema));
        assert_eq!(padded.normalized_with(&schema), plain.normalized_with(&schema));

        let alias = Dn::parse("commonName=Babs  Jensen,dc=example,dc=com").unwrap();
        let short = Dn::parse("cn=babs jensen,dc=example,dc=com").unwrap();
        assert!(alias.equals_with(&short, &schema));

        // homeDirectory uses caseExactIA5Match.
        let upper = Dn::parse("homeDirectory=/Home/Jdoe,dc=example,dc=com").unwrap();
        let lower = Dn::parse("homeDirectory=/home/jdoe,dc=example,dc=com").unwrap();
        assert_eq!(upper, lower);
        assert!(!upper.equals_with(&lower, &schema));

        let base = Dn::parse("DC=EXAMPLE,dc=com").unwrap();
        assert!(padded.is_descendant_of_with(&base, &schema));
        assert!(!base.is_descendant_of_with(&padded, &schema));
    }

    #[test]
    fn test_hierarchy() {
        let base = Dn::parse("dc=example,dc=com").unwrap();
        let child = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        assert!(child.is_descendant_of(&base));
        assert!(base.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&child));
        assert_eq!(child.parent(), Some(base.clone()));
        assert_eq!(base.child(Rdn::new("ou", "People")), child);
        assert!(child.is_descendant_of(&Dn::null()));
    }
}
