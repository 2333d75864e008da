//! Attributes, attribute values and attribute descriptions.

use crate::schema::{AttributeType, Schema, SchemaElement};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single attribute value as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AttributeValue(Vec<u8>);

impl AttributeValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Split `cn;lang-en;binary` into the name and a lowercased option set.
pub fn split_options(description: &str) -> (&str, BTreeSet<String>) {
    let mut parts = description.split(';');
    let name = parts.next().unwrap_or_default().trim();
    let options = parts
        .map(|option| option.trim().to_ascii_lowercase())
        .filter(|option| !option.is_empty())
        .collect();
    (name, options)
}

/// An attribute type plus an option set.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    attribute_type: Arc<AttributeType>,
    options: BTreeSet<String>,
}

impl AttributeDescription {
    pub fn new(attribute_type: Arc<AttributeType>, options: BTreeSet<String>) -> Self {
        Self {
            attribute_type,
            options,
        }
    }

    /// Resolve `name;options` against `schema`, using a placeholder type for
    /// unknown names.
    pub fn parse(description: &str, schema: &Schema) -> Self {
        let (name, options) = split_options(description);
        Self {
            attribute_type: schema.attribute_type_or_default(name),
            options,
        }
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    pub fn options(&self) -> &BTreeSet<String> {
        &self.options
    }
}

impl PartialEq for AttributeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_type == other.attribute_type && self.options == other.options
    }
}

impl Eq for AttributeDescription {}

impl Hash for AttributeDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attribute_type.hash(state);
        self.options.hash(state);
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_type.name_or_oid())?;
        for option in &self.options {
            write!(f, ";{option}")?;
        }
        Ok(())
    }
}

/// One attribute instance: a type, an option set and its values.
///
/// Values are kept in insertion order; duplicates are detected through the
/// type's equality matching rule. Each value is normalized once, on insert,
/// and its key kept alongside it.
#[derive(Debug, Clone)]
pub struct Attribute {
    attribute_type: Arc<AttributeType>,
    name: String,
    options: BTreeSet<String>,
    values: Vec<AttributeValue>,
    // `keys[i]` is the equality key of `values[i]`; `key_index` holds the same keys.
    keys: Vec<Vec<u8>>,
    key_index: HashSet<Vec<u8>>,
    is_virtual: bool,
}

impl Attribute {
    /// An attribute with no options named after its type's primary name.
    pub fn new<I, V>(attribute_type: Arc<AttributeType>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let mut builder = AttributeBuilder::new(attribute_type);
        builder.add_all(values);
        builder.build()
    }

    /// An attribute with no values.
    pub fn empty(attribute_type: Arc<AttributeType>) -> Self {
        AttributeBuilder::new(attribute_type).build()
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    /// The user-supplied name, preserving its spelling.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name;option1;option2`
    pub fn name_with_options(&self) -> String {
        let mut out = self.name.clone();
        for option in &self.options {
            out.push(';');
            out.push_str(option);
        }
        out
    }

    pub fn options(&self) -> &BTreeSet<String> {
        &self.options
    }

    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(&option.to_ascii_lowercase())
    }

    /// True if this instance carries every one of `options`.
    pub fn has_all_options(&self, options: &BTreeSet<String>) -> bool {
        options.is_subset(&self.options)
    }

    pub fn options_equal(&self, options: &BTreeSet<String>) -> bool {
        &self.options == options
    }

    pub fn description(&self) -> AttributeDescription {
        AttributeDescription::new(Arc::clone(&self.attribute_type), self.options.clone())
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.key_index
            .contains(&self.attribute_type.value_key(value.as_bytes()))
    }

    /// Add `value`, returning false if an equal value is already present.
    pub fn add(&mut self, value: AttributeValue) -> bool {
        let key = self.attribute_type.value_key(value.as_bytes());
        if !self.key_index.insert(key.clone()) {
            return false;
        }
        self.keys.push(key);
        self.values.push(value);
        true
    }

    /// Remove `value`, returning false if it was not present.
    pub fn remove(&mut self, value: &AttributeValue) -> bool {
        let key = self.attribute_type.value_key(value.as_bytes());
        if !self.key_index.remove(&key) {
            return false;
        }
        if let Some(position) = self.keys.iter().position(|k| *k == key) {
            self.keys.remove(position);
            self.values.remove(position);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.keys.clear();
        self.key_index.clear();
    }

    fn sorted_keys(&self) -> Vec<&[u8]> {
        let mut keys: Vec<&[u8]> = self.keys.iter().map(Vec::as_slice).collect();
        keys.sort_unstable();
        keys
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_type == other.attribute_type
            && self.options == other.options
            && self.values.len() == other.values.len()
            && self.key_index == other.key_index
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attribute_type.hash(state);
        self.options.hash(state);
        self.sorted_keys().hash(state);
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name_with_options())?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Incrementally builds an [`Attribute`].
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(attribute_type: Arc<AttributeType>) -> Self {
        let name = attribute_type.name_or_oid().to_string();
        Self {
            attribute: Attribute {
                attribute_type,
                name,
                options: BTreeSet::new(),
                values: Vec::new(),
                keys: Vec::new(),
                key_index: HashSet::new(),
                is_virtual: false,
            },
        }
    }

    /// Start from `name;options` resolved against `schema`.
    pub fn from_description(description: &str, schema: &Schema) -> Self {
        let (name, options) = split_options(description);
        let mut builder = Self::new(schema.attribute_type_or_default(name));
        builder.attribute.name = name.to_string();
        builder.attribute.options = options;
        builder
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.attribute.name = name.into();
        self
    }

    pub fn option(mut self, option: &str) -> Self {
        self.attribute.options.insert(option.to_ascii_lowercase());
        self
    }

    pub fn options(mut self, options: BTreeSet<String>) -> Self {
        self.attribute.options = options;
        self
    }

    pub fn set_virtual(mut self, is_virtual: bool) -> Self {
        self.attribute.is_virtual = is_virtual;
        self
    }

    pub fn add(&mut self, value: impl Into<AttributeValue>) -> bool {
        self.attribute.add(value.into())
    }

    pub fn add_all<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        for value in values {
            self.attribute.add(value.into());
        }
    }

    pub fn value(mut self, value: impl Into<AttributeValue>) -> Self {
        self.attribute.add(value.into());
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::with_core_schema().unwrap()
    }

    #[test]
    fn test_split_options() {
        let (name, options) = split_options("cn;Lang-EN;binary");
        assert_eq!(name, "cn");
        assert_eq!(
            options.into_iter().collect::<Vec<_>>(),
            vec!["binary".to_string(), "lang-en".to_string()]
        );
    }

    #[test]
    fn test_duplicate_detection_uses_equality_rule() {
        let schema = schema();
        let mut cn = Attribute::new(schema.attribute_type_or_default("cn"), ["Babs Jensen"]);
        assert!(!cn.add("babs  jensen".into()));
        assert!(cn.add("Barbara Jensen".into()));
        assert_eq!(cn.len(), 2);
        assert!(cn.remove(&"BARBARA JENSEN".into()));
        assert_eq!(cn.len(), 1);
    }

    #[test]
    fn test_large_value_sets_keep_keys_in_step() {
        let schema = schema();
        let member = schema.attribute_type_or_default("member");
        let mut builder = AttributeBuilder::new(member);
        builder.add_all((0..5000).map(|i| format!("uid=user{i},ou=People,dc=example,dc=com")));
        let mut members = builder.build();
        assert_eq!(members.len(), 5000);
        assert!(members.contains(&"UID=user4999, ou=people,dc=example,dc=com".into()));
        assert!(!members.add("uid=USER0,ou=People,dc=example,dc=com".into()));

        assert!(members.remove(&"uid=user10,ou=people,dc=example,dc=com".into()));
        assert!(!members.remove(&"uid=user10,ou=People,dc=example,dc=com".into()));
        assert_eq!(members.len(), 4999);
        assert!(members.add("uid=user10,ou=People,dc=example,dc=com".into()));
        assert_eq!(
            members.values().last().map(AttributeValue::to_string_lossy).as_deref(),
            Some("uid=user10,ou=People,dc=example,dc=com")
        );
    }

    #[test]
    fn test_equality_is_order_independent() {
        let schema = schema();
        let t = schema.attribute_type_or_default("description");
        let a = Attribute::new(Arc::clone(&t), ["one", "two"]);
        let b = Attribute::new(Arc::clone(&t), ["two", "one"]);
        assert_eq!(a, b);
        let c = AttributeBuilder::new(t).option("lang-fr").value("one").value("two").build();
        assert_ne!(a, c);
    }

    #[test]
    fn test_builder_from_description() {
        let schema = schema();
        let attr = AttributeBuilder::from_description("CN;lang-en", &schema)
            .value("x")
            .build();
        assert_eq!(attr.name_with_options(), "CN;lang-en");
        assert!(attr.has_option("LANG-EN"));
        assert_eq!(attr.attribute_type().oid(), "2.5.4.3");
    }
}
