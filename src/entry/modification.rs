//! Attribute modifications applied to entries.

use super::attribute::Attribute;
use std::fmt;

/// The LDAP modify operation kinds, including the RFC 4525 increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
    Increment,
}

impl ModificationType {
    /// The LDIF change keyword.
    pub fn ldif_keyword(self) -> &'static str {
        match self {
            ModificationType::Add => "add",
            ModificationType::Delete => "delete",
            ModificationType::Replace => "replace",
            ModificationType::Increment => "increment",
        }
    }
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ldif_keyword())
    }
}

/// One change to one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    kind: ModificationType,
    attribute: Attribute,
}

impl Modification {
    pub fn new(kind: ModificationType, attribute: Attribute) -> Self {
        Self { kind, attribute }
    }

    pub fn add(attribute: Attribute) -> Self {
        Self::new(ModificationType::Add, attribute)
    }

    pub fn delete(attribute: Attribute) -> Self {
        Self::new(ModificationType::Delete, attribute)
    }

    pub fn replace(attribute: Attribute) -> Self {
        Self::new(ModificationType::Replace, attribute)
    }

    pub fn increment(attribute: Attribute) -> Self {
        Self::new(ModificationType::Increment, attribute)
    }

    pub fn kind(&self) -> ModificationType {
        self.kind
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn into_attribute(self) -> Attribute {
        self.attribute
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.attribute)
    }
}
