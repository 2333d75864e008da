//! Runtime configuration for the directory core.
//!
//! The values here are normally supplied by the surrounding server's
//! configuration layer. They can also be loaded from JSON for tools and
//! tests.

use crate::error::DirectoryResult;
use serde::{Deserialize, Serialize};

/// Default bound on filter nesting during evaluation.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 100;

/// Default bound on dependent-element rebuild recursion.
pub const DEFAULT_MAX_REBUILD_DEPTH: usize = 20;

/// Default number of attempts to read-lock a parent entry.
pub const DEFAULT_PARENT_LOCK_ATTEMPTS: u32 = 3;

/// Tri-state policy applied to ambiguous schema conformance checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcceptRejectWarn {
    /// Silently allow the condition
    Accept,
    /// Fail the check
    #[default]
    Reject,
    /// Log a warning and continue
    Warn,
}

/// Flags controlling the V2 binary entry encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EntryEncodeConfig {
    /// Omit the DN; the storage layer keys entries by DN already.
    pub exclude_dn: bool,
    /// Replace attribute descriptions with compressed schema tokens.
    pub compress_attribute_descriptions: bool,
    /// Replace the object class set with a single compressed schema token.
    pub compress_object_class_sets: bool,
}

impl EntryEncodeConfig {
    const EXCLUDE_DN: u8 = 0x01;
    const COMPRESS_ATTRIBUTE_DESCRIPTIONS: u8 = 0x02;
    const COMPRESS_OBJECT_CLASS_SETS: u8 = 0x04;

    pub fn compressed() -> Self {
        Self {
            exclude_dn: false,
            compress_attribute_descriptions: true,
            compress_object_class_sets: true,
        }
    }

    /// The single flag byte written into the V2 configuration block.
    pub fn to_flags(self) -> u8 {
        let mut flags = 0;
        if self.exclude_dn {
            flags |= Self::EXCLUDE_DN;
        }
        if self.compress_attribute_descriptions {
            flags |= Self::COMPRESS_ATTRIBUTE_DESCRIPTIONS;
        }
        if self.compress_object_class_sets {
            flags |= Self::COMPRESS_OBJECT_CLASS_SETS;
        }
        flags
    }

    pub fn from_flags(flags: u8) -> Self {
        Self {
            exclude_dn: flags & Self::EXCLUDE_DN != 0,
            compress_attribute_descriptions: flags & Self::COMPRESS_ATTRIBUTE_DESCRIPTIONS != 0,
            compress_object_class_sets: flags & Self::COMPRESS_OBJECT_CLASS_SETS != 0,
        }
    }
}

/// Configuration for schema checking, filter evaluation and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Policy for entries with zero or several unrelated structural classes,
    /// and for DIT content rule, name form and DIT structure rule mismatches.
    pub single_structural_objectclass_policy: AcceptRejectWarn,
    /// Maximum nesting of compound filters accepted during evaluation.
    pub max_filter_depth: usize,
    /// Maximum recursion while rebuilding dependent schema elements.
    pub max_rebuild_depth: usize,
    /// Attempts made to read-lock a parent entry for structure rule checks.
    pub parent_lock_attempts: u32,
    /// Check RDNs against applicable name forms.
    pub validate_name_forms: bool,
    /// Check parent/child placement against DIT structure rules.
    pub validate_structure_rules: bool,
    /// Encoding used when entries are written for storage.
    pub entry_encoding: EntryEncodeConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            single_structural_objectclass_policy: AcceptRejectWarn::default(),
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
            max_rebuild_depth: DEFAULT_MAX_REBUILD_DEPTH,
            parent_lock_attempts: DEFAULT_PARENT_LOCK_ATTEMPTS,
            validate_name_forms: true,
            validate_structure_rules: true,
            entry_encoding: EntryEncodeConfig::default(),
        }
    }
}

impl DirectoryConfig {
    /// Load configuration from a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> DirectoryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_structural_policy(mut self, policy: AcceptRejectWarn) -> Self {
        self.single_structural_objectclass_policy = policy;
        self
    }

    pub fn with_max_filter_depth(mut self, depth: usize) -> Self {
        self.max_filter_depth = depth;
        self
    }

    pub fn with_max_rebuild_depth(mut self, depth: usize) -> Self {
        self.max_rebuild_depth = depth;
        self
    }

    pub fn with_entry_encoding(mut self, encoding: EntryEncodeConfig) -> Self {
        self.entry_encoding = encoding;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DirectoryConfig::default();
        assert_eq!(config.max_filter_depth, 100);
        assert_eq!(config.max_rebuild_depth, 20);
        assert_eq!(config.parent_lock_attempts, 3);
        assert_eq!(
            config.single_structural_objectclass_policy,
            AcceptRejectWarn::Reject
        );
    }

    #[test]
    fn test_from_json_partial() {
        let config = DirectoryConfig::from_json_str(
            r#"{"single_structural_objectclass_policy": "warn", "max_filter_depth": 10}"#,
        )
        .expect("valid config");
        assert_eq!(
            config.single_structural_objectclass_policy,
            AcceptRejectWarn::Warn
        );
        assert_eq!(config.max_filter_depth, 10);
        assert_eq!(config.max_rebuild_depth, 20);
    }

    #[test]
    fn test_encode_flags() {
        let config = EntryEncodeConfig {
            exclude_dn: true,
            compress_attribute_descriptions: false,
            compress_object_class_sets: true,
        };
        assert_eq!(config.to_flags(), 0x05);
        assert_eq!(EntryEncodeConfig::from_flags(0x05), config);
        assert_eq!(EntryEncodeConfig::default().to_flags(), 0);
    }
}
