//! Error types for directory core operations.
//!
//! Errors are grouped by family: schema constraint violations, entry
//! modification failures, binary decode failures, filter parse and
//! evaluation failures, and DN syntax errors. [`DirectoryError`] aggregates
//! them for callers that do not care which subsystem failed, and every error
//! can be mapped onto the LDAP [`ResultCode`] a protocol front end would
//! return.

use std::fmt;

/// Main error type for directory core operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Schema registry and schema element errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Entry modification errors
    #[error("Modification error: {0}")]
    Modification(#[from] ModificationError),

    /// Binary entry decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Search filter parse and evaluation errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Entry does not conform to the schema
    #[error("Schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    /// Distinguished name syntax errors
    #[error("DN error: {0}")]
    Dn(#[from] DnError),

    /// LDIF import and export errors
    #[error("LDIF error: {0}")]
    Ldif(#[from] LdifError),

    /// JSON configuration errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// LDAP result codes produced by the directory core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    ConstraintViolation,
    NoSuchAttribute,
    UndefinedAttributeType,
    NoSuchObject,
    Busy,
    InvalidAttributeSyntax,
    AttributeOrValueExists,
    InvalidDnSyntax,
    UnwillingToPerform,
    ObjectClassViolation,
    Other,
}

impl ResultCode {
    /// The numeric code defined by RFC 4511.
    pub fn int_value(self) -> u8 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::ProtocolError => 2,
            ResultCode::NoSuchAttribute => 16,
            ResultCode::UndefinedAttributeType => 17,
            ResultCode::ConstraintViolation => 19,
            ResultCode::AttributeOrValueExists => 20,
            ResultCode::InvalidAttributeSyntax => 21,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidDnSyntax => 34,
            ResultCode::Busy => 51,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::ObjectClassViolation => 65,
            ResultCode::Other => 80,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.int_value())
    }
}

/// Schema registry errors.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Another element is already registered under this element's OID
    #[error("Cannot register {kind} '{element}': OID {oid} conflicts with existing element '{existing}'")]
    ConflictingOid {
        kind: &'static str,
        element: String,
        oid: String,
        existing: String,
    },

    /// Another element is already registered under one of this element's names
    #[error("Cannot register {kind} '{element}': name '{name}' conflicts with existing element '{existing}'")]
    ConflictingName {
        kind: &'static str,
        element: String,
        name: String,
        existing: String,
    },

    /// A definition references an element that is not registered
    #[error("Unknown {kind} '{name}' referenced by '{referenced_by}'")]
    UnknownElement {
        kind: &'static str,
        name: String,
        referenced_by: String,
    },

    /// A definition string could not be parsed
    #[error("Malformed definition '{definition}': {reason}")]
    MalformedDefinition { definition: String, reason: String },

    /// Dependency rebuilding exceeded the configured depth
    #[error("Circular dependency detected while rebuilding elements dependent on '{element}'")]
    CircularDependency { element: String },

    /// Concatenated schema file I/O
    #[error("Schema file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    /// Create a malformed definition error
    pub fn malformed(definition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDefinition {
            definition: definition.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown element error
    pub fn unknown(
        kind: &'static str,
        name: impl Into<String>,
        referenced_by: impl Into<String>,
    ) -> Self {
        Self::UnknownElement {
            kind,
            name: name.into(),
            referenced_by: referenced_by.into(),
        }
    }

    pub fn result_code(&self) -> ResultCode {
        match self {
            SchemaError::ConflictingOid { .. } | SchemaError::ConflictingName { .. } => {
                ResultCode::ConstraintViolation
            }
            SchemaError::UnknownElement { .. } => ResultCode::ConstraintViolation,
            SchemaError::MalformedDefinition { .. } => ResultCode::InvalidAttributeSyntax,
            SchemaError::CircularDependency { .. } => ResultCode::ConstraintViolation,
            SchemaError::Io(_) => ResultCode::Other,
        }
    }
}

/// Errors raised while applying modifications to an entry.
#[derive(Debug, thiserror::Error)]
pub enum ModificationError {
    /// Added values are already present
    #[error("Entry {dn} already contains values {values:?} for attribute '{attribute}'")]
    AttributeOrValueExists {
        dn: String,
        attribute: String,
        values: Vec<String>,
    },

    /// The attribute to modify does not exist
    #[error("Entry {dn} does not contain attribute '{attribute}'")]
    NoSuchAttribute { dn: String, attribute: String },

    /// Values named for deletion are absent
    #[error("Entry {dn} does not contain values {values:?} for attribute '{attribute}'")]
    NoSuchValue {
        dn: String,
        attribute: String,
        values: Vec<String>,
    },

    /// An increment modification did not carry exactly one value
    #[error("Increment of attribute '{attribute}' requires exactly one value, got {count}")]
    IncrementValueCount { attribute: String, count: usize },

    /// The increment amount is not an integer
    #[error("Increment value '{value}' for attribute '{attribute}' is not an integer")]
    IncrementNotInteger { attribute: String, value: String },

    /// More than one attribute instance or value is present for an increment
    #[error("Cannot increment attribute '{attribute}': it has {instances} instance(s) holding {values} value(s)")]
    IncrementMultipleValues {
        attribute: String,
        instances: usize,
        values: usize,
    },

    /// The existing value is not an integer
    #[error("Cannot increment attribute '{attribute}': existing value '{value}' is not an integer")]
    IncrementExistingNotInteger { attribute: String, value: String },

    /// The increment would overflow a 64-bit integer
    #[error("Increment of attribute '{attribute}' overflows")]
    IncrementOverflow { attribute: String },

    /// Object classes can never be incremented
    #[error("Cannot apply an increment modification to the objectClass attribute of {dn}")]
    ObjectClassIncrement { dn: String },
}

impl ModificationError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            ModificationError::AttributeOrValueExists { .. } => ResultCode::AttributeOrValueExists,
            ModificationError::NoSuchAttribute { .. } | ModificationError::NoSuchValue { .. } => {
                ResultCode::NoSuchAttribute
            }
            ModificationError::IncrementValueCount { .. }
            | ModificationError::IncrementNotInteger { .. }
            | ModificationError::IncrementMultipleValues { .. }
            | ModificationError::IncrementExistingNotInteger { .. }
            | ModificationError::IncrementOverflow { .. } => ResultCode::ConstraintViolation,
            ModificationError::ObjectClassIncrement { .. } => ResultCode::UnwillingToPerform,
        }
    }
}

/// Low-level structural faults found while reading an encoded entry.
#[derive(Debug, thiserror::Error)]
pub enum CodecFault {
    #[error("needed {needed} byte(s) at offset {offset} but only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid BER length at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("missing zero terminator after offset {offset}")]
    Unterminated { offset: usize },

    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unknown compressed schema token {token}")]
    UnknownToken { token: u32 },

    #[error("invalid encoded DN: {0}")]
    Dn(#[from] DnError),

    #[error("{count} trailing byte(s) after the encoded entry")]
    TrailingBytes { count: usize },
}

/// Errors raised by binary entry decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The leading version byte is not one this codec writes
    #[error("Unrecognized entry encoding version 0x{0:02x}")]
    UnrecognizedVersion(u8),

    /// Any other structural failure
    #[error("Unable to decode entry: {0}")]
    Malformed(#[source] CodecFault),
}

impl From<CodecFault> for DecodeError {
    fn from(fault: CodecFault) -> Self {
        DecodeError::Malformed(fault)
    }
}

impl DecodeError {
    pub fn result_code(&self) -> ResultCode {
        ResultCode::Other
    }
}

/// What went wrong while parsing a filter string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseErrorKind {
    #[error("the filter string is empty")]
    Empty,
    #[error("mismatched parentheses")]
    MismatchedParentheses,
    #[error("compound filter components must be enclosed in parentheses")]
    UnparenthesizedComponent,
    #[error("a NOT filter must contain exactly one component, found {0}")]
    NotComponentCount(usize),
    #[error("no equal sign found")]
    NoEqualSign,
    #[error("attribute description is empty")]
    EmptyAttribute,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("extensible match requires an attribute type or a matching rule ID")]
    ExtensibleMissingRuleAndType,
    #[error("filter nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Search filter parse and evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The filter string cannot be parsed
    #[error("Cannot decode filter '{filter}' at position {position}: {kind}")]
    Parse {
        filter: String,
        position: usize,
        kind: FilterParseErrorKind,
    },

    /// Evaluation reached the nesting bound
    #[error("Filter evaluation exceeded the maximum nesting depth of {max_depth}")]
    NestedTooDeep { max_depth: usize },

    /// A substring filter carries no subInitial, subAny or subFinal element
    #[error("Substring filter {filter} has no substring components")]
    MissingSubstringComponents { filter: String },

    /// An extensible match filter carries neither attribute type nor rule ID
    #[error("Extensible match filter {filter} has neither an attribute type nor a matching rule ID")]
    ExtensibleMissingRuleAndType { filter: String },
}

impl FilterError {
    pub fn parse(filter: &str, position: usize, kind: FilterParseErrorKind) -> Self {
        Self::Parse {
            filter: filter.to_string(),
            position,
            kind,
        }
    }

    /// Evaluation errors are never retryable; parse errors are malformed input.
    pub fn result_code(&self) -> ResultCode {
        ResultCode::ProtocolError
    }
}

/// Distinguished name syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid DN '{dn}' at position {position}: {reason}")]
pub struct DnError {
    pub dn: String,
    pub position: usize,
    pub reason: String,
}

impl DnError {
    pub fn new(dn: &str, position: usize, reason: impl Into<String>) -> Self {
        Self {
            dn: dn.to_string(),
            position,
            reason: reason.into(),
        }
    }
}

/// Reasons an entry fails schema conformance checking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("Entry {dn} does not include a structural object class")]
    NoStructuralObjectClass { dn: String },

    #[error("Entry {dn} has multiple conflicting structural object classes '{first}' and '{second}'")]
    MultipleStructuralObjectClasses {
        dn: String,
        first: String,
        second: String,
    },

    #[error("Entry {dn} contains object class '{object_class}' which is not defined in the schema")]
    UnknownObjectClass { dn: String, object_class: String },

    #[error("Entry {dn} includes auxiliary class '{object_class}' which DIT content rule '{rule}' does not allow")]
    AuxiliaryClassNotAllowed {
        dn: String,
        object_class: String,
        rule: String,
    },

    #[error("Entry {dn} is missing attribute '{attribute}' required by object class '{object_class}'")]
    MissingRequiredAttribute {
        dn: String,
        attribute: String,
        object_class: String,
    },

    #[error("Entry {dn} includes attribute '{attribute}' which no object class allows")]
    DisallowedAttribute { dn: String, attribute: String },

    #[error("Entry {dn} includes attribute '{attribute}' with no values")]
    EmptyAttribute { dn: String, attribute: String },

    #[error("Entry {dn} has {count} values for single-valued attribute '{attribute}'")]
    SingleValuedAttribute {
        dn: String,
        attribute: String,
        count: usize,
    },

    #[error("Entry {dn} RDN is missing attribute '{attribute}' required by name form '{name_form}'")]
    RdnMissingRequiredAttribute {
        dn: String,
        attribute: String,
        name_form: String,
    },

    #[error("Entry {dn} RDN contains attribute '{attribute}' which name form '{name_form}' does not allow")]
    RdnDisallowedAttribute {
        dn: String,
        attribute: String,
        name_form: String,
    },

    #[error("Entry {dn} RDN does not satisfy any name form for structural class '{object_class}'")]
    NoMatchingNameForm { dn: String, object_class: String },

    #[error("Entry {dn} is missing attribute '{attribute}' required by DIT content rule '{rule}'")]
    ContentRuleMissingAttribute {
        dn: String,
        attribute: String,
        rule: String,
    },

    #[error("Entry {dn} contains attribute '{attribute}' prohibited by DIT content rule '{rule}'")]
    ContentRuleProhibitedAttribute {
        dn: String,
        attribute: String,
        rule: String,
    },

    #[error("Parent entry {parent} of {dn} does not exist")]
    ParentNotFound { dn: String, parent: String },

    #[error("Unable to obtain a read lock on parent entry {parent} of {dn}")]
    ParentLockUnavailable { dn: String, parent: String },

    #[error("Unable to retrieve parent entry {parent} of {dn}: {reason}")]
    ParentLookupFailed {
        dn: String,
        parent: String,
        reason: String,
    },

    #[error("Parent entry of {dn} has no structural object class")]
    ParentWithoutStructuralClass { dn: String },

    #[error("DIT structure rule '{rule}' does not allow entry {dn} beneath a parent of class '{parent_class}'")]
    StructureRuleViolation {
        dn: String,
        rule: String,
        parent_class: String,
    },
}

impl SchemaViolation {
    pub fn result_code(&self) -> ResultCode {
        match self {
            SchemaViolation::SingleValuedAttribute { .. } => ResultCode::ConstraintViolation,
            SchemaViolation::ParentLockUnavailable { .. }
            | SchemaViolation::ParentLookupFailed { .. } => ResultCode::Busy,
            SchemaViolation::ParentNotFound { .. } => ResultCode::NoSuchObject,
            _ => ResultCode::ObjectClassViolation,
        }
    }
}

/// LDIF import and export errors.
#[derive(Debug, thiserror::Error)]
pub enum LdifError {
    #[error("LDIF I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid LDIF at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid DN in LDIF: {0}")]
    Dn(#[from] DnError),

    #[error("Export plugin rejected entry {dn}: {message}")]
    Plugin { dn: String, message: String },

    #[error("Cannot evaluate export filter: {0}")]
    Filter(#[from] FilterError),
}

impl DirectoryError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            DirectoryError::Schema(e) => e.result_code(),
            DirectoryError::Modification(e) => e.result_code(),
            DirectoryError::Decode(e) => e.result_code(),
            DirectoryError::Filter(e) => e.result_code(),
            DirectoryError::SchemaViolation(e) => e.result_code(),
            DirectoryError::Dn(_) => ResultCode::InvalidDnSyntax,
            DirectoryError::Ldif(_) | DirectoryError::Json(_) => ResultCode::Other,
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
pub type SchemaResult<T> = Result<T, SchemaError>;
pub type ModificationResult<T> = Result<T, ModificationError>;
pub type DecodeResult<T> = Result<T, DecodeError>;
pub type FilterResult<T> = Result<T, FilterError>;
pub type ConformanceResult = Result<(), SchemaViolation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        let err = ModificationError::ObjectClassIncrement {
            dn: "dc=example".into(),
        };
        assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);
        assert_eq!(err.result_code().int_value(), 53);

        let err: DirectoryError = DecodeError::UnrecognizedVersion(9).into();
        assert_eq!(err.result_code(), ResultCode::Other);
        assert!(err.to_string().contains("0x09"));
    }

    #[test]
    fn test_decode_fault_wrapping() {
        let err: DecodeError = CodecFault::Truncated {
            offset: 3,
            needed: 4,
            available: 1,
        }
        .into();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_filter_parse_error_display() {
        let err = FilterError::parse("(cn=a", 0, FilterParseErrorKind::MismatchedParentheses);
        assert_eq!(
            err.to_string(),
            "Cannot decode filter '(cn=a' at position 0: mismatched parentheses"
        );
    }
}
