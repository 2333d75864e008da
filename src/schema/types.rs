//! Schema element types.
//!
//! Elements are immutable once built. Relationships to other elements are
//! held as resolved `Arc` references captured at construction time, so a
//! schema edit replaces the changed element and then rebuilds every element
//! that referenced it (see [`Schema::rebuild_dependent_elements`]).
//!
//! [`Schema::rebuild_dependent_elements`]: super::Schema::rebuild_dependent_elements

use super::matching::{ConditionResult, MatchingAlgorithm, NormalizationResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// OID of the objectClass attribute type.
pub const OBJECT_CLASS_ATTRIBUTE_OID: &str = "2.5.4.0";
/// OID of the extensibleObject object class.
pub const EXTENSIBLE_OBJECT_OID: &str = "1.3.6.1.4.1.1466.101.120.111";
/// OID of the top object class.
pub const TOP_OBJECT_CLASS_OID: &str = "2.5.6.0";
/// Extension naming the schema file an element was loaded from.
pub const SCHEMA_FILE_EXTENSION: &str = "X-SCHEMA-FILE";

/// Identity and descriptive properties shared by every schema element.
#[derive(Debug, Clone, Default)]
pub struct ElementCommon {
    pub(crate) oid: String,
    pub(crate) names: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) obsolete: bool,
    pub(crate) extensions: Vec<(String, Vec<String>)>,
    pub(crate) definition: String,
}

/// Behaviour common to all schema element kinds.
pub trait SchemaElement: fmt::Debug + Send + Sync + 'static {
    /// Human readable element kind used in messages.
    const KIND: &'static str;

    fn common(&self) -> &ElementCommon;

    fn oid(&self) -> &str {
        &self.common().oid
    }

    fn names(&self) -> &[String] {
        &self.common().names
    }

    /// The primary name, or the OID if the element has no names.
    fn name_or_oid(&self) -> &str {
        self.names()
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.oid())
    }

    fn description(&self) -> Option<&str> {
        self.common().description.as_deref()
    }

    fn is_obsolete(&self) -> bool {
        self.common().obsolete
    }

    /// The RFC 4512 definition this element was built from.
    fn definition(&self) -> &str {
        &self.common().definition
    }

    fn extra_property(&self, name: &str) -> Option<&[String]> {
        self.common()
            .extensions
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// The schema file recorded by the `X-SCHEMA-FILE` extension.
    fn schema_file(&self) -> Option<&str> {
        self.extra_property(SCHEMA_FILE_EXTENSION)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn has_name(&self, lower_name: &str) -> bool {
        self.names()
            .iter()
            .any(|n| n.eq_ignore_ascii_case(lower_name))
    }

    fn has_name_or_oid(&self, lower_value: &str) -> bool {
        self.oid().eq_ignore_ascii_case(lower_value) || self.has_name(lower_value)
    }

    /// Keys this element occupies in its registry table: OID plus every name.
    fn lookup_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.names().len() + 1);
        keys.push(self.oid().to_ascii_lowercase());
        for name in self.names() {
            let key = name.to_ascii_lowercase();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

macro_rules! impl_schema_element {
    ($ty:ty, $kind:expr) => {
        impl SchemaElement for $ty {
            const KIND: &'static str = $kind;

            fn common(&self) -> &ElementCommon {
                &self.common
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.common.oid.eq_ignore_ascii_case(&other.common.oid)
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.common.oid.to_ascii_lowercase().hash(state);
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.common.definition)
            }
        }
    };
}

/// An attribute syntax.
#[derive(Debug, Clone)]
pub struct Syntax {
    pub(crate) common: ElementCommon,
    pub(crate) default_equality: Option<String>,
    pub(crate) default_ordering: Option<String>,
    pub(crate) default_substring: Option<String>,
    pub(crate) default_approximate: Option<String>,
}

impl_schema_element!(Syntax, "syntax");

impl Syntax {
    /// Build a syntax with the OIDs of the matching rules attribute types
    /// using it fall back to.
    pub fn new(
        oid: &str,
        description: &str,
        equality: Option<&str>,
        ordering: Option<&str>,
        substring: Option<&str>,
        approximate: Option<&str>,
    ) -> Self {
        let definition = format!("( {oid} DESC '{description}' )");
        Self {
            common: ElementCommon {
                oid: oid.to_string(),
                names: Vec::new(),
                description: Some(description.to_string()),
                obsolete: false,
                extensions: Vec::new(),
                definition,
            },
            default_equality: equality.map(str::to_string),
            default_ordering: ordering.map(str::to_string),
            default_substring: substring.map(str::to_string),
            default_approximate: approximate.map(str::to_string),
        }
    }
}

/// The role a matching rule plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingRuleKind {
    Equality,
    Ordering,
    Substring,
    Approximate,
    Extensible,
}

/// A matching rule with its comparison algorithm.
#[derive(Debug, Clone)]
pub struct MatchingRule {
    pub(crate) common: ElementCommon,
    pub(crate) kind: MatchingRuleKind,
    pub(crate) syntax_oid: String,
    pub(crate) algorithm: MatchingAlgorithm,
}

impl_schema_element!(MatchingRule, "matching rule");

impl MatchingRule {
    pub fn new(
        oid: &str,
        name: &str,
        syntax_oid: &str,
        kind: MatchingRuleKind,
        algorithm: MatchingAlgorithm,
    ) -> Self {
        let definition = format!("( {oid} NAME '{name}' SYNTAX {syntax_oid} )");
        Self {
            common: ElementCommon {
                oid: oid.to_string(),
                names: vec![name.to_string()],
                description: None,
                obsolete: false,
                extensions: Vec::new(),
                definition,
            },
            kind,
            syntax_oid: syntax_oid.to_string(),
            algorithm,
        }
    }

    pub fn kind(&self) -> MatchingRuleKind {
        self.kind
    }

    pub fn syntax_oid(&self) -> &str {
        &self.syntax_oid
    }

    pub fn algorithm(&self) -> MatchingAlgorithm {
        self.algorithm
    }

    pub fn normalize_attribute_value(&self, value: &[u8]) -> NormalizationResult {
        self.algorithm.normalize(value)
    }

    pub fn normalize_assertion_value(&self, value: &[u8]) -> NormalizationResult {
        self.algorithm.normalize(value)
    }

    pub fn normalize_substring(&self, value: &[u8]) -> NormalizationResult {
        self.algorithm.normalize_substring(value)
    }

    /// Compare an attribute value against an already normalized assertion.
    pub fn matches(&self, attribute_value: &[u8], normalized_assertion: &[u8]) -> ConditionResult {
        match self.normalize_attribute_value(attribute_value) {
            Ok(normalized) => (normalized == normalized_assertion).into(),
            Err(_) => ConditionResult::Undefined,
        }
    }

    /// Order an attribute value against an already normalized assertion.
    pub fn compare(
        &self,
        attribute_value: &[u8],
        normalized_assertion: &[u8],
    ) -> Option<Ordering> {
        self.normalize_attribute_value(attribute_value)
            .ok()
            .map(|normalized| self.algorithm.compare(&normalized, normalized_assertion))
    }
}

/// Intended use of an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeUsage {
    #[default]
    UserApplications,
    DirectoryOperation,
    DistributedOperation,
    DsaOperation,
}

impl AttributeUsage {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "userapplications" => Some(AttributeUsage::UserApplications),
            "directoryoperation" => Some(AttributeUsage::DirectoryOperation),
            "distributedoperation" => Some(AttributeUsage::DistributedOperation),
            "dsaoperation" => Some(AttributeUsage::DsaOperation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeUsage::UserApplications => "userApplications",
            AttributeUsage::DirectoryOperation => "directoryOperation",
            AttributeUsage::DistributedOperation => "distributedOperation",
            AttributeUsage::DsaOperation => "dSAOperation",
        }
    }

    pub fn is_operational(self) -> bool {
        self != AttributeUsage::UserApplications
    }
}

/// An attribute type.
#[derive(Debug, Clone)]
pub struct AttributeType {
    pub(crate) common: ElementCommon,
    pub(crate) superior: Option<Arc<AttributeType>>,
    pub(crate) syntax: Arc<Syntax>,
    pub(crate) syntax_length: Option<u32>,
    pub(crate) equality: Option<Arc<MatchingRule>>,
    pub(crate) ordering: Option<Arc<MatchingRule>>,
    pub(crate) substring: Option<Arc<MatchingRule>>,
    pub(crate) approximate: Option<Arc<MatchingRule>>,
    pub(crate) single_value: bool,
    pub(crate) collective: bool,
    pub(crate) no_user_modification: bool,
    pub(crate) usage: AttributeUsage,
    pub(crate) placeholder: bool,
}

impl_schema_element!(AttributeType, "attribute type");

impl AttributeType {
    pub fn superior(&self) -> Option<&Arc<AttributeType>> {
        self.superior.as_ref()
    }

    pub fn syntax(&self) -> &Arc<Syntax> {
        &self.syntax
    }

    pub fn syntax_length(&self) -> Option<u32> {
        self.syntax_length
    }

    pub fn equality_matching_rule(&self) -> Option<&Arc<MatchingRule>> {
        self.equality.as_ref()
    }

    pub fn ordering_matching_rule(&self) -> Option<&Arc<MatchingRule>> {
        self.ordering.as_ref()
    }

    pub fn substring_matching_rule(&self) -> Option<&Arc<MatchingRule>> {
        self.substring.as_ref()
    }

    pub fn approximate_matching_rule(&self) -> Option<&Arc<MatchingRule>> {
        self.approximate.as_ref()
    }

    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    pub fn is_collective(&self) -> bool {
        self.collective
    }

    pub fn is_no_user_modification(&self) -> bool {
        self.no_user_modification
    }

    pub fn usage(&self) -> AttributeUsage {
        self.usage
    }

    pub fn is_operational(&self) -> bool {
        self.usage.is_operational()
    }

    pub fn is_object_class(&self) -> bool {
        self.common.oid == OBJECT_CLASS_ATTRIBUTE_OID
    }

    /// True for types fabricated for names the schema does not know.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// True if `ancestor` appears in this type's superior chain.
    pub fn is_subtype_of(&self, ancestor: &AttributeType) -> bool {
        let mut current = self.superior.as_deref();
        while let Some(superior) = current {
            if superior == ancestor {
                return true;
            }
            current = superior.superior.as_deref();
        }
        false
    }

    pub fn is_same_or_subtype_of(&self, ancestor: &AttributeType) -> bool {
        self == ancestor || self.is_subtype_of(ancestor)
    }

    /// Normalized form used for duplicate detection: equality rule if any,
    /// raw bytes otherwise.
    pub fn value_key(&self, value: &[u8]) -> Vec<u8> {
        self.equality
            .as_ref()
            .and_then(|rule| rule.normalize_attribute_value(value).ok())
            .unwrap_or_else(|| value.to_vec())
    }

    /// Build a type for a name the schema does not define.
    pub(crate) fn placeholder(
        name: &str,
        syntax: Arc<Syntax>,
        equality: Option<Arc<MatchingRule>>,
        ordering: Option<Arc<MatchingRule>>,
        substring: Option<Arc<MatchingRule>>,
        approximate: Option<Arc<MatchingRule>>,
    ) -> Self {
        let oid = format!("{}-oid", name.to_ascii_lowercase());
        let definition = format!("( {oid} NAME '{name}' SYNTAX {} )", syntax.oid());
        Self {
            common: ElementCommon {
                oid,
                names: vec![name.to_string()],
                definition,
                ..ElementCommon::default()
            },
            superior: None,
            syntax,
            syntax_length: None,
            equality,
            ordering,
            substring,
            approximate,
            single_value: false,
            collective: false,
            no_user_modification: false,
            usage: AttributeUsage::UserApplications,
            placeholder: true,
        }
    }
}

/// The kind of an object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

impl ObjectClassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectClassKind::Abstract => "ABSTRACT",
            ObjectClassKind::Structural => "STRUCTURAL",
            ObjectClassKind::Auxiliary => "AUXILIARY",
        }
    }
}

fn list_allows(list: &[Arc<AttributeType>], attribute_type: &AttributeType) -> bool {
    list.iter()
        .any(|allowed| attribute_type.is_same_or_subtype_of(allowed))
}

fn push_unique(target: &mut Vec<Arc<AttributeType>>, items: &[Arc<AttributeType>]) {
    for item in items {
        if !target.contains(item) {
            target.push(Arc::clone(item));
        }
    }
}

/// An object class.
#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub(crate) common: ElementCommon,
    pub(crate) superiors: Vec<Arc<ObjectClass>>,
    pub(crate) kind: ObjectClassKind,
    pub(crate) required: Vec<Arc<AttributeType>>,
    pub(crate) optional: Vec<Arc<AttributeType>>,
    pub(crate) placeholder: bool,
}

impl_schema_element!(ObjectClass, "object class");

impl ObjectClass {
    pub fn kind(&self) -> ObjectClassKind {
        self.kind
    }

    pub fn superiors(&self) -> &[Arc<ObjectClass>] {
        &self.superiors
    }

    /// Required attributes declared directly on this class.
    pub fn declared_required_attributes(&self) -> &[Arc<AttributeType>] {
        &self.required
    }

    pub fn declared_optional_attributes(&self) -> &[Arc<AttributeType>] {
        &self.optional
    }

    /// Required attributes including those inherited from superiors.
    pub fn required_attributes(&self) -> Vec<Arc<AttributeType>> {
        let mut all = Vec::new();
        self.collect(&mut all, |oc| oc.required.as_slice());
        all
    }

    pub fn optional_attributes(&self) -> Vec<Arc<AttributeType>> {
        let mut all = Vec::new();
        self.collect(&mut all, |oc| oc.optional.as_slice());
        all
    }

    fn collect<F>(&self, out: &mut Vec<Arc<AttributeType>>, pick: F)
    where
        F: Fn(&ObjectClass) -> &[Arc<AttributeType>] + Copy,
    {
        push_unique(out, pick(self));
        for superior in &self.superiors {
            superior.collect(out, pick);
        }
    }

    pub fn is_required(&self, attribute_type: &AttributeType) -> bool {
        list_allows(&self.required, attribute_type)
            || self.superiors.iter().any(|s| s.is_required(attribute_type))
    }

    /// Optional either explicitly or because this is extensibleObject.
    pub fn is_optional(&self, attribute_type: &AttributeType) -> bool {
        if list_allows(&self.optional, attribute_type)
            || self.superiors.iter().any(|s| s.is_optional(attribute_type))
        {
            return true;
        }
        self.is_extensible_object() && !self.is_required(attribute_type)
    }

    pub fn is_required_or_optional(&self, attribute_type: &AttributeType) -> bool {
        self.is_required(attribute_type) || self.is_optional(attribute_type)
    }

    /// True if `ancestor` appears anywhere above this class.
    pub fn is_descendant_of(&self, ancestor: &ObjectClass) -> bool {
        self.superiors
            .iter()
            .any(|s| s.as_ref() == ancestor || s.is_descendant_of(ancestor))
    }

    pub fn is_extensible_object(&self) -> bool {
        self.common.oid == EXTENSIBLE_OBJECT_OID || self.has_name("extensibleobject")
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Build a class for a name the schema does not define.
    pub(crate) fn placeholder(name: &str, top: Option<Arc<ObjectClass>>) -> Self {
        let oid = format!("{}-oid", name.to_ascii_lowercase());
        let superior = if top.is_some() { " SUP top" } else { "" };
        let definition = format!("( {oid} NAME '{name}'{superior} STRUCTURAL )");
        Self {
            common: ElementCommon {
                oid,
                names: vec![name.to_string()],
                definition,
                ..ElementCommon::default()
            },
            superiors: top.into_iter().collect(),
            kind: ObjectClassKind::Structural,
            required: Vec::new(),
            optional: Vec::new(),
            placeholder: true,
        }
    }
}

/// A name form: which attributes may appear in the RDN of entries of a
/// structural class.
#[derive(Debug, Clone)]
pub struct NameForm {
    pub(crate) common: ElementCommon,
    pub(crate) structural_class: Arc<ObjectClass>,
    pub(crate) required: Vec<Arc<AttributeType>>,
    pub(crate) optional: Vec<Arc<AttributeType>>,
}

impl_schema_element!(NameForm, "name form");

impl NameForm {
    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        &self.structural_class
    }

    pub fn required_attributes(&self) -> &[Arc<AttributeType>] {
        &self.required
    }

    pub fn optional_attributes(&self) -> &[Arc<AttributeType>] {
        &self.optional
    }

    pub fn is_required(&self, attribute_type: &AttributeType) -> bool {
        self.required.iter().any(|t| t.as_ref() == attribute_type)
    }

    pub fn is_required_or_optional(&self, attribute_type: &AttributeType) -> bool {
        self.is_required(attribute_type)
            || self.optional.iter().any(|t| t.as_ref() == attribute_type)
    }
}

/// A DIT content rule governing entries of one structural class.
#[derive(Debug, Clone)]
pub struct DitContentRule {
    pub(crate) common: ElementCommon,
    pub(crate) structural_class: Arc<ObjectClass>,
    pub(crate) auxiliary: Vec<Arc<ObjectClass>>,
    pub(crate) required: Vec<Arc<AttributeType>>,
    pub(crate) optional: Vec<Arc<AttributeType>>,
    pub(crate) prohibited: Vec<Arc<AttributeType>>,
}

impl_schema_element!(DitContentRule, "DIT content rule");

impl DitContentRule {
    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        &self.structural_class
    }

    pub fn auxiliary_classes(&self) -> &[Arc<ObjectClass>] {
        &self.auxiliary
    }

    pub fn required_attributes(&self) -> &[Arc<AttributeType>] {
        &self.required
    }

    pub fn optional_attributes(&self) -> &[Arc<AttributeType>] {
        &self.optional
    }

    pub fn prohibited_attributes(&self) -> &[Arc<AttributeType>] {
        &self.prohibited
    }

    pub fn allows_auxiliary_class(&self, object_class: &ObjectClass) -> bool {
        self.auxiliary.iter().any(|oc| oc.as_ref() == object_class)
    }

    pub fn is_required_or_optional(&self, attribute_type: &AttributeType) -> bool {
        list_allows(&self.required, attribute_type) || list_allows(&self.optional, attribute_type)
    }
}

/// A DIT structure rule. Identified by an integer rule ID rather than an OID.
#[derive(Debug, Clone)]
pub struct DitStructureRule {
    pub(crate) common: ElementCommon,
    pub(crate) rule_id: u32,
    pub(crate) name_form: Arc<NameForm>,
    pub(crate) superiors: Vec<Arc<DitStructureRule>>,
}

impl_schema_element!(DitStructureRule, "DIT structure rule");

impl DitStructureRule {
    pub fn rule_id(&self) -> u32 {
        self.rule_id
    }

    pub fn name_form(&self) -> &Arc<NameForm> {
        &self.name_form
    }

    pub fn superior_rules(&self) -> &[Arc<DitStructureRule>] {
        &self.superiors
    }

    pub fn structural_class(&self) -> &Arc<ObjectClass> {
        self.name_form.structural_class()
    }
}

/// Restricts the attribute types an extensible matching rule applies to.
#[derive(Debug, Clone)]
pub struct MatchingRuleUse {
    pub(crate) common: ElementCommon,
    pub(crate) matching_rule: Arc<MatchingRule>,
    pub(crate) attributes: Vec<Arc<AttributeType>>,
}

impl_schema_element!(MatchingRuleUse, "matching rule use");

impl MatchingRuleUse {
    pub fn matching_rule(&self) -> &Arc<MatchingRule> {
        &self.matching_rule
    }

    pub fn attributes(&self) -> &[Arc<AttributeType>] {
        &self.attributes
    }

    pub fn applies_to(&self, attribute_type: &AttributeType) -> bool {
        self.attributes.iter().any(|t| t.as_ref() == attribute_type)
    }
}

/// A reference to any registered element, used where dependency rebuild
/// needs to dispatch on element kind.
#[derive(Debug, Clone)]
pub enum SchemaElementRef {
    AttributeType(Arc<AttributeType>),
    ObjectClass(Arc<ObjectClass>),
    Syntax(Arc<Syntax>),
    MatchingRule(Arc<MatchingRule>),
    MatchingRuleUse(Arc<MatchingRuleUse>),
    NameForm(Arc<NameForm>),
    DitContentRule(Arc<DitContentRule>),
    DitStructureRule(Arc<DitStructureRule>),
}

impl SchemaElementRef {
    pub fn name_or_oid(&self) -> &str {
        match self {
            SchemaElementRef::AttributeType(e) => e.name_or_oid(),
            SchemaElementRef::ObjectClass(e) => e.name_or_oid(),
            SchemaElementRef::Syntax(e) => e.name_or_oid(),
            SchemaElementRef::MatchingRule(e) => e.name_or_oid(),
            SchemaElementRef::MatchingRuleUse(e) => e.name_or_oid(),
            SchemaElementRef::NameForm(e) => e.name_or_oid(),
            SchemaElementRef::DitContentRule(e) => e.name_or_oid(),
            SchemaElementRef::DitStructureRule(e) => e.name_or_oid(),
        }
    }

    pub fn oid(&self) -> &str {
        match self {
            SchemaElementRef::AttributeType(e) => e.oid(),
            SchemaElementRef::ObjectClass(e) => e.oid(),
            SchemaElementRef::Syntax(e) => e.oid(),
            SchemaElementRef::MatchingRule(e) => e.oid(),
            SchemaElementRef::MatchingRuleUse(e) => e.oid(),
            SchemaElementRef::NameForm(e) => e.oid(),
            SchemaElementRef::DitContentRule(e) => e.oid(),
            SchemaElementRef::DitStructureRule(e) => e.oid(),
        }
    }
}
