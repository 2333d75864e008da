//! Search filter nodes.

use crate::entry::{AttributeDescription, AttributeValue};
use crate::schema::AttributeType;
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An attribute description paired with an assertion value, used by the
/// equality, ordering and approximate kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeValueAssertion {
    pub attribute_type: Arc<AttributeType>,
    pub options: BTreeSet<String>,
    pub value: AttributeValue,
}

impl AttributeValueAssertion {
    pub fn new(attribute_type: Arc<AttributeType>, value: impl Into<AttributeValue>) -> Self {
        Self {
            attribute_type,
            options: BTreeSet::new(),
            value: value.into(),
        }
    }

    pub fn with_options(mut self, options: BTreeSet<String>) -> Self {
        self.options = options;
        self
    }
}

/// subInitial, subAny and subFinal segments for one attribute.
#[derive(Debug, Clone)]
pub struct SubstringAssertion {
    pub attribute_type: Arc<AttributeType>,
    pub options: BTreeSet<String>,
    pub sub_initial: Option<Vec<u8>>,
    pub sub_any: Vec<Vec<u8>>,
    pub sub_final: Option<Vec<u8>>,
}

impl SubstringAssertion {
    pub fn has_components(&self) -> bool {
        self.sub_initial.is_some() || !self.sub_any.is_empty() || self.sub_final.is_some()
    }

    /// Segments normalized by the type's substring rule, raw bytes when the
    /// type has none or normalization fails.
    fn normalized(&self) -> (Option<Vec<u8>>, Vec<Vec<u8>>, Option<Vec<u8>>) {
        let rule = self.attribute_type.substring_matching_rule();
        let normalize = |segment: &[u8]| {
            rule.and_then(|rule| rule.normalize_substring(segment).ok())
                .unwrap_or_else(|| segment.to_vec())
        };
        (
            self.sub_initial.as_deref().map(normalize),
            self.sub_any.iter().map(|s| normalize(s)).collect(),
            self.sub_final.as_deref().map(normalize),
        )
    }
}

impl PartialEq for SubstringAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_type == other.attribute_type
            && self.options == other.options
            && self.normalized() == other.normalized()
    }
}

impl Eq for SubstringAssertion {}

impl Hash for SubstringAssertion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attribute_type.hash(state);
        self.options.hash(state);
        self.normalized().hash(state);
    }
}

/// Extensible match: an optional attribute type, an optional matching rule
/// ID (at least one of the two is set by the parser) and the dnAttributes
/// flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensibleMatchAssertion {
    pub attribute_type: Option<Arc<AttributeType>>,
    pub options: BTreeSet<String>,
    pub matching_rule_id: Option<String>,
    pub value: AttributeValue,
    pub dn_attributes: bool,
}

/// A search filter tree.
///
/// Compound filters hold their children with duplicates removed; equality
/// and hashing ignore child order.
#[derive(Debug, Clone)]
pub enum SearchFilter {
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
    Not(Box<SearchFilter>),
    Equality(AttributeValueAssertion),
    Substring(SubstringAssertion),
    GreaterOrEqual(AttributeValueAssertion),
    LessOrEqual(AttributeValueAssertion),
    Present(AttributeDescription),
    ApproximateMatch(AttributeValueAssertion),
    ExtensibleMatch(ExtensibleMatchAssertion),
}

fn dedup(children: impl IntoIterator<Item = SearchFilter>) -> Vec<SearchFilter> {
    let mut unique: Vec<SearchFilter> = Vec::new();
    for child in children {
        if !unique.contains(&child) {
            unique.push(child);
        }
    }
    unique
}

impl SearchFilter {
    /// `(&)` with no components is the absolute true filter.
    pub fn and(children: impl IntoIterator<Item = SearchFilter>) -> Self {
        SearchFilter::And(dedup(children))
    }

    /// `(|)` with no components is the absolute false filter.
    pub fn or(children: impl IntoIterator<Item = SearchFilter>) -> Self {
        SearchFilter::Or(dedup(children))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: SearchFilter) -> Self {
        SearchFilter::Not(Box::new(child))
    }

    pub fn equality(attribute_type: Arc<AttributeType>, value: impl Into<AttributeValue>) -> Self {
        SearchFilter::Equality(AttributeValueAssertion::new(attribute_type, value))
    }

    pub fn greater_or_equal(attribute_type: Arc<AttributeType>, value: impl Into<AttributeValue>) -> Self {
        SearchFilter::GreaterOrEqual(AttributeValueAssertion::new(attribute_type, value))
    }

    pub fn less_or_equal(attribute_type: Arc<AttributeType>, value: impl Into<AttributeValue>) -> Self {
        SearchFilter::LessOrEqual(AttributeValueAssertion::new(attribute_type, value))
    }

    pub fn approximate(attribute_type: Arc<AttributeType>, value: impl Into<AttributeValue>) -> Self {
        SearchFilter::ApproximateMatch(AttributeValueAssertion::new(attribute_type, value))
    }

    pub fn present(attribute_type: Arc<AttributeType>) -> Self {
        SearchFilter::Present(AttributeDescription::new(attribute_type, BTreeSet::new()))
    }

    pub fn substring(
        attribute_type: Arc<AttributeType>,
        sub_initial: Option<Vec<u8>>,
        sub_any: Vec<Vec<u8>>,
        sub_final: Option<Vec<u8>>,
    ) -> Self {
        // An empty segment asserts nothing.
        SearchFilter::Substring(SubstringAssertion {
            attribute_type,
            options: BTreeSet::new(),
            sub_initial: sub_initial.filter(|s| !s.is_empty()),
            sub_any: sub_any.into_iter().filter(|s| !s.is_empty()).collect(),
            sub_final: sub_final.filter(|s| !s.is_empty()),
        })
    }

    pub fn extensible(
        attribute_type: Option<Arc<AttributeType>>,
        matching_rule_id: Option<String>,
        value: impl Into<AttributeValue>,
        dn_attributes: bool,
    ) -> Self {
        SearchFilter::ExtensibleMatch(ExtensibleMatchAssertion {
            attribute_type,
            options: BTreeSet::new(),
            matching_rule_id,
            value: value.into(),
            dn_attributes,
        })
    }

    /// Children of a compound filter; empty for leaves.
    pub fn components(&self) -> &[SearchFilter] {
        match self {
            SearchFilter::And(children) | SearchFilter::Or(children) => children,
            SearchFilter::Not(child) => std::slice::from_ref(child.as_ref()),
            _ => &[],
        }
    }

    /// The attribute type a leaf filter targets.
    pub fn attribute_type(&self) -> Option<&Arc<AttributeType>> {
        match self {
            SearchFilter::Equality(ava)
            | SearchFilter::GreaterOrEqual(ava)
            | SearchFilter::LessOrEqual(ava)
            | SearchFilter::ApproximateMatch(ava) => Some(&ava.attribute_type),
            SearchFilter::Substring(sub) => Some(&sub.attribute_type),
            SearchFilter::Present(description) => Some(description.attribute_type()),
            SearchFilter::ExtensibleMatch(ext) => ext.attribute_type.as_ref(),
            _ => None,
        }
    }

    /// Nesting depth of compound filters; a leaf has depth zero.
    pub fn depth(&self) -> usize {
        match self {
            SearchFilter::And(children) | SearchFilter::Or(children) => {
                1 + children.iter().map(SearchFilter::depth).max().unwrap_or(0)
            }
            SearchFilter::Not(child) => 1 + child.depth(),
            _ => 0,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            SearchFilter::And(_) => 0,
            SearchFilter::Or(_) => 1,
            SearchFilter::Not(_) => 2,
            SearchFilter::Equality(_) => 3,
            SearchFilter::Substring(_) => 4,
            SearchFilter::GreaterOrEqual(_) => 5,
            SearchFilter::LessOrEqual(_) => 6,
            SearchFilter::Present(_) => 7,
            SearchFilter::ApproximateMatch(_) => 8,
            SearchFilter::ExtensibleMatch(_) => 9,
        }
    }
}

fn same_members(left: &[SearchFilter], right: &[SearchFilter]) -> bool {
    left.len() == right.len()
        && left.iter().all(|l| right.contains(l))
        && right.iter().all(|r| left.contains(r))
}

impl PartialEq for SearchFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SearchFilter::And(a), SearchFilter::And(b)) | (SearchFilter::Or(a), SearchFilter::Or(b)) => {
                same_members(a, b)
            }
            (SearchFilter::Not(a), SearchFilter::Not(b)) => a == b,
            (SearchFilter::Equality(a), SearchFilter::Equality(b))
            | (SearchFilter::GreaterOrEqual(a), SearchFilter::GreaterOrEqual(b))
            | (SearchFilter::LessOrEqual(a), SearchFilter::LessOrEqual(b))
            | (SearchFilter::ApproximateMatch(a), SearchFilter::ApproximateMatch(b)) => a == b,
            (SearchFilter::Substring(a), SearchFilter::Substring(b)) => a == b,
            (SearchFilter::Present(a), SearchFilter::Present(b)) => a == b,
            (SearchFilter::ExtensibleMatch(a), SearchFilter::ExtensibleMatch(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SearchFilter {}

impl Hash for SearchFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            SearchFilter::And(children) | SearchFilter::Or(children) => {
                // Commutative so that child order does not matter
                let combined = children.iter().fold(0u64, |acc, child| {
                    let mut hasher = DefaultHasher::new();
                    child.hash(&mut hasher);
                    acc.wrapping_add(hasher.finish())
                });
                combined.hash(state);
            }
            SearchFilter::Not(child) => child.hash(state),
            SearchFilter::Equality(ava)
            | SearchFilter::GreaterOrEqual(ava)
            | SearchFilter::LessOrEqual(ava)
            | SearchFilter::ApproximateMatch(ava) => ava.hash(state),
            SearchFilter::Substring(sub) => sub.hash(state),
            SearchFilter::Present(description) => description.hash(state),
            SearchFilter::ExtensibleMatch(ext) => ext.hash(state),
        }
    }
}
