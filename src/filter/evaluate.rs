//! Three-valued filter evaluation against entries.

use super::types::{AttributeValueAssertion, ExtensibleMatchAssertion, SearchFilter, SubstringAssertion};
use crate::config::{DEFAULT_MAX_FILTER_DEPTH, DirectoryConfig};
use crate::entry::{Attribute, Entry};
use crate::error::{FilterError, FilterResult};
use crate::schema::{AttributeType, ConditionResult, MatchingRule, MatchingRuleKind, Schema, SchemaElement};
use log::trace;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Evaluates filters against entries using the matching rules of a schema.
///
/// Compound filters nested deeper than the configured bound fail with
/// [`FilterError::NestedTooDeep`] instead of recursing further.
#[derive(Debug, Clone, Copy)]
pub struct FilterEvaluator<'a> {
    schema: &'a Schema,
    max_depth: usize,
}

/// Folds per-value results: any TRUE wins, otherwise any UNDEFINED.
#[derive(Default)]
struct ValueMatch {
    undefined: bool,
}

impl ValueMatch {
    fn record(&mut self, result: ConditionResult) -> Option<ConditionResult> {
        match result {
            ConditionResult::True => Some(ConditionResult::True),
            ConditionResult::Undefined => {
                self.undefined = true;
                None
            }
            ConditionResult::False => None,
        }
    }

    fn finish(self) -> ConditionResult {
        if self.undefined {
            ConditionResult::Undefined
        } else {
            ConditionResult::False
        }
    }
}

fn candidates<'e>(
    entry: &'e Entry,
    attribute_type: &Arc<AttributeType>,
    options: &BTreeSet<String>,
) -> Vec<Cow<'e, Attribute>> {
    let mut found = entry.get_attribute(attribute_type);
    found.retain(|attribute| attribute.has_all_options(options));
    found
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            max_depth: DEFAULT_MAX_FILTER_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn from_config(schema: &'a Schema, config: &DirectoryConfig) -> Self {
        Self::new(schema).with_max_depth(config.max_filter_depth)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Evaluate `filter` against `entry` under three-valued logic.
    pub fn evaluate(&self, filter: &SearchFilter, entry: &Entry) -> FilterResult<ConditionResult> {
        let result = self.evaluate_at(filter, entry, 0)?;
        trace!("Filter {filter} evaluated to {result:?} for {}", entry.dn());
        Ok(result)
    }

    /// True only when the filter evaluates to TRUE; UNDEFINED does not match.
    pub fn matches_entry(&self, filter: &SearchFilter, entry: &Entry) -> FilterResult<bool> {
        Ok(self.evaluate(filter, entry)?.is_true())
    }

    fn evaluate_at(&self, filter: &SearchFilter, entry: &Entry, depth: usize) -> FilterResult<ConditionResult> {
        match filter {
            SearchFilter::And(children) => self.evaluate_and(children, entry, depth),
            SearchFilter::Or(children) => self.evaluate_or(children, entry, depth),
            SearchFilter::Not(child) => {
                self.check_depth(depth)?;
                Ok(!self.evaluate_at(child, entry, depth + 1)?)
            }
            SearchFilter::Equality(ava) => Ok(self.evaluate_equality(ava, entry)),
            SearchFilter::GreaterOrEqual(ava) => Ok(self.evaluate_ordering(ava, entry, Ordering::Greater)),
            SearchFilter::LessOrEqual(ava) => Ok(self.evaluate_ordering(ava, entry, Ordering::Less)),
            SearchFilter::ApproximateMatch(ava) => Ok(self.evaluate_approximate(ava, entry)),
            SearchFilter::Substring(sub) => self.evaluate_substring(filter, sub, entry),
            SearchFilter::Present(description) => Ok(entry
                .has_attribute_with_options(description.attribute_type(), description.options())
                .into()),
            SearchFilter::ExtensibleMatch(ext) => self.evaluate_extensible(filter, ext, entry),
        }
    }

    fn check_depth(&self, depth: usize) -> FilterResult<()> {
        if depth >= self.max_depth {
            trace!("Filter nesting reached {depth}, bound is {}", self.max_depth);
            return Err(FilterError::NestedTooDeep {
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    fn evaluate_and(&self, children: &[SearchFilter], entry: &Entry, depth: usize) -> FilterResult<ConditionResult> {
        if children.is_empty() {
            return Ok(ConditionResult::True);
        }
        self.check_depth(depth)?;
        let mut result = ConditionResult::True;
        for child in children {
            match self.evaluate_at(child, entry, depth + 1)? {
                ConditionResult::False => return Ok(ConditionResult::False),
                ConditionResult::Undefined => result = ConditionResult::Undefined,
                ConditionResult::True => {}
            }
        }
        Ok(result)
    }

    fn evaluate_or(&self, children: &[SearchFilter], entry: &Entry, depth: usize) -> FilterResult<ConditionResult> {
        if children.is_empty() {
            return Ok(ConditionResult::False);
        }
        self.check_depth(depth)?;
        let mut result = ConditionResult::False;
        for child in children {
            match self.evaluate_at(child, entry, depth + 1)? {
                ConditionResult::True => return Ok(ConditionResult::True),
                ConditionResult::Undefined => result = ConditionResult::Undefined,
                ConditionResult::False => {}
            }
        }
        Ok(result)
    }

    fn evaluate_equality(&self, ava: &AttributeValueAssertion, entry: &Entry) -> ConditionResult {
        if ava.attribute_type.is_object_class() {
            return self.has_object_class_value(ava, entry).into();
        }
        let attributes = candidates(entry, &ava.attribute_type, &ava.options);
        if attributes.is_empty() {
            return ConditionResult::False;
        }
        let Some(rule) = ava.attribute_type.equality_matching_rule() else {
            trace!("No equality rule for {}", ava.attribute_type.name_or_oid());
            return ConditionResult::Undefined;
        };
        self.match_values(rule, &attributes, ava.value.as_bytes())
    }

    /// objectClass equality also holds for superclasses of the entry's
    /// classes.
    fn has_object_class_value(&self, ava: &AttributeValueAssertion, entry: &Entry) -> bool {
        if entry.has_value(&ava.attribute_type, &ava.options, &ava.value) {
            return true;
        }
        self.schema
            .object_class(&ava.value.to_string_lossy())
            .is_some_and(|object_class| entry.has_object_class(&object_class))
    }

    fn match_values(&self, rule: &MatchingRule, attributes: &[Cow<'_, Attribute>], assertion: &[u8]) -> ConditionResult {
        let Ok(normalized) = rule.normalize_assertion_value(assertion) else {
            return ConditionResult::Undefined;
        };
        let mut folded = ValueMatch::default();
        for value in attributes.iter().flat_map(|a| a.values()) {
            if let Some(result) = folded.record(rule.matches(value.as_bytes(), &normalized)) {
                return result;
            }
        }
        folded.finish()
    }

    /// `wanted` is `Greater` for `>=` and `Less` for `<=`; equal values
    /// satisfy both.
    fn evaluate_ordering(&self, ava: &AttributeValueAssertion, entry: &Entry, wanted: Ordering) -> ConditionResult {
        let attributes = candidates(entry, &ava.attribute_type, &ava.options);
        if attributes.is_empty() {
            return ConditionResult::False;
        }
        let Some(rule) = ava.attribute_type.ordering_matching_rule() else {
            return ConditionResult::Undefined;
        };
        let Ok(normalized) = rule.normalize_assertion_value(ava.value.as_bytes()) else {
            return ConditionResult::Undefined;
        };
        let mut folded = ValueMatch::default();
        for value in attributes.iter().flat_map(|a| a.values()) {
            let result = match rule.compare(value.as_bytes(), &normalized) {
                Some(ordering) => (ordering == wanted || ordering == Ordering::Equal).into(),
                None => ConditionResult::Undefined,
            };
            if let Some(result) = folded.record(result) {
                return result;
            }
        }
        folded.finish()
    }

    fn evaluate_approximate(&self, ava: &AttributeValueAssertion, entry: &Entry) -> ConditionResult {
        let attributes = candidates(entry, &ava.attribute_type, &ava.options);
        if attributes.is_empty() {
            return ConditionResult::False;
        }
        match ava.attribute_type.approximate_matching_rule() {
            Some(rule) => self.match_values(rule, &attributes, ava.value.as_bytes()),
            None => ConditionResult::Undefined,
        }
    }

    fn evaluate_substring(
        &self,
        filter: &SearchFilter,
        sub: &SubstringAssertion,
        entry: &Entry,
    ) -> FilterResult<ConditionResult> {
        if !sub.has_components() {
            return Err(FilterError::MissingSubstringComponents {
                filter: filter.to_string(),
            });
        }
        let attributes = candidates(entry, &sub.attribute_type, &sub.options);
        if attributes.is_empty() {
            return Ok(ConditionResult::False);
        }
        let Some(rule) = sub.attribute_type.substring_matching_rule() else {
            return Ok(ConditionResult::Undefined);
        };

        let normalize = |segment: &Vec<u8>| rule.normalize_substring(segment);
        let (Ok(initial), Ok(any), Ok(fin)) = (
            sub.sub_initial.as_ref().map(normalize).transpose(),
            sub.sub_any.iter().map(normalize).collect::<Result<Vec<_>, _>>(),
            sub.sub_final.as_ref().map(normalize).transpose(),
        ) else {
            return Ok(ConditionResult::Undefined);
        };

        let algorithm = rule.algorithm();
        let mut folded = ValueMatch::default();
        for value in attributes.iter().flat_map(|a| a.values()) {
            let result = match rule.normalize_attribute_value(value.as_bytes()) {
                Ok(normalized) => algorithm
                    .substring_match(&normalized, initial.as_deref(), &any, fin.as_deref())
                    .into(),
                Err(_) => ConditionResult::Undefined,
            };
            if let Some(result) = folded.record(result) {
                return Ok(result);
            }
        }
        Ok(folded.finish())
    }

    fn evaluate_extensible(
        &self,
        filter: &SearchFilter,
        ext: &ExtensibleMatchAssertion,
        entry: &Entry,
    ) -> FilterResult<ConditionResult> {
        let rule = match (&ext.matching_rule_id, &ext.attribute_type) {
            (None, None) => {
                return Err(FilterError::ExtensibleMissingRuleAndType {
                    filter: filter.to_string(),
                });
            }
            (Some(id), attribute_type) => {
                let Some(rule) = self.schema.matching_rule(id) else {
                    trace!("Unknown matching rule {id} in {filter}");
                    return Ok(ConditionResult::Undefined);
                };
                if let Some(attribute_type) = attribute_type {
                    let applies = self
                        .schema
                        .matching_rule_use(&rule)
                        .is_none_or(|rule_use| rule_use.applies_to(attribute_type));
                    if !applies {
                        return Ok(ConditionResult::Undefined);
                    }
                }
                rule
            }
            (None, Some(attribute_type)) => match attribute_type.equality_matching_rule() {
                Some(rule) => Arc::clone(rule),
                None => return Ok(ConditionResult::Undefined),
            },
        };

        let Ok(normalized) = rule.normalize_assertion_value(ext.value.as_bytes()) else {
            return Ok(ConditionResult::Undefined);
        };
        let check = |value: &[u8]| self.extensible_value_match(&rule, value, &normalized);

        let mut folded = ValueMatch::default();
        match &ext.attribute_type {
            Some(attribute_type) => {
                for attribute in candidates(entry, attribute_type, &ext.options) {
                    for value in attribute.values() {
                        if let Some(result) = folded.record(check(value.as_bytes())) {
                            return Ok(result);
                        }
                    }
                }
            }
            None => {
                for value in entry.attributes().flat_map(|a| a.values()) {
                    if let Some(result) = folded.record(check(value.as_bytes())) {
                        return Ok(result);
                    }
                }
            }
        }

        if ext.dn_attributes {
            for ava in entry.dn().rdns().iter().flat_map(|rdn| rdn.avas()) {
                if let Some(attribute_type) = &ext.attribute_type {
                    let ava_type = self.schema.attribute_type_or_default(ava.attribute_name());
                    if !ava_type.is_same_or_subtype_of(attribute_type) {
                        continue;
                    }
                }
                if let Some(result) = folded.record(check(ava.value())) {
                    return Ok(result);
                }
            }
        }
        Ok(folded.finish())
    }

    /// Ordering rules assert that the value sorts before the assertion;
    /// every other kind compares for equality.
    fn extensible_value_match(&self, rule: &MatchingRule, value: &[u8], normalized: &[u8]) -> ConditionResult {
        match rule.kind() {
            MatchingRuleKind::Ordering => match rule.compare(value, normalized) {
                Some(ordering) => (ordering == Ordering::Less).into(),
                None => ConditionResult::Undefined,
            },
            _ => rule.matches(value, normalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn schema() -> Schema {
        Schema::with_core_schema().unwrap()
    }

    fn babs(schema: &Schema) -> Entry {
        let mut entry = Entry::with_object_classes(
            Dn::parse("cn=Babs Jensen,ou=People,dc=example,dc=com").unwrap(),
            schema,
            &["top", "person"],
        );
        let mut duplicates = Vec::new();
        for (name, value) in [
            ("cn", "Babs Jensen"),
            ("sn", "Jensen"),
            ("description", "Manager"),
            ("telephoneNumber", "+1 408 555 1212"),
        ] {
            entry.add_attribute(
                schema,
                Attribute::new(schema.attribute_type_or_default(name), [value]),
                &mut duplicates,
            );
        }
        entry
    }

    fn eval(schema: &Schema, filter: &str, entry: &Entry) -> ConditionResult {
        FilterEvaluator::new(schema)
            .evaluate(&SearchFilter::parse(filter, schema).unwrap(), entry)
            .unwrap()
    }

    #[test]
    fn test_basic_matches() {
        let schema = schema();
        let entry = babs(&schema);
        assert_eq!(eval(&schema, "(&(objectClass=person)(cn=Babs Jensen))", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=babs   jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=nomatch)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(unknownAttr=*)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(objectClass=*)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(objectClass=top)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(name=Jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(sn~=Jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(telephoneNumber=+14085551212)", &entry), ConditionResult::True);
    }

    #[test]
    fn test_absolute_true_and_false() {
        let schema = schema();
        let entry = babs(&schema);
        assert_eq!(eval(&schema, "(&)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(|)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(!(&))", &entry), ConditionResult::False);
    }

    #[test]
    fn test_substring() {
        let schema = schema();
        let entry = babs(&schema);
        assert_eq!(eval(&schema, "(cn=B*ens*n)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=b*JENS*)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=*jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn=Bjorn*)", &entry), ConditionResult::False);

        let mut bjorn = babs(&schema);
        bjorn.replace_attribute(&schema, Attribute::new(schema.attribute_type_or_default("cn"), ["Bjorn"]));
        assert_eq!(eval(&schema, "(cn=B*ens*n)", &bjorn), ConditionResult::False);
    }

    #[test]
    fn test_substring_without_components_fails() {
        let schema = schema();
        let filter = SearchFilter::substring(schema.attribute_type_or_default("cn"), None, vec![], None);
        let result = FilterEvaluator::new(&schema).evaluate(&filter, &babs(&schema));
        assert!(matches!(result, Err(FilterError::MissingSubstringComponents { .. })));
    }

    #[test]
    fn test_undefined_propagation() {
        let schema = schema();
        let entry = babs(&schema);
        // telephoneNumber has no ordering rule
        let unordered = "(telephoneNumber>=1)";
        assert_eq!(eval(&schema, unordered, &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, &format!("(!{unordered})"), &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, &format!("(&{unordered}(cn=x))"), &entry), ConditionResult::False);
        assert_eq!(
            eval(&schema, &format!("(&{unordered}(cn=Babs Jensen))"), &entry),
            ConditionResult::Undefined
        );
        assert_eq!(eval(&schema, &format!("(|{unordered}(cn=Babs Jensen))"), &entry), ConditionResult::True);
        assert_eq!(eval(&schema, &format!("(|{unordered}(cn=x))"), &entry), ConditionResult::Undefined);
        assert!(!FilterEvaluator::new(&schema)
            .matches_entry(&SearchFilter::parse(unordered, &schema).unwrap(), &entry)
            .unwrap());
        assert_eq!(eval(&schema, "(description>=A)", &entry), ConditionResult::True);
    }

    #[test]
    fn test_ordering_integers() {
        let schema = schema();
        let mut entry = Entry::with_object_classes(
            Dn::parse("uid=bjensen,dc=example,dc=com").unwrap(),
            &schema,
            &["top", "posixAccount"],
        );
        let mut duplicates = Vec::new();
        entry.add_attribute(
            &schema,
            Attribute::new(schema.attribute_type("uidNumber").unwrap(), ["1000"]),
            &mut duplicates,
        );
        assert_eq!(eval(&schema, "(uidNumber>=999)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(uidNumber>=1000)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(uidNumber<=200)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(uidNumber<=abc)", &entry), ConditionResult::Undefined);
    }

    #[test]
    fn test_extensible_match() {
        let schema = schema();
        let entry = babs(&schema);
        assert_eq!(eval(&schema, "(cn:caseExactMatch:=Babs Jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn:caseExactMatch:=babs jensen)", &entry), ConditionResult::False);
        assert_eq!(eval(&schema, "(cn:=babs jensen)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(:caseIgnoreMatch:=manager)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(cn:noSuchRule:=x)", &entry), ConditionResult::Undefined);
        assert_eq!(eval(&schema, "(ou:dn:=people)", &entry), ConditionResult::True);
        assert_eq!(eval(&schema, "(ou:=people)", &entry), ConditionResult::False);

        let filter = SearchFilter::extensible(None, None, "x", false);
        assert!(matches!(
            FilterEvaluator::new(&schema).evaluate(&filter, &entry),
            Err(FilterError::ExtensibleMissingRuleAndType { .. })
        ));
    }

    #[test]
    fn test_nesting_bound() {
        let schema = schema();
        let entry = babs(&schema);
        let mut filter = SearchFilter::parse("(cn=Babs Jensen)", &schema).unwrap();
        for _ in 0..5 {
            filter = SearchFilter::and([filter]);
        }
        let evaluator = FilterEvaluator::new(&schema).with_max_depth(5);
        assert_eq!(evaluator.evaluate(&filter, &entry).unwrap(), ConditionResult::True);

        let deeper = SearchFilter::not(SearchFilter::not(filter));
        assert!(matches!(
            evaluator.evaluate(&deeper, &entry),
            Err(FilterError::NestedTooDeep { max_depth: 5 })
        ));

        let config = DirectoryConfig {
            max_filter_depth: 10,
            ..DirectoryConfig::default()
        };
        assert_eq!(FilterEvaluator::from_config(&schema, &config).max_depth(), 10);
    }
}
