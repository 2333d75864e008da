//! Schema conformance checking for entries.
//!
//! [`Entry::conforms_to_schema`] runs the checks in order: structural class,
//! object class and content rule membership, required and allowed
//! attributes, name forms, then DIT structure rules against the parent entry.
//! Ambiguous conditions go through the configured [`AcceptRejectWarn`]
//! policy; hard violations always fail.

use super::attribute::Attribute;
use super::entry::Entry;
use crate::config::{AcceptRejectWarn, DirectoryConfig};
use crate::dn::Dn;
use crate::error::{ConformanceResult, SchemaViolation};
use crate::schema::{
    DitContentRule, DitStructureRule, NameForm, ObjectClass, ObjectClassKind, Schema,
    SchemaElement,
};
use log::{debug, warn};
use std::borrow::Cow;
use std::sync::Arc;

/// Outcome of one attempt to read an entry under a read lock.
#[derive(Debug, Clone)]
pub enum ParentLookup {
    Found(Entry),
    Missing,
    LockUnavailable,
    Failed(String),
}

/// Access to stored entries, supplied by the backend.
pub trait EntryLocator {
    /// The DN of the entry's parent in the DIT. Backends with naming
    /// contexts override this to stop at suffix boundaries.
    fn parent_dn(&self, dn: &Dn) -> Option<Dn> {
        dn.parent()
    }

    /// Try once to read-lock and fetch `dn`.
    fn try_read_entry(&self, dn: &Dn) -> ParentLookup;
}

/// Where the parent entry for structure rule checks comes from.
#[derive(Clone, Copy)]
pub enum ParentEntry<'a> {
    /// The caller already holds the parent, or knows there is none.
    Provided(Option<&'a Entry>),
    /// Fetch the parent through a locator.
    Lookup(&'a dyn EntryLocator),
}

impl Entry {
    /// Check this entry against `schema`, returning the first violation
    /// that the configured policy does not tolerate.
    pub fn conforms_to_schema(
        &self,
        schema: &Schema,
        config: &DirectoryConfig,
        parent: ParentEntry<'_>,
    ) -> ConformanceResult {
        SchemaCheck::new(schema, config, self).run(parent)
    }
}

struct SchemaCheck<'a> {
    schema: &'a Schema,
    config: &'a DirectoryConfig,
    entry: &'a Entry,
    dn: String,
}

impl<'a> SchemaCheck<'a> {
    fn new(schema: &'a Schema, config: &'a DirectoryConfig, entry: &'a Entry) -> Self {
        Self {
            schema,
            config,
            entry,
            dn: entry.dn().to_string(),
        }
    }

    fn run(&self, parent: ParentEntry<'_>) -> ConformanceResult {
        let structural = self.structural_class()?;
        let content_rule = structural
            .as_ref()
            .and_then(|oc| self.schema.dit_content_rule_for(oc))
            .filter(|rule| !rule.is_obsolete());

        self.validate_object_classes(content_rule.as_deref())?;
        self.validate_attributes(content_rule.as_deref())?;

        if let Some(rule) = &content_rule {
            self.validate_content_rule(rule)?;
        }

        let Some(structural) = structural else {
            return Ok(());
        };

        let mut structure_rule = None;
        if self.config.validate_name_forms {
            if let Some(name_form) = self.validate_name_forms(&structural)? {
                if self.config.validate_structure_rules {
                    structure_rule = self
                        .schema
                        .dit_structure_rules_for(&name_form)
                        .into_iter()
                        .find(|rule| !rule.is_obsolete());
                }
            }
        }

        match structure_rule {
            Some(rule) if !rule.superior_rules().is_empty() => {
                self.validate_structure_rule(&rule, parent)
            }
            Some(_) => Ok(()),
            None if self.config.validate_structure_rules => {
                self.validate_parent_structure_rules(&structural, parent)
            }
            None => Ok(()),
        }
    }

    /// Apply the configured policy to an ambiguous condition.
    fn gate(&self, violation: SchemaViolation) -> ConformanceResult {
        match self.config.single_structural_objectclass_policy {
            AcceptRejectWarn::Accept => Ok(()),
            AcceptRejectWarn::Reject => Err(violation),
            AcceptRejectWarn::Warn => {
                warn!("{violation}");
                Ok(())
            }
        }
    }

    /// The most specific structural class, with conflicts and absence gated.
    fn structural_class(&self) -> Result<Option<Arc<ObjectClass>>, SchemaViolation> {
        let mut structural: Option<&Arc<ObjectClass>> = None;
        for (oc, _) in self.entry.object_classes() {
            if oc.kind() != ObjectClassKind::Structural || oc.is_placeholder() {
                continue;
            }
            match structural {
                None => structural = Some(oc),
                Some(current) if oc.is_descendant_of(current) => structural = Some(oc),
                Some(current) if current.is_descendant_of(oc) => {}
                Some(current) => {
                    self.gate(SchemaViolation::MultipleStructuralObjectClasses {
                        dn: self.dn.clone(),
                        first: current.name_or_oid().to_string(),
                        second: oc.name_or_oid().to_string(),
                    })?;
                }
            }
        }

        if structural.is_none() {
            self.gate(SchemaViolation::NoStructuralObjectClass {
                dn: self.dn.clone(),
            })?;
        }
        Ok(structural.cloned())
    }

    fn validate_object_classes(&self, content_rule: Option<&DitContentRule>) -> ConformanceResult {
        for (oc, name) in self.entry.object_classes() {
            // Unknown classes are never tolerated
            if oc.is_placeholder() || self.schema.object_class(oc.oid()).is_none() {
                return Err(SchemaViolation::UnknownObjectClass {
                    dn: self.dn.clone(),
                    object_class: name.to_string(),
                });
            }

            if let Some(rule) = content_rule {
                if oc.kind() == ObjectClassKind::Auxiliary && !rule.allows_auxiliary_class(oc) {
                    self.gate(SchemaViolation::AuxiliaryClassNotAllowed {
                        dn: self.dn.clone(),
                        object_class: name.to_string(),
                        rule: rule.name_or_oid().to_string(),
                    })?;
                }
            }

            // Check required attributes
            for required in oc.required_attributes() {
                if required.is_object_class() {
                    continue;
                }
                if !self.entry.has_attribute(&required) {
                    return Err(SchemaViolation::MissingRequiredAttribute {
                        dn: self.dn.clone(),
                        attribute: required.name_or_oid().to_string(),
                        object_class: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_attributes(&self, content_rule: Option<&DitContentRule>) -> ConformanceResult {
        let extensible = self
            .entry
            .object_classes()
            .any(|(oc, _)| oc.is_extensible_object());

        for attribute in self.entry.user_attributes().attributes() {
            let attribute_type = attribute.attribute_type();
            if !extensible {
                let allowed = self
                    .entry
                    .object_classes()
                    .any(|(oc, _)| oc.is_required_or_optional(attribute_type))
                    || content_rule.is_some_and(|rule| rule.is_required_or_optional(attribute_type));
                if !allowed {
                    return Err(SchemaViolation::DisallowedAttribute {
                        dn: self.dn.clone(),
                        attribute: attribute.name().to_string(),
                    });
                }
            }
            self.validate_value_count(attribute)?;
        }

        for attribute in self.entry.operational_attributes().attributes() {
            self.validate_value_count(attribute)?;
        }
        Ok(())
    }

    fn validate_value_count(&self, attribute: &Attribute) -> ConformanceResult {
        let count = attribute.len();
        if count == 0 {
            return Err(SchemaViolation::EmptyAttribute {
                dn: self.dn.clone(),
                attribute: attribute.name().to_string(),
            });
        }
        if attribute.attribute_type().is_single_value() && count > 1 {
            return Err(SchemaViolation::SingleValuedAttribute {
                dn: self.dn.clone(),
                attribute: attribute.name().to_string(),
                count,
            });
        }
        Ok(())
    }

    fn validate_content_rule(&self, rule: &DitContentRule) -> ConformanceResult {
        for required in rule.required_attributes() {
            if !self.entry.has_attribute(required) {
                self.gate(SchemaViolation::ContentRuleMissingAttribute {
                    dn: self.dn.clone(),
                    attribute: required.name_or_oid().to_string(),
                    rule: rule.name_or_oid().to_string(),
                })?;
            }
        }
        for prohibited in rule.prohibited_attributes() {
            if self.entry.has_attribute(prohibited) {
                self.gate(SchemaViolation::ContentRuleProhibitedAttribute {
                    dn: self.dn.clone(),
                    attribute: prohibited.name_or_oid().to_string(),
                    rule: rule.name_or_oid().to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Find the first non-obsolete name form the RDN satisfies. Fails when
    /// forms exist for the class but none of them is satisfied.
    fn validate_name_forms(&self, structural: &ObjectClass) -> Result<Option<Arc<NameForm>>, SchemaViolation> {
        let forms: Vec<_> = self
            .schema
            .name_forms_for(structural)
            .into_iter()
            .filter(|form| !form.is_obsolete())
            .collect();
        if forms.is_empty() {
            return Ok(None);
        }

        for form in forms {
            match self.check_name_form(&form) {
                Ok(()) => return Ok(Some(form)),
                Err(violation) => debug!("Name form {} rejected: {violation}", form.name_or_oid()),
            }
        }
        Err(SchemaViolation::NoMatchingNameForm {
            dn: self.dn.clone(),
            object_class: structural.name_or_oid().to_string(),
        })
    }

    fn check_name_form(&self, form: &NameForm) -> ConformanceResult {
        let Some(rdn) = self.entry.dn().rdn() else {
            return Ok(());
        };
        let rdn_types: Vec<_> = rdn
            .avas()
            .iter()
            .map(|ava| (ava.attribute_name(), self.schema.attribute_type_or_default(ava.attribute_name())))
            .collect();

        for required in form.required_attributes() {
            if !rdn_types.iter().any(|(_, t)| t.is_same_or_subtype_of(required)) {
                self.gate(SchemaViolation::RdnMissingRequiredAttribute {
                    dn: self.dn.clone(),
                    attribute: required.name_or_oid().to_string(),
                    name_form: form.name_or_oid().to_string(),
                })?;
            }
        }
        for (name, attribute_type) in &rdn_types {
            if !form.is_required_or_optional(attribute_type) {
                self.gate(SchemaViolation::RdnDisallowedAttribute {
                    dn: self.dn.clone(),
                    attribute: name.to_string(),
                    name_form: form.name_or_oid().to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Resolve the parent entry. `Ok(None)` means there is none to check
    /// against, either because the caller said so or because a gated lookup
    /// problem was tolerated.
    fn parent_entry<'p>(&self, parent: ParentEntry<'p>) -> Result<Option<Cow<'p, Entry>>, SchemaViolation> {
        let locator = match parent {
            ParentEntry::Provided(entry) => return Ok(entry.map(Cow::Borrowed)),
            ParentEntry::Lookup(locator) => locator,
        };
        let Some(parent_dn) = locator.parent_dn(self.entry.dn()) else {
            return Ok(None);
        };

        let attempts = self.config.parent_lock_attempts.max(1);
        let mut lookup = ParentLookup::LockUnavailable;
        for attempt in 1..=attempts {
            lookup = locator.try_read_entry(&parent_dn);
            if !matches!(lookup, ParentLookup::LockUnavailable) {
                break;
            }
            debug!("Read lock on {parent_dn} unavailable (attempt {attempt} of {attempts})");
        }

        let violation = match lookup {
            ParentLookup::Found(entry) => return Ok(Some(Cow::Owned(entry))),
            ParentLookup::Missing => SchemaViolation::ParentNotFound {
                dn: self.dn.clone(),
                parent: parent_dn.to_string(),
            },
            ParentLookup::LockUnavailable => SchemaViolation::ParentLockUnavailable {
                dn: self.dn.clone(),
                parent: parent_dn.to_string(),
            },
            ParentLookup::Failed(reason) => SchemaViolation::ParentLookupFailed {
                dn: self.dn.clone(),
                parent: parent_dn.to_string(),
                reason,
            },
        };
        self.gate(violation)?;
        Ok(None)
    }

    /// The parent's structural class must be governed by one of the rule's
    /// superior rules.
    fn validate_structure_rule(&self, rule: &DitStructureRule, parent: ParentEntry<'_>) -> ConformanceResult {
        let Some(parent) = self.parent_entry(parent)? else {
            return Ok(());
        };
        let Some(parent_class) = parent.structural_object_class() else {
            return self.gate(SchemaViolation::ParentWithoutStructuralClass {
                dn: self.dn.clone(),
            });
        };

        let allowed = rule
            .superior_rules()
            .iter()
            .any(|superior| superior.structural_class().as_ref() == parent_class.as_ref());
        if !allowed {
            self.gate(SchemaViolation::StructureRuleViolation {
                dn: self.dn.clone(),
                rule: rule.name_or_oid().to_string(),
                parent_class: parent_class.name_or_oid().to_string(),
            })?;
        }
        Ok(())
    }

    /// Without a rule of its own, an entry may not sit beneath a parent
    /// whose class is governed by a structure rule.
    fn validate_parent_structure_rules(
        &self,
        structural: &ObjectClass,
        parent: ParentEntry<'_>,
    ) -> ConformanceResult {
        let Some(parent) = self.parent_entry(parent)? else {
            return Ok(());
        };
        let Some(parent_class) = parent.structural_object_class() else {
            return self.gate(SchemaViolation::ParentWithoutStructuralClass {
                dn: self.dn.clone(),
            });
        };
        if parent_class.as_ref() == structural {
            return Ok(());
        }

        for form in self.schema.name_forms_for(parent_class) {
            if form.is_obsolete() {
                continue;
            }
            if let Some(rule) = self
                .schema
                .dit_structure_rules_for(&form)
                .into_iter()
                .find(|rule| !rule.is_obsolete())
            {
                self.gate(SchemaViolation::StructureRuleViolation {
                    dn: self.dn.clone(),
                    rule: rule.name_or_oid().to_string(),
                    parent_class: parent_class.name_or_oid().to_string(),
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn schema() -> Schema {
        Schema::with_core_schema().unwrap()
    }

    fn entry(schema: &Schema, dn: &str, classes: &[&str], attrs: &[(&str, &[&str])]) -> Entry {
        let mut entry = Entry::with_object_classes(Dn::parse(dn).unwrap(), schema, classes);
        for (name, values) in attrs {
            let mut duplicates = Vec::new();
            entry.add_attribute(
                schema,
                Attribute::new(schema.attribute_type_or_default(name), values.iter().copied()),
                &mut duplicates,
            );
        }
        entry
    }

    fn person(schema: &Schema) -> Entry {
        entry(
            schema,
            "cn=Babs Jensen,dc=example,dc=com",
            &["top", "person"],
            &[("cn", &["Babs Jensen"]), ("sn", &["Jensen"])],
        )
    }

    fn check(schema: &Schema, config: &DirectoryConfig, entry: &Entry) -> ConformanceResult {
        entry.conforms_to_schema(schema, config, ParentEntry::Provided(None))
    }

    #[test]
    fn test_valid_person() {
        let schema = schema();
        assert_eq!(check(&schema, &DirectoryConfig::default(), &person(&schema)), Ok(()));
    }

    #[test]
    fn test_missing_required_attribute() {
        let schema = schema();
        let entry = entry(&schema, "cn=x,dc=example,dc=com", &["top", "person"], &[("cn", &["x"])]);
        assert!(matches!(
            check(&schema, &DirectoryConfig::default(), &entry),
            Err(SchemaViolation::MissingRequiredAttribute { attribute, .. }) if attribute == "sn"
        ));
    }

    #[test]
    fn test_disallowed_attribute_and_extensible_object() {
        let schema = schema();
        let mut entry = person(&schema);
        let mut duplicates = Vec::new();
        entry.add_attribute(
            &schema,
            Attribute::new(schema.attribute_type_or_default("mail"), ["babs@example.com"]),
            &mut duplicates,
        );
        assert!(matches!(
            check(&schema, &DirectoryConfig::default(), &entry),
            Err(SchemaViolation::DisallowedAttribute { .. })
        ));

        entry.add_object_class(schema.object_class("extensibleObject").unwrap(), "extensibleObject");
        assert_eq!(check(&schema, &DirectoryConfig::default(), &entry), Ok(()));
    }

    #[test]
    fn test_unknown_object_class_is_not_gated() {
        let schema = schema();
        let mut entry = person(&schema);
        entry.add_object_class(schema.object_class_or_default("madeUpClass"), "madeUpClass");
        let config = DirectoryConfig::default().with_structural_policy(AcceptRejectWarn::Accept);
        assert!(matches!(
            check(&schema, &config, &entry),
            Err(SchemaViolation::UnknownObjectClass { object_class, .. }) if object_class == "madeUpClass"
        ));
    }

    #[test]
    fn test_structural_policy() {
        let schema = schema();
        let mut entry = person(&schema);
        entry.add_object_class(schema.object_class("organization").unwrap(), "organization");
        let mut duplicates = Vec::new();
        entry.add_attribute(&schema, Attribute::new(schema.attribute_type_or_default("o"), ["Example"]), &mut duplicates);

        assert!(matches!(
            check(&schema, &DirectoryConfig::default(), &entry),
            Err(SchemaViolation::MultipleStructuralObjectClasses { .. })
        ));
        let warn = DirectoryConfig::default().with_structural_policy(AcceptRejectWarn::Warn);
        assert_eq!(check(&schema, &warn, &entry), Ok(()));
    }

    #[test]
    fn test_single_valued_attribute() {
        let schema = schema();
        let entry = entry(
            &schema,
            "uid=jdoe,dc=example,dc=com",
            &["top", "posixAccount", "person"],
            &[
                ("cn", &["John"]),
                ("sn", &["Doe"]),
                ("uid", &["jdoe"]),
                ("uidNumber", &["1000", "1001"]),
                ("gidNumber", &["100"]),
                ("homeDirectory", &["/home/jdoe"]),
            ],
        );
        assert!(matches!(
            check(&schema, &DirectoryConfig::default(), &entry),
            Err(SchemaViolation::SingleValuedAttribute { count: 2, .. })
        ));
    }

    fn schema_with_rules() -> Schema {
        let schema = schema();
        for (kind, definition) in [
            (
                crate::schema::DefinitionKind::NameForm,
                "( 1.3.6.1.4.1.99999.15.1 NAME 'ouNameForm' OC organizationalUnit MUST ou )",
            ),
            (
                crate::schema::DefinitionKind::NameForm,
                "( 1.3.6.1.4.1.99999.15.2 NAME 'personNameForm' OC person MUST cn )",
            ),
            (crate::schema::DefinitionKind::DitStructureRule, "( 1 NAME 'ouRule' FORM ouNameForm )"),
            (
                crate::schema::DefinitionKind::DitStructureRule,
                "( 2 NAME 'personRule' FORM personNameForm SUP 1 )",
            ),
        ] {
            schema.register_definition(kind, definition, false).unwrap();
        }
        schema
    }

    #[test]
    fn test_name_form_mismatch() {
        let schema = schema_with_rules();
        let entry = entry(
            &schema,
            "sn=Jensen,ou=People,dc=example,dc=com",
            &["top", "person"],
            &[("cn", &["Babs Jensen"]), ("sn", &["Jensen"])],
        );
        assert!(matches!(
            check(&schema, &DirectoryConfig::default(), &entry),
            Err(SchemaViolation::NoMatchingNameForm { .. })
        ));
    }

    #[test]
    fn test_structure_rule_with_provided_parent() {
        let schema = schema_with_rules();
        let config = DirectoryConfig::default();
        let people = entry(&schema, "ou=People,dc=example,dc=com", &["top", "organizationalUnit"], &[("ou", &["People"])]);
        let group = entry(&schema, "o=Example,dc=example,dc=com", &["top", "organization"], &[("o", &["Example"])]);
        let child = entry(
            &schema,
            "cn=Babs Jensen,ou=People,dc=example,dc=com",
            &["top", "person"],
            &[("cn", &["Babs Jensen"]), ("sn", &["Jensen"])],
        );

        assert_eq!(child.conforms_to_schema(&schema, &config, ParentEntry::Provided(Some(&people))), Ok(()));
        assert!(matches!(
            child.conforms_to_schema(&schema, &config, ParentEntry::Provided(Some(&group))),
            Err(SchemaViolation::StructureRuleViolation { .. })
        ));
    }

    struct FlakyLocator {
        parent: Entry,
        failures: Cell<u32>,
    }

    impl EntryLocator for FlakyLocator {
        fn try_read_entry(&self, _dn: &Dn) -> ParentLookup {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return ParentLookup::LockUnavailable;
            }
            ParentLookup::Found(self.parent.clone())
        }
    }

    #[test]
    fn test_parent_lookup_retries_lock() {
        let schema = schema_with_rules();
        let config = DirectoryConfig::default();
        let people = entry(&schema, "ou=People,dc=example,dc=com", &["top", "organizationalUnit"], &[("ou", &["People"])]);
        let child = entry(
            &schema,
            "cn=Babs Jensen,ou=People,dc=example,dc=com",
            &["top", "person"],
            &[("cn", &["Babs Jensen"]), ("sn", &["Jensen"])],
        );

        let locator = FlakyLocator { parent: people.clone(), failures: Cell::new(2) };
        assert_eq!(child.conforms_to_schema(&schema, &config, ParentEntry::Lookup(&locator)), Ok(()));

        let locator = FlakyLocator { parent: people, failures: Cell::new(5) };
        assert!(matches!(
            child.conforms_to_schema(&schema, &config, ParentEntry::Lookup(&locator)),
            Err(SchemaViolation::ParentLockUnavailable { .. })
        ));
    }
}
