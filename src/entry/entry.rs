//! The in-memory directory entry.
//!
//! An [`Entry`] owns its DN, its object classes (with the names as
//! submitted), and three attribute maps: user attributes, operational
//! attributes, and real attributes suppressed by virtual attribute conflict
//! resolution. A type appears in at most one of the user and operational
//! maps, chosen by its usage. The objectClass attribute is never stored; it
//! is materialized from the object class list when asked for.
//!
//! Entries are not synchronized. Callers serialize mutation of a single
//! entry themselves.

use super::attribute::{Attribute, AttributeBuilder, AttributeValue, split_options};
use super::modification::{Modification, ModificationType};
use crate::dn::Dn;
use crate::error::{ModificationError, ModificationResult};
use crate::schema::{AttributeType, ObjectClass, ObjectClassKind, Schema, SchemaElement};
use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const REFERRAL_OBJECT_CLASS_OID: &str = "2.16.840.1.113730.3.2.6";
const ALIAS_OBJECT_CLASS_OID: &str = "2.5.6.1";
const LDAP_SUBENTRY_OBJECT_CLASS_OID: &str = "2.16.840.1.113719.2.142.6.1.1";

/// Search scopes used by [`Entry::matches_base_and_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
    SubordinateSubtree,
}

/// Attribute instances grouped by type, in first-insertion order. Types
/// never map to an empty instance list.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    entries: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
}

impl AttributeMap {
    fn position(&self, attribute_type: &AttributeType) -> Option<usize> {
        self.entries
            .iter()
            .position(|(t, _)| t.as_ref() == attribute_type)
    }

    /// Instances stored under exactly `attribute_type`.
    pub fn get(&self, attribute_type: &AttributeType) -> Option<&[Attribute]> {
        self.position(attribute_type)
            .map(|i| self.entries[i].1.as_slice())
    }

    pub(crate) fn get_mut(&mut self, attribute_type: &AttributeType) -> Option<&mut Vec<Attribute>> {
        let i = self.position(attribute_type)?;
        Some(&mut self.entries[i].1)
    }

    pub(crate) fn insert(&mut self, attribute_type: Arc<AttributeType>, attributes: Vec<Attribute>) {
        match self.position(&attribute_type) {
            Some(i) if attributes.is_empty() => {
                self.entries.remove(i);
            }
            Some(i) => self.entries[i].1 = attributes,
            None if attributes.is_empty() => {}
            None => self.entries.push((attribute_type, attributes)),
        }
    }

    /// Append `attribute` as a new instance of its type.
    pub(crate) fn push(&mut self, attribute: Attribute) {
        match self.position(attribute.attribute_type()) {
            Some(i) => self.entries[i].1.push(attribute),
            None => self
                .entries
                .push((Arc::clone(attribute.attribute_type()), vec![attribute])),
        }
    }

    pub(crate) fn remove(&mut self, attribute_type: &AttributeType) -> Option<Vec<Attribute>> {
        let i = self.position(attribute_type)?;
        Some(self.entries.remove(i).1)
    }

    pub(crate) fn prune(&mut self) {
        self.entries.retain(|(_, attributes)| !attributes.is_empty());
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains_type(&self, attribute_type: &AttributeType) -> bool {
        self.position(attribute_type).is_some()
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<AttributeType>> {
        self.entries.iter().map(|(t, _)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<AttributeType>, &[Attribute])> {
        self.entries.iter().map(|(t, a)| (t, a.as_slice()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vec<Attribute>> {
        self.entries.iter_mut().map(|(_, a)| a)
    }

    /// Every stored instance, flattened.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter().flat_map(|(_, a)| a.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instances of `attribute_type` or any of its subtypes.
    fn collect_instances<'a>(&'a self, attribute_type: &AttributeType, out: &mut Vec<&'a Attribute>) {
        for (stored, attributes) in &self.entries {
            if stored.is_same_or_subtype_of(attribute_type) {
                out.extend(attributes.iter());
            }
        }
    }

    /// Same types with the same instances per type, in any order.
    fn equivalent(&self, other: &AttributeMap) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(t, attributes)| match other.get(t) {
                Some(others) => {
                    attributes.len() == others.len()
                        && attributes.iter().all(|a| others.contains(a))
                }
                None => false,
            })
    }
}

#[derive(Clone)]
struct Attachment {
    generation: u64,
    value: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// One directory entry.
#[derive(Debug, Clone)]
pub struct Entry {
    dn: Dn,
    object_classes: Vec<(Arc<ObjectClass>, String)>,
    user_attributes: AttributeMap,
    operational_attributes: AttributeMap,
    suppressed_attributes: AttributeMap,
    virtual_processing_performed: bool,
    generation: u64,
    attachment: Option<Attachment>,
}

impl Entry {
    /// An entry with no object classes or attributes.
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            object_classes: Vec::new(),
            user_attributes: AttributeMap::default(),
            operational_attributes: AttributeMap::default(),
            suppressed_attributes: AttributeMap::default(),
            virtual_processing_performed: false,
            generation: 0,
            attachment: None,
        }
    }

    /// An entry holding the named object classes, resolved against `schema`.
    pub fn with_object_classes(dn: Dn, schema: &Schema, names: &[&str]) -> Self {
        let mut entry = Self::new(dn);
        for name in names {
            entry.add_object_class(schema.object_class_or_default(name), *name);
        }
        entry
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
        self.invalidate();
    }

    /// Incremented by every mutation; an attachment is only visible while
    /// the generation it was stored under is current.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.attachment = None;
    }

    // Object classes

    /// Object classes paired with the names they were submitted under.
    pub fn object_classes(&self) -> impl Iterator<Item = (&Arc<ObjectClass>, &str)> {
        self.object_classes
            .iter()
            .map(|(oc, name)| (oc, name.as_str()))
    }

    pub fn object_class_names(&self) -> impl Iterator<Item = &str> {
        self.object_classes.iter().map(|(_, name)| name.as_str())
    }

    /// True if the entry has `object_class` or one of its subclasses.
    pub fn has_object_class(&self, object_class: &ObjectClass) -> bool {
        self.object_classes
            .iter()
            .any(|(oc, _)| oc.as_ref() == object_class || oc.is_descendant_of(object_class))
    }

    fn has_object_class_named(&self, oid: &str, name: &str) -> bool {
        self.object_classes.iter().any(|(oc, submitted)| {
            oc.oid() == oid || oc.has_name(name) || submitted.eq_ignore_ascii_case(name)
        })
    }

    /// Add an object class, returning false if it is already present.
    pub fn add_object_class(&mut self, object_class: Arc<ObjectClass>, name: impl Into<String>) -> bool {
        if self.object_classes.iter().any(|(oc, _)| *oc == object_class) {
            return false;
        }
        self.object_classes.push((object_class, name.into()));
        self.invalidate();
        true
    }

    pub fn set_object_classes<I>(&mut self, object_classes: I)
    where
        I: IntoIterator<Item = (Arc<ObjectClass>, String)>,
    {
        self.object_classes.clear();
        for (oc, name) in object_classes {
            if !self.object_classes.iter().any(|(existing, _)| *existing == oc) {
                self.object_classes.push((oc, name));
            }
        }
        self.invalidate();
    }

    pub fn remove_object_class(&mut self, object_class: &ObjectClass) -> bool {
        let before = self.object_classes.len();
        self.object_classes.retain(|(oc, _)| oc.as_ref() != object_class);
        let removed = self.object_classes.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    /// The most specific structural class. With several unrelated
    /// structural classes the first one wins; conformance checking reports
    /// that case separately.
    pub fn structural_object_class(&self) -> Option<&Arc<ObjectClass>> {
        let mut structural: Option<&Arc<ObjectClass>> = None;
        for (oc, _) in &self.object_classes {
            if oc.kind() != ObjectClassKind::Structural {
                continue;
            }
            match structural {
                None => structural = Some(oc),
                Some(current) if oc.is_descendant_of(current) => structural = Some(oc),
                Some(_) => {}
            }
        }
        structural
    }

    /// The objectClass attribute built from the object class list.
    pub fn object_class_attribute(&self, attribute_type: &Arc<AttributeType>) -> Attribute {
        let mut builder = AttributeBuilder::new(Arc::clone(attribute_type));
        builder.add_all(self.object_class_names());
        builder.build()
    }

    fn resolve_object_classes(schema: &Schema, attribute: &Attribute) -> Vec<(Arc<ObjectClass>, String)> {
        attribute
            .values()
            .iter()
            .map(|value| {
                let name = value.to_string_lossy();
                (schema.object_class_or_default(&name), name)
            })
            .collect()
    }

    // Attribute access

    pub fn user_attributes(&self) -> &AttributeMap {
        &self.user_attributes
    }

    pub fn operational_attributes(&self) -> &AttributeMap {
        &self.operational_attributes
    }

    /// Real attributes displaced by virtual ones.
    pub fn suppressed_attributes(&self) -> &AttributeMap {
        &self.suppressed_attributes
    }

    /// Every stored user and operational attribute instance.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.user_attributes
            .attributes()
            .chain(self.operational_attributes.attributes())
    }

    fn partition(&self, attribute_type: &AttributeType) -> &AttributeMap {
        if attribute_type.is_operational() {
            &self.operational_attributes
        } else {
            &self.user_attributes
        }
    }

    pub(crate) fn partition_mut(&mut self, attribute_type: &AttributeType) -> &mut AttributeMap {
        if attribute_type.is_operational() {
            &mut self.operational_attributes
        } else {
            &mut self.user_attributes
        }
    }

    pub(crate) fn suppressed_attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.suppressed_attributes
    }

    /// All instances of `attribute_type` and its subtypes. For objectClass
    /// this is the materialized attribute.
    pub fn get_attribute(&self, attribute_type: &Arc<AttributeType>) -> Vec<Cow<'_, Attribute>> {
        if attribute_type.is_object_class() {
            if self.object_classes.is_empty() {
                return Vec::new();
            }
            return vec![Cow::Owned(self.object_class_attribute(attribute_type))];
        }
        self.instances(attribute_type)
            .into_iter()
            .map(Cow::Borrowed)
            .collect()
    }

    /// Like [`Entry::get_attribute`], keeping only instances whose option
    /// set equals `options` exactly.
    pub fn get_attribute_with_options(
        &self,
        attribute_type: &Arc<AttributeType>,
        options: &BTreeSet<String>,
    ) -> Vec<Cow<'_, Attribute>> {
        let mut found = self.get_attribute(attribute_type);
        found.retain(|attribute| attribute.options_equal(options));
        found
    }

    fn instances(&self, attribute_type: &AttributeType) -> Vec<&Attribute> {
        let mut out = Vec::new();
        self.partition(attribute_type)
            .collect_instances(attribute_type, &mut out);
        out
    }

    pub fn get_user_attribute(&self, attribute_type: &AttributeType) -> Vec<&Attribute> {
        let mut out = Vec::new();
        self.user_attributes
            .collect_instances(attribute_type, &mut out);
        out
    }

    pub fn get_operational_attribute(&self, attribute_type: &AttributeType) -> Vec<&Attribute> {
        let mut out = Vec::new();
        self.operational_attributes
            .collect_instances(attribute_type, &mut out);
        out
    }

    /// The instance stored under exactly this type and option set.
    pub fn get_exact_attribute(
        &self,
        attribute_type: &AttributeType,
        options: &BTreeSet<String>,
    ) -> Option<&Attribute> {
        self.partition(attribute_type)
            .get(attribute_type)?
            .iter()
            .find(|a| a.options_equal(options))
    }

    /// True if any value-bearing instance of the type or a subtype exists.
    pub fn has_attribute(&self, attribute_type: &AttributeType) -> bool {
        self.has_attribute_with_options(attribute_type, &BTreeSet::new())
    }

    /// As [`Entry::has_attribute`], requiring instances to carry all of
    /// `options`.
    pub fn has_attribute_with_options(
        &self,
        attribute_type: &AttributeType,
        options: &BTreeSet<String>,
    ) -> bool {
        if attribute_type.is_object_class() {
            return !self.object_classes.is_empty() && options.is_empty();
        }
        self.instances(attribute_type)
            .iter()
            .any(|a| !a.is_empty() && a.has_all_options(options))
    }

    pub fn has_value(
        &self,
        attribute_type: &AttributeType,
        options: &BTreeSet<String>,
        value: &AttributeValue,
    ) -> bool {
        if attribute_type.is_object_class() {
            let name = value.to_string_lossy();
            return self
                .object_classes
                .iter()
                .any(|(oc, submitted)| oc.has_name_or_oid(&name) || submitted.eq_ignore_ascii_case(&name));
        }
        self.instances(attribute_type)
            .iter()
            .any(|a| a.has_all_options(options) && a.contains(value))
    }

    // Attribute mutation

    /// Replace every instance of `attribute_type` with `attributes`.
    pub fn put_attribute(
        &mut self,
        schema: &Schema,
        attribute_type: Arc<AttributeType>,
        attributes: Vec<Attribute>,
    ) {
        if attribute_type.is_object_class() {
            let classes: Vec<_> = attributes
                .iter()
                .flat_map(|a| Self::resolve_object_classes(schema, a))
                .collect();
            self.set_object_classes(classes);
            return;
        }
        self.partition_mut(&attribute_type)
            .insert(attribute_type, attributes);
        self.invalidate();
    }

    /// Merge `attribute` into the instance with the same option set, or
    /// insert it as a new instance. Values already present are appended to
    /// `duplicates` instead of being added.
    pub fn add_attribute(
        &mut self,
        schema: &Schema,
        attribute: Attribute,
        duplicates: &mut Vec<AttributeValue>,
    ) {
        if attribute.attribute_type().is_object_class() {
            for (oc, name) in Self::resolve_object_classes(schema, &attribute) {
                if self.object_classes.iter().any(|(existing, _)| *existing == oc) {
                    duplicates.push(AttributeValue::from(name));
                } else {
                    self.object_classes.push((oc, name));
                }
            }
            self.invalidate();
            return;
        }

        let attribute_type = Arc::clone(attribute.attribute_type());
        let map = self.partition_mut(&attribute_type);
        let existing = map
            .get_mut(&attribute_type)
            .and_then(|list| list.iter_mut().find(|a| a.options_equal(attribute.options())));
        match existing {
            Some(existing) => {
                for value in attribute.values() {
                    if !existing.add(value.clone()) {
                        duplicates.push(value.clone());
                    }
                }
            }
            None => map.push(attribute),
        }
        self.invalidate();
    }

    /// Replace the instance with the same option set. An empty attribute
    /// removes that instance.
    pub fn replace_attribute(&mut self, schema: &Schema, attribute: Attribute) {
        if attribute.attribute_type().is_object_class() {
            let classes = Self::resolve_object_classes(schema, &attribute);
            self.set_object_classes(classes);
            return;
        }
        let attribute_type = Arc::clone(attribute.attribute_type());
        let map = self.partition_mut(&attribute_type);
        let mut list = map.remove(&attribute_type).unwrap_or_default();
        list.retain(|a| !a.options_equal(attribute.options()));
        if !attribute.is_empty() {
            list.push(attribute);
        }
        map.insert(attribute_type, list);
        self.invalidate();
    }

    /// Remove all instances of exactly this type, or only the one with the
    /// given option set. Removing objectClass clears the object classes.
    pub fn remove_attribute_type(
        &mut self,
        attribute_type: &AttributeType,
        options: Option<&BTreeSet<String>>,
    ) -> bool {
        if attribute_type.is_object_class() {
            let had = !self.object_classes.is_empty();
            self.object_classes.clear();
            self.invalidate();
            return had;
        }
        let map = self.partition_mut(attribute_type);
        let removed = match options {
            None => map.remove(attribute_type).is_some(),
            Some(options) => match map.get_mut(attribute_type) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|a| !a.options_equal(options));
                    let removed = list.len() != before;
                    map.prune();
                    removed
                }
                None => false,
            },
        };
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Remove the listed values from the instance with the same option set,
    /// recording values that were not present in `missing`. Returns false if
    /// no such instance exists. An attribute with no values removes the
    /// whole instance.
    pub fn remove_attribute_values(
        &mut self,
        attribute: &Attribute,
        missing: &mut Vec<AttributeValue>,
    ) -> bool {
        let attribute_type = Arc::clone(attribute.attribute_type());
        if attribute.is_empty() {
            return self.remove_attribute_type(&attribute_type, Some(attribute.options()));
        }

        if attribute_type.is_object_class() {
            for value in attribute.values() {
                let name = value.to_string_lossy();
                let before = self.object_classes.len();
                self.object_classes
                    .retain(|(oc, submitted)| !(oc.has_name_or_oid(&name) || submitted.eq_ignore_ascii_case(&name)));
                if self.object_classes.len() == before {
                    missing.push(value.clone());
                }
            }
            self.invalidate();
            return true;
        }

        let map = self.partition_mut(&attribute_type);
        let Some(instance) = map
            .get_mut(&attribute_type)
            .and_then(|list| list.iter_mut().find(|a| a.options_equal(attribute.options())))
        else {
            missing.extend(attribute.values().iter().cloned());
            return false;
        };
        for value in attribute.values() {
            if !instance.remove(value) {
                missing.push(value.clone());
            }
        }
        if let Some(list) = map.get_mut(&attribute_type) {
            list.retain(|a| !a.is_empty());
        }
        map.prune();
        self.invalidate();
        true
    }

    /// Add the single integer value of `increment` to the single existing
    /// value of the attribute.
    pub fn increment_attribute(&mut self, increment: &Attribute) -> ModificationResult<()> {
        let attribute_type = increment.attribute_type();
        let attribute = increment.name().to_string();
        if attribute_type.is_object_class() {
            return Err(ModificationError::ObjectClassIncrement {
                dn: self.dn.to_string(),
            });
        }

        // Only the exact type and option set; subtypes are never incremented.
        let Some(target) = self.get_exact_attribute(attribute_type, increment.options()) else {
            return Err(ModificationError::NoSuchAttribute {
                dn: self.dn.to_string(),
                attribute,
            });
        };

        let amount = match increment.values() {
            [value] => parse_integer(value).ok_or_else(|| ModificationError::IncrementNotInteger {
                attribute: attribute.clone(),
                value: value.to_string_lossy(),
            })?,
            values => {
                return Err(ModificationError::IncrementValueCount {
                    attribute,
                    count: values.len(),
                });
            }
        };

        let current = match target.values() {
            [current] => current,
            values => {
                return Err(ModificationError::IncrementMultipleValues {
                    attribute,
                    instances: 1,
                    values: values.len(),
                });
            }
        };
        let current_value =
            parse_integer(current).ok_or_else(|| ModificationError::IncrementExistingNotInteger {
                attribute: attribute.clone(),
                value: current.to_string_lossy(),
            })?;
        let updated_value = current_value
            .checked_add(amount)
            .ok_or(ModificationError::IncrementOverflow { attribute })?;

        let mut updated = target.clone();
        updated.clear();
        updated.add(AttributeValue::from(updated_value.to_string()));
        if let Some(list) = self.partition_mut(attribute_type).get_mut(attribute_type) {
            if let Some(slot) = list.iter_mut().find(|a| a.options_equal(updated.options())) {
                *slot = updated;
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Apply one modification, failing on duplicate additions, missing
    /// deletions and malformed increments.
    pub fn apply_modification(&mut self, schema: &Schema, modification: &Modification) -> ModificationResult<()> {
        let attribute = modification.attribute();
        if attribute.attribute_type().is_object_class() {
            return self.apply_object_class_modification(schema, modification);
        }

        match modification.kind() {
            ModificationType::Add => {
                let mut duplicates = Vec::new();
                self.add_attribute(schema, attribute.clone(), &mut duplicates);
                if !duplicates.is_empty() {
                    return Err(ModificationError::AttributeOrValueExists {
                        dn: self.dn.to_string(),
                        attribute: attribute.name().to_string(),
                        values: duplicates.iter().map(AttributeValue::to_string_lossy).collect(),
                    });
                }
            }
            ModificationType::Delete => {
                let mut missing = Vec::new();
                if !self.remove_attribute_values(attribute, &mut missing) {
                    return Err(ModificationError::NoSuchAttribute {
                        dn: self.dn.to_string(),
                        attribute: attribute.name().to_string(),
                    });
                }
                if !missing.is_empty() {
                    return Err(ModificationError::NoSuchValue {
                        dn: self.dn.to_string(),
                        attribute: attribute.name().to_string(),
                        values: missing.iter().map(AttributeValue::to_string_lossy).collect(),
                    });
                }
            }
            ModificationType::Replace => self.replace_attribute(schema, attribute.clone()),
            ModificationType::Increment => self.increment_attribute(attribute)?,
        }
        Ok(())
    }

    fn apply_object_class_modification(
        &mut self,
        schema: &Schema,
        modification: &Modification,
    ) -> ModificationResult<()> {
        let attribute = modification.attribute();
        let classes = Self::resolve_object_classes(schema, attribute);
        match modification.kind() {
            ModificationType::Add => {
                let present: Vec<String> = classes
                    .iter()
                    .filter(|(oc, _)| self.object_classes.iter().any(|(existing, _)| existing == oc))
                    .map(|(_, name)| name.clone())
                    .collect();
                if !present.is_empty() {
                    return Err(ModificationError::AttributeOrValueExists {
                        dn: self.dn.to_string(),
                        attribute: attribute.name().to_string(),
                        values: present,
                    });
                }
                self.object_classes.extend(classes);
                self.invalidate();
            }
            ModificationType::Delete => {
                if classes.is_empty() {
                    if !self.remove_attribute_type(attribute.attribute_type(), None) {
                        return Err(ModificationError::NoSuchAttribute {
                            dn: self.dn.to_string(),
                            attribute: attribute.name().to_string(),
                        });
                    }
                    return Ok(());
                }
                let absent: Vec<String> = classes
                    .iter()
                    .filter(|(oc, _)| !self.object_classes.iter().any(|(existing, _)| existing == oc))
                    .map(|(_, name)| name.clone())
                    .collect();
                if !absent.is_empty() {
                    return Err(ModificationError::NoSuchValue {
                        dn: self.dn.to_string(),
                        attribute: attribute.name().to_string(),
                        values: absent,
                    });
                }
                self.object_classes
                    .retain(|(existing, _)| !classes.iter().any(|(oc, _)| oc == existing));
                self.invalidate();
            }
            ModificationType::Replace => self.set_object_classes(classes),
            ModificationType::Increment => {
                return Err(ModificationError::ObjectClassIncrement {
                    dn: self.dn.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply modifications in order, stopping at the first failure.
    pub fn apply_modifications(&mut self, schema: &Schema, modifications: &[Modification]) -> ModificationResult<()> {
        for modification in modifications {
            self.apply_modification(schema, modification)?;
        }
        Ok(())
    }

    // Virtual attributes

    pub fn is_virtual_attribute_processing_performed(&self) -> bool {
        self.virtual_processing_performed
    }

    pub(crate) fn mark_virtual_attribute_processing_performed(&mut self) {
        self.virtual_processing_performed = true;
        self.invalidate();
    }

    // Duplication

    /// A working copy that can be altered independently. The attachment is
    /// not carried over.
    pub fn duplicate(&self) -> Entry {
        let mut copy = self.clone();
        copy.attachment = None;
        copy
    }

    /// A copy with virtual attribute instances dropped and suppressed real
    /// attributes restored.
    pub fn duplicate_without_virtual_attributes(&self) -> Entry {
        let mut copy = self.duplicate();
        for list in copy
            .user_attributes
            .iter_mut()
            .chain(copy.operational_attributes.iter_mut())
        {
            list.retain(|a| !a.is_virtual());
        }
        copy.user_attributes.prune();
        copy.operational_attributes.prune();

        let suppressed = std::mem::take(&mut copy.suppressed_attributes);
        for attribute in suppressed.attributes() {
            copy.partition_mut(attribute.attribute_type())
                .push(attribute.clone());
        }
        copy.virtual_processing_performed = false;
        copy
    }

    // Attachment

    /// Cache a derived object against the current generation.
    pub fn set_attachment<T: Any + Send + Sync>(&mut self, value: T) {
        self.attachment = Some(Attachment {
            generation: self.generation,
            value: Arc::new(value),
        });
    }

    /// The cached object, if one of type `T` was stored and the entry has
    /// not changed since.
    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let attachment = self.attachment.as_ref()?;
        if attachment.generation != self.generation {
            return None;
        }
        Arc::clone(&attachment.value).downcast::<T>().ok()
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    // Helpers

    pub fn is_referral(&self) -> bool {
        self.has_object_class_named(REFERRAL_OBJECT_CLASS_OID, "referral")
    }

    /// Values of the ref attribute of a referral entry.
    pub fn referral_urls(&self) -> Vec<String> {
        if !self.is_referral() {
            return Vec::new();
        }
        self.attributes()
            .filter(|a| a.attribute_type().has_name("ref"))
            .flat_map(|a| a.values().iter().map(AttributeValue::to_string_lossy))
            .collect()
    }

    pub fn is_alias(&self) -> bool {
        self.has_object_class_named(ALIAS_OBJECT_CLASS_OID, "alias")
    }

    /// The target of an alias entry, if it parses.
    pub fn aliased_dn(&self) -> Option<Dn> {
        if !self.is_alias() {
            return None;
        }
        self.attributes()
            .find(|a| a.attribute_type().has_name("aliasedobjectname"))
            .and_then(|a| a.values().first())
            .and_then(|value| Dn::parse(&value.to_string_lossy()).ok())
    }

    pub fn is_ldap_subentry(&self) -> bool {
        self.has_object_class_named(LDAP_SUBENTRY_OBJECT_CLASS_OID, "ldapSubentry")
    }

    /// DNs are compared through the equality rules of their naming
    /// attributes.
    pub fn matches_base_and_scope(&self, schema: &Schema, base: &Dn, scope: SearchScope) -> bool {
        match scope {
            SearchScope::BaseObject => self.dn.equals_with(base, schema),
            SearchScope::SingleLevel => self
                .dn
                .parent()
                .is_some_and(|parent| parent.equals_with(base, schema)),
            SearchScope::WholeSubtree => self.dn.is_descendant_of_with(base, schema),
            SearchScope::SubordinateSubtree => {
                self.dn.num_components() > base.num_components() && self.dn.is_descendant_of_with(base, schema)
            }
        }
    }

    /// A copy holding only the requested attributes. An empty request or
    /// `*` selects all user attributes, `+` all operational attributes, and
    /// `@name` the attributes allowed by an object class. With `types_only`
    /// the selected attributes keep no values.
    pub fn filter_entry(&self, schema: &Schema, requested: &[&str], types_only: bool) -> Entry {
        let all_user = requested.is_empty() || requested.contains(&"*");
        let all_operational = requested.contains(&"+");

        let mut selected: Vec<(Arc<AttributeType>, BTreeSet<String>)> = Vec::new();
        let mut selected_classes: Vec<Arc<ObjectClass>> = Vec::new();
        let mut include_object_classes = all_user;
        for name in requested {
            if let Some(class_name) = name.strip_prefix('@') {
                if let Some(oc) = schema.object_class(class_name) {
                    selected_classes.push(oc);
                }
                continue;
            }
            if *name == "*" || *name == "+" {
                continue;
            }
            let (type_name, options) = split_options(name);
            let attribute_type = schema.attribute_type_or_default(type_name);
            if attribute_type.is_object_class() {
                include_object_classes = true;
            } else {
                selected.push((attribute_type, options));
            }
        }

        let wanted = |attribute: &Attribute| {
            let attribute_type = attribute.attribute_type();
            if attribute_type.is_operational() {
                if all_operational {
                    return true;
                }
            } else if all_user
                || selected_classes
                    .iter()
                    .any(|oc| oc.is_required_or_optional(attribute_type))
            {
                return true;
            }
            selected.iter().any(|(t, options)| {
                attribute_type.is_same_or_subtype_of(t) && attribute.has_all_options(options)
            })
        };

        let mut filtered = Entry::new(self.dn.clone());
        if include_object_classes {
            filtered.object_classes = self.object_classes.clone();
        }
        for attribute in self.attributes().filter(|a| wanted(a)) {
            let mut copy = attribute.clone();
            if types_only {
                copy.clear();
            }
            filtered.partition_mut(attribute.attribute_type()).push(copy);
        }
        filtered.virtual_processing_performed = self.virtual_processing_performed;
        filtered
    }

    /// Compact single-line rendering for logs.
    pub fn to_single_line_string(&self) -> String {
        let names = |map: &AttributeMap| {
            map.attributes()
                .map(Attribute::name_with_options)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "Entry(dn=\"{}\",objectClasses={{{}}},userAttrs={{{}}},operationalAttrs={{{}}})",
            self.dn,
            self.object_class_names().collect::<Vec<_>>().join(","),
            names(&self.user_attributes),
            names(&self.operational_attributes)
        )
    }
}

fn parse_integer(value: &AttributeValue) -> Option<i64> {
    std::str::from_utf8(value.as_bytes())
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.dn == other.dn
            && self.object_classes.len() == other.object_classes.len()
            && self
                .object_classes
                .iter()
                .all(|(oc, _)| other.object_classes.iter().any(|(o, _)| o == oc))
            && self.user_attributes.equivalent(&other.user_attributes)
            && self
                .operational_attributes
                .equivalent(&other.operational_attributes)
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dn.hash(state);
        self.object_classes.len().hash(state);
        self.user_attributes.len().hash(state);
        self.operational_attributes.len().hash(state);
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_single_line_string())
    }
}
