//! The schema registry.
//!
//! Each element kind lives in its own table behind its own
//! `parking_lot::RwLock`: lookups of different kinds never contend, and a
//! registration holds the write lock of exactly one kind for the whole
//! conflict-check-then-insert sequence so that the key map and the published
//! definition set change together. An element with N names occupies N+1
//! keys in its table.

use super::embedded;
use super::types::{
    AttributeType, DitContentRule, DitStructureRule, MatchingRule, MatchingRuleKind,
    MatchingRuleUse, NameForm, ObjectClass, SchemaElement, SchemaElementRef, Syntax,
    TOP_OBJECT_CLASS_OID,
};
use crate::config::DEFAULT_MAX_REBUILD_DEPTH;
use crate::error::{SchemaError, SchemaResult};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// OID of the Directory String syntax used for types the schema lacks.
pub const DIRECTORY_STRING_SYNTAX_OID: &str = "1.3.6.1.4.1.1466.115.121.1.15";

/// Key map plus normalized definition set for one element kind.
#[derive(Debug)]
pub(crate) struct ElementTable<T> {
    by_key: HashMap<String, Arc<T>>,
    definitions: HashSet<String>,
}

impl<T> Clone for ElementTable<T> {
    fn clone(&self) -> Self {
        Self {
            by_key: self.by_key.clone(),
            definitions: self.definitions.clone(),
        }
    }
}

impl<T> Default for ElementTable<T> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            definitions: HashSet::new(),
        }
    }
}

impl<T: SchemaElement> ElementTable<T> {
    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(&key.to_ascii_lowercase()).cloned()
    }

    /// Elements whose keys would be taken over by `element`. Without
    /// `overwrite`, any key held by an element with a different definition
    /// is a conflict.
    fn displaced_by(&self, element: &T, overwrite: bool) -> SchemaResult<Vec<Arc<T>>> {
        let mut displaced: Vec<Arc<T>> = Vec::new();
        for (index, key) in element.lookup_keys().into_iter().enumerate() {
            let Some(existing) = self.by_key.get(&key) else {
                continue;
            };
            let same = existing.oid().eq_ignore_ascii_case(element.oid())
                && existing.definition().eq_ignore_ascii_case(element.definition());
            if !overwrite && !same {
                return Err(if index == 0 {
                    SchemaError::ConflictingOid {
                        kind: T::KIND,
                        element: element.name_or_oid().to_string(),
                        oid: element.oid().to_string(),
                        existing: existing.name_or_oid().to_string(),
                    }
                } else {
                    SchemaError::ConflictingName {
                        kind: T::KIND,
                        element: element.name_or_oid().to_string(),
                        name: key,
                        existing: existing.name_or_oid().to_string(),
                    }
                });
            }
            if !displaced.iter().any(|d| Arc::ptr_eq(d, existing)) {
                displaced.push(Arc::clone(existing));
            }
        }
        Ok(displaced)
    }

    fn insert(&mut self, element: Arc<T>) {
        for key in element.lookup_keys() {
            self.by_key.insert(key, Arc::clone(&element));
        }
        self.definitions
            .insert(element.definition().to_ascii_lowercase());
    }

    /// Remove every key that still maps to `element`, plus its definition.
    fn remove(&mut self, element: &T) -> bool {
        let mut removed = false;
        for key in element.lookup_keys() {
            let owned = self
                .by_key
                .get(&key)
                .is_some_and(|existing| existing.oid().eq_ignore_ascii_case(element.oid()));
            if owned {
                self.by_key.remove(&key);
                removed = true;
            }
        }
        self.definitions
            .remove(&element.definition().to_ascii_lowercase());
        removed
    }

    /// Register `element`, returning the elements it replaced.
    fn register(&mut self, element: Arc<T>, overwrite: bool) -> SchemaResult<Vec<Arc<T>>> {
        let displaced = self.displaced_by(&element, overwrite)?;
        for old in &displaced {
            self.remove(old);
        }
        self.insert(element);
        Ok(displaced)
    }

    pub(crate) fn values(&self) -> Vec<Arc<T>> {
        let mut values: Vec<Arc<T>> = self
            .by_key
            .iter()
            .filter(|(key, element)| element.oid().eq_ignore_ascii_case(key))
            .map(|(_, element)| Arc::clone(element))
            .collect();
        values.sort_by(|a, b| a.oid().cmp(b.oid()));
        values
    }

    fn sorted_definitions(&self) -> Vec<String> {
        let mut definitions: Vec<String> = self.definitions.iter().cloned().collect();
        definitions.sort();
        definitions
    }
}

#[derive(Debug, Clone, Default)]
struct AttributeTypeTable {
    elements: ElementTable<AttributeType>,
    /// Superior OID to every registered direct and indirect subtype.
    subordinates: HashMap<String, Vec<Arc<AttributeType>>>,
}

impl AttributeTypeTable {
    fn add_subordinate(&mut self, attribute_type: &Arc<AttributeType>) {
        let mut superior = attribute_type.superior();
        while let Some(sup) = superior {
            self.subordinates
                .entry(sup.oid().to_ascii_lowercase())
                .or_default()
                .push(Arc::clone(attribute_type));
            superior = sup.superior();
        }
    }

    fn remove_subordinate(&mut self, attribute_type: &AttributeType) {
        for subtypes in self.subordinates.values_mut() {
            subtypes.retain(|t| t.as_ref() != attribute_type);
        }
        self.subordinates.retain(|_, subtypes| !subtypes.is_empty());
    }
}

#[derive(Debug, Clone, Default)]
struct MatchingRuleTable {
    all: ElementTable<MatchingRule>,
    by_kind: HashMap<MatchingRuleKind, ElementTable<MatchingRule>>,
}

#[derive(Debug, Clone, Default)]
struct NameFormTable {
    elements: ElementTable<NameForm>,
    by_structural_class: HashMap<String, Vec<Arc<NameForm>>>,
}

impl NameFormTable {
    fn unindex(&mut self, name_form: &NameForm) {
        for forms in self.by_structural_class.values_mut() {
            forms.retain(|nf| nf.as_ref() != name_form);
        }
        self.by_structural_class.retain(|_, forms| !forms.is_empty());
    }
}

#[derive(Debug, Clone, Default)]
struct DitStructureRuleTable {
    elements: ElementTable<DitStructureRule>,
    by_name_form: HashMap<String, Vec<Arc<DitStructureRule>>>,
}

impl DitStructureRuleTable {
    fn unindex(&mut self, rule: &DitStructureRule) {
        for rules in self.by_name_form.values_mut() {
            rules.retain(|r| r.as_ref() != rule);
        }
        self.by_name_form.retain(|_, rules| !rules.is_empty());
    }
}

#[derive(Debug, Clone, Copy)]
struct ModificationTimes {
    oldest: DateTime<Utc>,
    youngest: DateTime<Utc>,
}

/// The element kinds that can be built from an RFC 4512 definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    AttributeType,
    ObjectClass,
    NameForm,
    DitContentRule,
    DitStructureRule,
    MatchingRuleUse,
}

impl DefinitionKind {
    /// The subschema attribute publishing definitions of this kind.
    pub fn attribute_name(self) -> &'static str {
        match self {
            DefinitionKind::AttributeType => "attributeTypes",
            DefinitionKind::ObjectClass => "objectClasses",
            DefinitionKind::NameForm => "nameForms",
            DefinitionKind::DitContentRule => "dITContentRules",
            DefinitionKind::DitStructureRule => "dITStructureRules",
            DefinitionKind::MatchingRuleUse => "matchingRuleUse",
        }
    }

    /// Kinds in the order their dependencies require them to be loaded.
    pub fn load_order() -> [DefinitionKind; 6] {
        [
            DefinitionKind::AttributeType,
            DefinitionKind::ObjectClass,
            DefinitionKind::NameForm,
            DefinitionKind::DitContentRule,
            DefinitionKind::DitStructureRule,
            DefinitionKind::MatchingRuleUse,
        ]
    }

    pub fn from_attribute_name(name: &str) -> Option<Self> {
        Self::load_order()
            .into_iter()
            .find(|kind| kind.attribute_name().eq_ignore_ascii_case(name))
    }
}

/// A thread-safe registry of schema elements.
///
/// Callers must not assume a shared `Schema` stays unchanged across an
/// operation; use [`Schema::duplicate`] to pin a snapshot.
#[derive(Debug)]
pub struct Schema {
    attribute_types: RwLock<AttributeTypeTable>,
    object_classes: RwLock<ElementTable<ObjectClass>>,
    syntaxes: RwLock<ElementTable<Syntax>>,
    matching_rules: RwLock<MatchingRuleTable>,
    matching_rule_uses: RwLock<ElementTable<MatchingRuleUse>>,
    name_forms: RwLock<NameFormTable>,
    dit_content_rules: RwLock<ElementTable<DitContentRule>>,
    dit_structure_rules: RwLock<DitStructureRuleTable>,
    modification_times: RwLock<ModificationTimes>,
    rebuild_depth_limit: usize,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Create an empty registry.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            attribute_types: RwLock::default(),
            object_classes: RwLock::default(),
            syntaxes: RwLock::default(),
            matching_rules: RwLock::default(),
            matching_rule_uses: RwLock::default(),
            name_forms: RwLock::default(),
            dit_content_rules: RwLock::default(),
            dit_structure_rules: RwLock::default(),
            modification_times: RwLock::new(ModificationTimes {
                oldest: now,
                youngest: now,
            }),
            rebuild_depth_limit: DEFAULT_MAX_REBUILD_DEPTH,
        }
    }

    /// Create a registry holding the standard syntaxes, matching rules,
    /// attribute types and object classes.
    pub fn with_core_schema() -> SchemaResult<Self> {
        let schema = Self::new();
        embedded::load_core_schema(&schema)?;
        Ok(schema)
    }

    /// Set how deep dependent-element rebuilding may recurse before it is
    /// reported as a circular dependency.
    pub fn with_rebuild_depth_limit(mut self, limit: usize) -> Self {
        self.rebuild_depth_limit = limit;
        self
    }

    pub fn rebuild_depth_limit(&self) -> usize {
        self.rebuild_depth_limit
    }

    /// An independent registry sharing this registry's element objects.
    pub fn duplicate(&self) -> Schema {
        Schema {
            attribute_types: RwLock::new(self.attribute_types.read().clone()),
            object_classes: RwLock::new(self.object_classes.read().clone()),
            syntaxes: RwLock::new(self.syntaxes.read().clone()),
            matching_rules: RwLock::new(self.matching_rules.read().clone()),
            matching_rule_uses: RwLock::new(self.matching_rule_uses.read().clone()),
            name_forms: RwLock::new(self.name_forms.read().clone()),
            dit_content_rules: RwLock::new(self.dit_content_rules.read().clone()),
            dit_structure_rules: RwLock::new(self.dit_structure_rules.read().clone()),
            modification_times: RwLock::new(*self.modification_times.read()),
            rebuild_depth_limit: self.rebuild_depth_limit,
        }
    }

    fn touch(&self) {
        self.modification_times.write().youngest = Utc::now();
    }

    pub fn oldest_modification_time(&self) -> DateTime<Utc> {
        self.modification_times.read().oldest
    }

    pub fn youngest_modification_time(&self) -> DateTime<Utc> {
        self.modification_times.read().youngest
    }

    // Attribute types

    pub fn attribute_type(&self, name_or_oid: &str) -> Option<Arc<AttributeType>> {
        self.attribute_types.read().elements.get(name_or_oid)
    }

    /// The registered type, or a placeholder using the default syntax.
    pub fn attribute_type_or_default(&self, name_or_oid: &str) -> Arc<AttributeType> {
        if let Some(found) = self.attribute_type(name_or_oid) {
            return found;
        }
        trace!("Using placeholder attribute type for '{}'", name_or_oid);
        let syntax = self.default_syntax();
        let rule = |oid: &Option<String>| oid.as_deref().and_then(|o| self.matching_rule(o));
        Arc::new(AttributeType::placeholder(
            name_or_oid,
            Arc::clone(&syntax),
            rule(&syntax.default_equality),
            rule(&syntax.default_ordering),
            rule(&syntax.default_substring),
            rule(&syntax.default_approximate),
        ))
    }

    /// The objectClass attribute type, or a placeholder if not registered.
    pub fn object_class_attribute_type(&self) -> Arc<AttributeType> {
        self.attribute_type(super::types::OBJECT_CLASS_ATTRIBUTE_OID)
            .unwrap_or_else(|| self.attribute_type_or_default("objectClass"))
    }

    pub fn attribute_types(&self) -> Vec<Arc<AttributeType>> {
        self.attribute_types.read().elements.values()
    }

    pub fn register_attribute_type(
        &self,
        attribute_type: impl Into<Arc<AttributeType>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let attribute_type = attribute_type.into();
        {
            let mut table = self.attribute_types.write();
            let displaced = table
                .elements
                .register(Arc::clone(&attribute_type), overwrite)?;
            for old in &displaced {
                table.remove_subordinate(old);
            }
            table.add_subordinate(&attribute_type);
        }
        self.touch();
        debug!("Registered attribute type {}", attribute_type.name_or_oid());
        Ok(())
    }

    pub fn deregister_attribute_type(&self, attribute_type: &AttributeType) -> bool {
        let removed = {
            let mut table = self.attribute_types.write();
            table.remove_subordinate(attribute_type);
            table.elements.remove(attribute_type)
        };
        if removed {
            self.touch();
            debug!("Deregistered attribute type {}", attribute_type.name_or_oid());
        }
        removed
    }

    /// Registered direct and indirect subtypes of `attribute_type`.
    pub fn sub_types(&self, attribute_type: &AttributeType) -> SubTypes {
        let subtypes = self
            .attribute_types
            .read()
            .subordinates
            .get(&attribute_type.oid().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
        SubTypes(subtypes.into())
    }

    pub fn has_sub_types(&self, attribute_type: &AttributeType) -> bool {
        self.attribute_types
            .read()
            .subordinates
            .contains_key(&attribute_type.oid().to_ascii_lowercase())
    }

    // Object classes

    pub fn object_class(&self, name_or_oid: &str) -> Option<Arc<ObjectClass>> {
        self.object_classes.read().get(name_or_oid)
    }

    /// The registered class, or a structural placeholder under `top`.
    pub fn object_class_or_default(&self, name_or_oid: &str) -> Arc<ObjectClass> {
        if let Some(found) = self.object_class(name_or_oid) {
            return found;
        }
        trace!("Using placeholder object class for '{}'", name_or_oid);
        Arc::new(ObjectClass::placeholder(
            name_or_oid,
            self.object_class(TOP_OBJECT_CLASS_OID),
        ))
    }

    pub fn object_classes(&self) -> Vec<Arc<ObjectClass>> {
        self.object_classes.read().values()
    }

    pub fn register_object_class(
        &self,
        object_class: impl Into<Arc<ObjectClass>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let object_class = object_class.into();
        self.object_classes
            .write()
            .register(Arc::clone(&object_class), overwrite)?;
        self.touch();
        debug!("Registered object class {}", object_class.name_or_oid());
        Ok(())
    }

    pub fn deregister_object_class(&self, object_class: &ObjectClass) -> bool {
        let removed = self.object_classes.write().remove(object_class);
        if removed {
            self.touch();
        }
        removed
    }

    // Syntaxes

    pub fn syntax(&self, oid: &str) -> Option<Arc<Syntax>> {
        self.syntaxes.read().get(oid)
    }

    /// Directory String, registered or not.
    pub fn default_syntax(&self) -> Arc<Syntax> {
        self.syntax(DIRECTORY_STRING_SYNTAX_OID)
            .unwrap_or_else(|| Arc::new(embedded::directory_string_syntax()))
    }

    pub fn syntaxes(&self) -> Vec<Arc<Syntax>> {
        self.syntaxes.read().values()
    }

    pub fn register_syntax(&self, syntax: impl Into<Arc<Syntax>>, overwrite: bool) -> SchemaResult<()> {
        let syntax = syntax.into();
        self.syntaxes.write().register(syntax, overwrite)?;
        self.touch();
        Ok(())
    }

    pub fn deregister_syntax(&self, syntax: &Syntax) -> bool {
        let removed = self.syntaxes.write().remove(syntax);
        if removed {
            self.touch();
        }
        removed
    }

    // Matching rules

    pub fn matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rules.read().all.get(name_or_oid)
    }

    /// Look up a rule in the table for one kind only.
    pub fn matching_rule_of_kind(
        &self,
        kind: MatchingRuleKind,
        name_or_oid: &str,
    ) -> Option<Arc<MatchingRule>> {
        self.matching_rules
            .read()
            .by_kind
            .get(&kind)
            .and_then(|table| table.get(name_or_oid))
    }

    pub fn equality_matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rule_of_kind(MatchingRuleKind::Equality, name_or_oid)
    }

    pub fn ordering_matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rule_of_kind(MatchingRuleKind::Ordering, name_or_oid)
    }

    pub fn substring_matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rule_of_kind(MatchingRuleKind::Substring, name_or_oid)
    }

    pub fn approximate_matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rule_of_kind(MatchingRuleKind::Approximate, name_or_oid)
    }

    pub fn extensible_matching_rule(&self, name_or_oid: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rule_of_kind(MatchingRuleKind::Extensible, name_or_oid)
    }

    pub fn matching_rules(&self) -> Vec<Arc<MatchingRule>> {
        self.matching_rules.read().all.values()
    }

    /// Register a rule in the umbrella table and in the table for its kind.
    pub fn register_matching_rule(
        &self,
        matching_rule: impl Into<Arc<MatchingRule>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let matching_rule = matching_rule.into();
        {
            let mut tables = self.matching_rules.write();
            let displaced = tables.all.register(Arc::clone(&matching_rule), overwrite)?;
            for old in &displaced {
                if let Some(table) = tables.by_kind.get_mut(&old.kind()) {
                    table.remove(old);
                }
            }
            tables
                .by_kind
                .entry(matching_rule.kind())
                .or_default()
                .insert(Arc::clone(&matching_rule));
        }
        self.touch();
        debug!("Registered matching rule {}", matching_rule.name_or_oid());
        Ok(())
    }

    pub fn deregister_matching_rule(&self, matching_rule: &MatchingRule) -> bool {
        let removed = {
            let mut tables = self.matching_rules.write();
            if let Some(table) = tables.by_kind.get_mut(&matching_rule.kind()) {
                table.remove(matching_rule);
            }
            tables.all.remove(matching_rule)
        };
        if removed {
            self.touch();
        }
        removed
    }

    // Matching rule uses

    /// The use restricting `matching_rule`, keyed by the rule's OID.
    pub fn matching_rule_use(&self, matching_rule: &MatchingRule) -> Option<Arc<MatchingRuleUse>> {
        self.matching_rule_uses.read().get(matching_rule.oid())
    }

    pub fn matching_rule_uses(&self) -> Vec<Arc<MatchingRuleUse>> {
        self.matching_rule_uses.read().values()
    }

    pub fn register_matching_rule_use(
        &self,
        matching_rule_use: impl Into<Arc<MatchingRuleUse>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let matching_rule_use = matching_rule_use.into();
        self.matching_rule_uses
            .write()
            .register(matching_rule_use, overwrite)?;
        self.touch();
        Ok(())
    }

    pub fn deregister_matching_rule_use(&self, matching_rule_use: &MatchingRuleUse) -> bool {
        let removed = self.matching_rule_uses.write().remove(matching_rule_use);
        if removed {
            self.touch();
        }
        removed
    }

    // Name forms

    pub fn name_form(&self, name_or_oid: &str) -> Option<Arc<NameForm>> {
        self.name_forms.read().elements.get(name_or_oid)
    }

    /// Name forms whose structural class is `object_class`.
    pub fn name_forms_for(&self, object_class: &ObjectClass) -> Vec<Arc<NameForm>> {
        self.name_forms
            .read()
            .by_structural_class
            .get(&object_class.oid().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn name_forms(&self) -> Vec<Arc<NameForm>> {
        self.name_forms.read().elements.values()
    }

    pub fn register_name_form(
        &self,
        name_form: impl Into<Arc<NameForm>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let name_form = name_form.into();
        {
            let mut table = self.name_forms.write();
            let displaced = table.elements.register(Arc::clone(&name_form), overwrite)?;
            for old in &displaced {
                table.unindex(old);
            }
            table
                .by_structural_class
                .entry(name_form.structural_class().oid().to_ascii_lowercase())
                .or_default()
                .push(Arc::clone(&name_form));
        }
        self.touch();
        debug!("Registered name form {}", name_form.name_or_oid());
        Ok(())
    }

    pub fn deregister_name_form(&self, name_form: &NameForm) -> bool {
        let removed = {
            let mut table = self.name_forms.write();
            table.unindex(name_form);
            table.elements.remove(name_form)
        };
        if removed {
            self.touch();
        }
        removed
    }

    // DIT content rules

    pub fn dit_content_rule(&self, name_or_oid: &str) -> Option<Arc<DitContentRule>> {
        self.dit_content_rules.read().get(name_or_oid)
    }

    /// The content rule for a structural class; rules share the class OID.
    pub fn dit_content_rule_for(&self, object_class: &ObjectClass) -> Option<Arc<DitContentRule>> {
        self.dit_content_rules
            .read()
            .get(object_class.oid())
            .filter(|rule| rule.structural_class().as_ref() == object_class)
    }

    pub fn dit_content_rules(&self) -> Vec<Arc<DitContentRule>> {
        self.dit_content_rules.read().values()
    }

    pub fn register_dit_content_rule(
        &self,
        rule: impl Into<Arc<DitContentRule>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let rule = rule.into();
        self.dit_content_rules.write().register(rule, overwrite)?;
        self.touch();
        Ok(())
    }

    pub fn deregister_dit_content_rule(&self, rule: &DitContentRule) -> bool {
        let removed = self.dit_content_rules.write().remove(rule);
        if removed {
            self.touch();
        }
        removed
    }

    // DIT structure rules

    pub fn dit_structure_rule(&self, rule_id: u32) -> Option<Arc<DitStructureRule>> {
        self.dit_structure_rules
            .read()
            .elements
            .get(&rule_id.to_string())
    }

    pub fn dit_structure_rule_by_name(&self, name: &str) -> Option<Arc<DitStructureRule>> {
        self.dit_structure_rules.read().elements.get(name)
    }

    /// Structure rules built on `name_form`.
    pub fn dit_structure_rules_for(&self, name_form: &NameForm) -> Vec<Arc<DitStructureRule>> {
        self.dit_structure_rules
            .read()
            .by_name_form
            .get(&name_form.oid().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn dit_structure_rules(&self) -> Vec<Arc<DitStructureRule>> {
        self.dit_structure_rules.read().elements.values()
    }

    pub fn register_dit_structure_rule(
        &self,
        rule: impl Into<Arc<DitStructureRule>>,
        overwrite: bool,
    ) -> SchemaResult<()> {
        let rule = rule.into();
        {
            let mut table = self.dit_structure_rules.write();
            let displaced = table.elements.register(Arc::clone(&rule), overwrite)?;
            for old in &displaced {
                table.unindex(old);
            }
            table
                .by_name_form
                .entry(rule.name_form().oid().to_ascii_lowercase())
                .or_default()
                .push(Arc::clone(&rule));
        }
        self.touch();
        Ok(())
    }

    pub fn deregister_dit_structure_rule(&self, rule: &DitStructureRule) -> bool {
        let removed = {
            let mut table = self.dit_structure_rules.write();
            table.unindex(rule);
            table.elements.remove(rule)
        };
        if removed {
            self.touch();
        }
        removed
    }

    // Definitions

    /// Parse `definition` against this registry and register the result.
    pub fn register_definition(
        &self,
        kind: DefinitionKind,
        definition: &str,
        overwrite: bool,
    ) -> SchemaResult<SchemaElementRef> {
        let element = self.build_element(kind, definition)?;
        self.register_element(&element, overwrite)?;
        Ok(element)
    }

    fn build_element(&self, kind: DefinitionKind, definition: &str) -> SchemaResult<SchemaElementRef> {
        Ok(match kind {
            DefinitionKind::AttributeType => SchemaElementRef::AttributeType(Arc::new(
                AttributeType::from_definition(definition, self)?,
            )),
            DefinitionKind::ObjectClass => SchemaElementRef::ObjectClass(Arc::new(
                ObjectClass::from_definition(definition, self)?,
            )),
            DefinitionKind::NameForm => {
                SchemaElementRef::NameForm(Arc::new(NameForm::from_definition(definition, self)?))
            }
            DefinitionKind::DitContentRule => SchemaElementRef::DitContentRule(Arc::new(
                DitContentRule::from_definition(definition, self)?,
            )),
            DefinitionKind::DitStructureRule => SchemaElementRef::DitStructureRule(Arc::new(
                DitStructureRule::from_definition(definition, self)?,
            )),
            DefinitionKind::MatchingRuleUse => SchemaElementRef::MatchingRuleUse(Arc::new(
                MatchingRuleUse::from_definition(definition, self)?,
            )),
        })
    }

    pub fn register_element(&self, element: &SchemaElementRef, overwrite: bool) -> SchemaResult<()> {
        match element {
            SchemaElementRef::AttributeType(e) => self.register_attribute_type(Arc::clone(e), overwrite),
            SchemaElementRef::ObjectClass(e) => self.register_object_class(Arc::clone(e), overwrite),
            SchemaElementRef::Syntax(e) => self.register_syntax(Arc::clone(e), overwrite),
            SchemaElementRef::MatchingRule(e) => self.register_matching_rule(Arc::clone(e), overwrite),
            SchemaElementRef::MatchingRuleUse(e) => {
                self.register_matching_rule_use(Arc::clone(e), overwrite)
            }
            SchemaElementRef::NameForm(e) => self.register_name_form(Arc::clone(e), overwrite),
            SchemaElementRef::DitContentRule(e) => {
                self.register_dit_content_rule(Arc::clone(e), overwrite)
            }
            SchemaElementRef::DitStructureRule(e) => {
                self.register_dit_structure_rule(Arc::clone(e), overwrite)
            }
        }
    }

    pub fn deregister_element(&self, element: &SchemaElementRef) -> bool {
        match element {
            SchemaElementRef::AttributeType(e) => self.deregister_attribute_type(e),
            SchemaElementRef::ObjectClass(e) => self.deregister_object_class(e),
            SchemaElementRef::Syntax(e) => self.deregister_syntax(e),
            SchemaElementRef::MatchingRule(e) => self.deregister_matching_rule(e),
            SchemaElementRef::MatchingRuleUse(e) => self.deregister_matching_rule_use(e),
            SchemaElementRef::NameForm(e) => self.deregister_name_form(e),
            SchemaElementRef::DitContentRule(e) => self.deregister_dit_content_rule(e),
            SchemaElementRef::DitStructureRule(e) => self.deregister_dit_structure_rule(e),
        }
    }

    /// Lowercased definitions of one kind, sorted, for subschema publication.
    pub fn definitions(&self, kind: DefinitionKind) -> Vec<String> {
        match kind {
            DefinitionKind::AttributeType => self.attribute_types.read().elements.sorted_definitions(),
            DefinitionKind::ObjectClass => self.object_classes.read().sorted_definitions(),
            DefinitionKind::NameForm => self.name_forms.read().elements.sorted_definitions(),
            DefinitionKind::DitContentRule => self.dit_content_rules.read().sorted_definitions(),
            DefinitionKind::DitStructureRule => {
                self.dit_structure_rules.read().elements.sorted_definitions()
            }
            DefinitionKind::MatchingRuleUse => self.matching_rule_uses.read().sorted_definitions(),
        }
    }

    pub fn syntax_definitions(&self) -> Vec<String> {
        self.syntaxes.read().sorted_definitions()
    }

    pub fn matching_rule_definitions(&self) -> Vec<String> {
        self.matching_rules.read().all.sorted_definitions()
    }

    // Dependency rebuild

    /// Recreate and re-register every element that references `element`,
    /// cascading to their dependents in turn.
    pub fn rebuild_dependent_elements(&self, element: &SchemaElementRef) -> SchemaResult<()> {
        self.rebuild_dependents(element, 0).map_err(|err| match err {
            SchemaError::CircularDependency { .. } => SchemaError::CircularDependency {
                element: element.name_or_oid().to_string(),
            },
            other => other,
        })
    }

    /// `depth` levels of dependents have been rebuilt so far; at most
    /// `rebuild_depth_limit` levels are.
    fn rebuild_dependents(&self, element: &SchemaElementRef, depth: usize) -> SchemaResult<()> {
        let dependents = self.dependents_of(element);
        if !dependents.is_empty() && depth >= self.rebuild_depth_limit {
            return Err(SchemaError::CircularDependency {
                element: element.name_or_oid().to_string(),
            });
        }
        for dependent in dependents {
            let rebuilt = self.recreate(&dependent)?;
            trace!(
                "Rebuilding {} at depth {} after change to {}",
                rebuilt.name_or_oid(),
                depth,
                element.name_or_oid()
            );
            self.register_element(&rebuilt, true)?;
            self.rebuild_dependents(&rebuilt, depth + 1)?;
        }
        Ok(())
    }

    fn recreate(&self, element: &SchemaElementRef) -> SchemaResult<SchemaElementRef> {
        let kind = match element {
            SchemaElementRef::AttributeType(_) => DefinitionKind::AttributeType,
            SchemaElementRef::ObjectClass(_) => DefinitionKind::ObjectClass,
            SchemaElementRef::NameForm(_) => DefinitionKind::NameForm,
            SchemaElementRef::DitContentRule(_) => DefinitionKind::DitContentRule,
            SchemaElementRef::DitStructureRule(_) => DefinitionKind::DitStructureRule,
            SchemaElementRef::MatchingRuleUse(_) => DefinitionKind::MatchingRuleUse,
            SchemaElementRef::Syntax(_) | SchemaElementRef::MatchingRule(_) => {
                return Ok(element.clone());
            }
        };
        let definition = match element {
            SchemaElementRef::AttributeType(e) => e.definition(),
            SchemaElementRef::ObjectClass(e) => e.definition(),
            SchemaElementRef::NameForm(e) => e.definition(),
            SchemaElementRef::DitContentRule(e) => e.definition(),
            SchemaElementRef::DitStructureRule(e) => e.definition(),
            SchemaElementRef::MatchingRuleUse(e) => e.definition(),
            SchemaElementRef::Syntax(e) => e.definition(),
            SchemaElementRef::MatchingRule(e) => e.definition(),
        };
        self.build_element(kind, definition)
    }

    /// Registered elements holding a reference to `element`. Collected under
    /// read locks that are released before any dependent is re-registered.
    fn dependents_of(&self, element: &SchemaElementRef) -> Vec<SchemaElementRef> {
        let mut dependents = Vec::new();
        match element {
            SchemaElementRef::AttributeType(t) => {
                let uses = |list: &[Arc<AttributeType>]| list.iter().any(|a| a == t);
                for at in self.attribute_types() {
                    if at.superior().is_some_and(|s| s == t) {
                        dependents.push(SchemaElementRef::AttributeType(at));
                    }
                }
                for oc in self.object_classes() {
                    if uses(&oc.required) || uses(&oc.optional) {
                        dependents.push(SchemaElementRef::ObjectClass(oc));
                    }
                }
                for nf in self.name_forms() {
                    if uses(&nf.required) || uses(&nf.optional) {
                        dependents.push(SchemaElementRef::NameForm(nf));
                    }
                }
                for dcr in self.dit_content_rules() {
                    if uses(&dcr.required) || uses(&dcr.optional) || uses(&dcr.prohibited) {
                        dependents.push(SchemaElementRef::DitContentRule(dcr));
                    }
                }
                for mru in self.matching_rule_uses() {
                    if uses(&mru.attributes) {
                        dependents.push(SchemaElementRef::MatchingRuleUse(mru));
                    }
                }
            }
            SchemaElementRef::ObjectClass(oc) => {
                for sub in self.object_classes() {
                    if sub.superiors().iter().any(|s| s == oc) {
                        dependents.push(SchemaElementRef::ObjectClass(sub));
                    }
                }
                for nf in self.name_forms() {
                    if nf.structural_class() == oc {
                        dependents.push(SchemaElementRef::NameForm(nf));
                    }
                }
                for dcr in self.dit_content_rules() {
                    if dcr.structural_class() == oc || dcr.auxiliary.iter().any(|a| a == oc) {
                        dependents.push(SchemaElementRef::DitContentRule(dcr));
                    }
                }
            }
            SchemaElementRef::NameForm(nf) => {
                for dsr in self.dit_structure_rules() {
                    if dsr.name_form() == nf {
                        dependents.push(SchemaElementRef::DitStructureRule(dsr));
                    }
                }
            }
            SchemaElementRef::DitStructureRule(rule) => {
                for dsr in self.dit_structure_rules() {
                    if dsr.superior_rules().iter().any(|s| s == rule) {
                        dependents.push(SchemaElementRef::DitStructureRule(dsr));
                    }
                }
            }
            SchemaElementRef::MatchingRule(mr) => {
                let is_rule = |rule: Option<&Arc<MatchingRule>>| rule.is_some_and(|r| r == mr);
                for at in self.attribute_types() {
                    if is_rule(at.equality_matching_rule())
                        || is_rule(at.ordering_matching_rule())
                        || is_rule(at.substring_matching_rule())
                        || is_rule(at.approximate_matching_rule())
                    {
                        dependents.push(SchemaElementRef::AttributeType(at));
                    }
                }
                for mru in self.matching_rule_uses() {
                    if mru.matching_rule() == mr {
                        dependents.push(SchemaElementRef::MatchingRuleUse(mru));
                    }
                }
            }
            SchemaElementRef::Syntax(syntax) => {
                for at in self.attribute_types() {
                    if at.syntax() == syntax {
                        dependents.push(SchemaElementRef::AttributeType(at));
                    }
                }
            }
            SchemaElementRef::MatchingRuleUse(_) | SchemaElementRef::DitContentRule(_) => {}
        }
        dependents
    }
}

/// A restartable, finite sequence of attribute subtypes.
#[derive(Debug, Clone, Default)]
pub struct SubTypes(Arc<[Arc<AttributeType>]>);

impl SubTypes {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<AttributeType>> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'a> IntoIterator for &'a SubTypes {
    type Item = &'a Arc<AttributeType>;
    type IntoIter = std::slice::Iter<'a, Arc<AttributeType>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
