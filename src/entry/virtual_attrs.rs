//! Virtual attributes: values computed at read time by rule providers.

use super::attribute::{AttributeBuilder, AttributeValue};
use super::entry::Entry;
use crate::dn::Dn;
use crate::filter::{FilterEvaluator, SearchFilter};
use crate::schema::{AttributeType, Schema, SchemaElement};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What happens when an entry already holds a real attribute of the rule's
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictBehavior {
    /// Keep the real attribute, skip the virtual one
    #[default]
    RealOverridesVirtual,
    /// Replace the real attribute, moving it to the suppressed set
    VirtualOverridesReal,
    /// Keep both instances
    MergeRealAndVirtual,
}

/// Computes the values of a virtual attribute for one entry.
pub trait VirtualAttributeProvider: fmt::Debug + Send + Sync {
    fn values(&self, entry: &Entry) -> Vec<AttributeValue>;
}

/// The entry's own DN.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryDnProvider;

impl VirtualAttributeProvider for EntryDnProvider {
    fn values(&self, entry: &Entry) -> Vec<AttributeValue> {
        vec![AttributeValue::from(entry.dn().to_string())]
    }
}

/// A name-based UUID derived from the normalized DN, stable across renames
/// that do not change the normalized form.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryUuidProvider;

impl EntryUuidProvider {
    pub fn uuid_for(dn: &Dn) -> Uuid {
        Uuid::new_v3(&Uuid::NAMESPACE_X500, dn.normalized().as_bytes())
    }
}

impl VirtualAttributeProvider for EntryUuidProvider {
    fn values(&self, entry: &Entry) -> Vec<AttributeValue> {
        vec![AttributeValue::from(Self::uuid_for(entry.dn()).to_string())]
    }
}

/// The DN of the subschema subentry governing every entry.
#[derive(Debug, Clone)]
pub struct SubschemaSubentryProvider {
    subentry: Dn,
}

impl SubschemaSubentryProvider {
    pub fn new(subentry: Dn) -> Self {
        Self { subentry }
    }
}

impl VirtualAttributeProvider for SubschemaSubentryProvider {
    fn values(&self, _entry: &Entry) -> Vec<AttributeValue> {
        vec![AttributeValue::from(self.subentry.to_string())]
    }
}

/// Fixed values configured by an administrator.
#[derive(Debug, Clone, Default)]
pub struct UserDefinedProvider {
    values: Vec<AttributeValue>,
}

impl UserDefinedProvider {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl VirtualAttributeProvider for UserDefinedProvider {
    fn values(&self, _entry: &Entry) -> Vec<AttributeValue> {
        self.values.clone()
    }
}

/// Binds a provider to an attribute type and the entries it applies to.
#[derive(Debug, Clone)]
pub struct VirtualAttributeRule {
    attribute_type: Arc<AttributeType>,
    provider: Arc<dyn VirtualAttributeProvider>,
    base_dns: Vec<Dn>,
    filters: Vec<SearchFilter>,
    conflict_behavior: ConflictBehavior,
}

impl VirtualAttributeRule {
    /// A rule applying to every entry.
    pub fn new(attribute_type: Arc<AttributeType>, provider: Arc<dyn VirtualAttributeProvider>) -> Self {
        Self {
            attribute_type,
            provider,
            base_dns: Vec::new(),
            filters: Vec::new(),
            conflict_behavior: ConflictBehavior::default(),
        }
    }

    pub fn with_base_dn(mut self, base_dn: Dn) -> Self {
        self.base_dns.push(base_dn);
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_conflict_behavior(mut self, behavior: ConflictBehavior) -> Self {
        self.conflict_behavior = behavior;
        self
    }

    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    pub fn conflict_behavior(&self) -> ConflictBehavior {
        self.conflict_behavior
    }

    /// True if the entry lies beneath one of the base DNs (or no base DNs
    /// are configured) and matches one of the filters (or none are
    /// configured). Filters that fail to evaluate do not match.
    pub fn applies_to(&self, entry: &Entry, schema: &Schema) -> bool {
        let under_base = |base: &Dn| entry.dn().is_descendant_of_with(base, schema);
        if !self.base_dns.is_empty() && !self.base_dns.iter().any(under_base) {
            return false;
        }
        if self.filters.is_empty() {
            return true;
        }
        let evaluator = FilterEvaluator::new(schema);
        self.filters
            .iter()
            .any(|filter| match evaluator.matches_entry(filter, entry) {
                Ok(matched) => matched,
                Err(e) => {
                    debug!("Virtual attribute rule filter {filter} failed on {}: {e}", entry.dn());
                    false
                }
            })
    }
}

impl Entry {
    /// Materialize the virtual attributes of every applicable rule. Runs at
    /// most once per entry; operational types are skipped unless
    /// `include_operational` is set.
    pub fn process_virtual_attributes(
        &mut self,
        schema: &Schema,
        rules: &[VirtualAttributeRule],
        include_operational: bool,
    ) {
        if self.is_virtual_attribute_processing_performed() {
            trace!("Virtual attributes already processed for {}", self.dn());
            return;
        }

        for rule in rules {
            let attribute_type = rule.attribute_type();
            if attribute_type.is_operational() && !include_operational {
                continue;
            }
            if !rule.applies_to(self, schema) {
                continue;
            }
            let values = rule.provider.values(self);
            if values.is_empty() {
                continue;
            }
            let mut builder = AttributeBuilder::new(Arc::clone(attribute_type)).set_virtual(true);
            builder.add_all(values);
            let virtual_attribute = builder.build();

            let has_real = self
                .partition_mut(attribute_type)
                .get(attribute_type)
                .is_some_and(|list| list.iter().any(|a| !a.is_virtual()));
            if !has_real {
                self.partition_mut(attribute_type).push(virtual_attribute);
                continue;
            }

            match rule.conflict_behavior() {
                ConflictBehavior::RealOverridesVirtual => {
                    trace!("Real {} overrides virtual value in {}", attribute_type.name_or_oid(), self.dn());
                }
                ConflictBehavior::VirtualOverridesReal => {
                    let real = self
                        .partition_mut(attribute_type)
                        .remove(attribute_type)
                        .unwrap_or_default();
                    for attribute in real {
                        self.suppressed_attributes_mut().push(attribute);
                    }
                    self.partition_mut(attribute_type).push(virtual_attribute);
                }
                ConflictBehavior::MergeRealAndVirtual => {
                    self.partition_mut(attribute_type).push(virtual_attribute);
                }
            }
        }
        self.mark_virtual_attribute_processing_performed();
    }
}
