//! LDIF rendering and parsing of single entries (RFC 2849 content records).

use super::attribute::{Attribute, AttributeBuilder, AttributeValue};
use super::entry::Entry;
use crate::dn::Dn;
use crate::error::LdifError;
use crate::filter::{FilterEvaluator, SearchFilter};
use crate::schema::{AttributeType, Schema};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::trace;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Whether an export plugin lets an entry through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDecision {
    Continue,
    /// Leave the entry out of the export
    Skip,
    /// Abort the export
    Abort(String),
}

/// Hook run on each entry before it is written.
pub trait LdifExportPlugin: fmt::Debug + Send + Sync {
    fn process_export(&self, entry: &Entry) -> ExportDecision;
}

/// How entries are written by [`Entry::write_ldif`].
#[derive(Debug, Clone)]
pub struct LdifExportConfig {
    /// Wrap lines longer than this column; values of 1 or less disable
    /// wrapping.
    pub wrap_column: usize,
    pub include_attributes: Vec<Arc<AttributeType>>,
    pub exclude_attributes: Vec<Arc<AttributeType>>,
    pub include_filters: Vec<SearchFilter>,
    pub exclude_filters: Vec<SearchFilter>,
    pub types_only: bool,
    pub include_object_classes: bool,
    pub include_operational_attributes: bool,
    pub include_virtual_attributes: bool,
    pub invoke_export_plugins: bool,
    pub plugins: Vec<Arc<dyn LdifExportPlugin>>,
}

impl Default for LdifExportConfig {
    fn default() -> Self {
        Self {
            wrap_column: 0,
            include_attributes: Vec::new(),
            exclude_attributes: Vec::new(),
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
            types_only: false,
            include_object_classes: true,
            include_operational_attributes: true,
            include_virtual_attributes: false,
            invoke_export_plugins: false,
            plugins: Vec::new(),
        }
    }
}

impl LdifExportConfig {
    pub fn with_wrap_column(mut self, column: usize) -> Self {
        self.wrap_column = column;
        self
    }

    pub fn with_types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }

    pub fn with_virtual_attributes(mut self, include: bool) -> Self {
        self.include_virtual_attributes = include;
        self
    }

    pub fn include_attribute(mut self, attribute_type: Arc<AttributeType>) -> Self {
        self.include_attributes.push(attribute_type);
        self
    }

    pub fn exclude_attribute(mut self, attribute_type: Arc<AttributeType>) -> Self {
        self.exclude_attributes.push(attribute_type);
        self
    }

    pub fn include_filter(mut self, filter: SearchFilter) -> Self {
        self.include_filters.push(filter);
        self
    }

    pub fn exclude_filter(mut self, filter: SearchFilter) -> Self {
        self.exclude_filters.push(filter);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn LdifExportPlugin>) -> Self {
        self.plugins.push(plugin);
        self.invoke_export_plugins = true;
        self
    }

    fn includes_type(&self, attribute_type: &AttributeType) -> bool {
        if self
            .exclude_attributes
            .iter()
            .any(|excluded| attribute_type.is_same_or_subtype_of(excluded))
        {
            return false;
        }
        self.include_attributes.is_empty()
            || self
                .include_attributes
                .iter()
                .any(|included| attribute_type.is_same_or_subtype_of(included))
    }

    fn includes_entry(&self, entry: &Entry, schema: &Schema) -> Result<bool, LdifError> {
        let evaluator = FilterEvaluator::new(schema);
        for filter in &self.exclude_filters {
            if evaluator.matches_entry(filter, entry)? {
                return Ok(false);
            }
        }
        if self.include_filters.is_empty() {
            return Ok(true);
        }
        for filter in &self.include_filters {
            if evaluator.matches_entry(filter, entry)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// True if the value cannot be written as a plain `SAFE-STRING`.
fn needs_base64(value: &[u8]) -> bool {
    let Some((first, _)) = value.split_first() else {
        return false;
    };
    if matches!(first, b' ' | b':' | b'<') || value.last() == Some(&b' ') {
        return true;
    }
    value
        .iter()
        .any(|b| matches!(b, 0 | b'\n' | b'\r') || *b > 0x7f)
}

fn ldif_line(name: &str, value: &[u8]) -> String {
    if needs_base64(value) {
        format!("{name}:: {}", STANDARD.encode(value))
    } else {
        format!("{name}: {}", String::from_utf8_lossy(value))
    }
}

/// Append `line` folded at `wrap_column`, continuation lines starting with
/// a single space.
fn push_wrapped(out: &mut String, line: &str, wrap_column: usize) {
    if wrap_column <= 1 || line.chars().count() <= wrap_column {
        out.push_str(line);
        out.push('\n');
        return;
    }
    let mut width = 0;
    let mut limit = wrap_column;
    for c in line.chars() {
        if width == limit {
            out.push_str("\n ");
            width = 0;
            limit = wrap_column - 1;
        }
        out.push(c);
        width += 1;
    }
    out.push('\n');
}

fn push_attribute(out: &mut String, attribute: &Attribute, types_only: bool, wrap_column: usize) {
    let name = attribute.name_with_options();
    if types_only {
        push_wrapped(out, &format!("{name}:"), wrap_column);
        return;
    }
    for value in attribute.values() {
        push_wrapped(out, &ldif_line(&name, value.as_bytes()), wrap_column);
    }
}

impl Entry {
    /// Render every object class and attribute, virtual ones included.
    pub fn to_ldif(&self) -> String {
        let mut out = String::new();
        out.push_str(&ldif_line("dn", self.dn().to_string().as_bytes()));
        out.push('\n');
        for name in self.object_class_names() {
            out.push_str(&ldif_line("objectClass", name.as_bytes()));
            out.push('\n');
        }
        for attribute in self.attributes() {
            push_attribute(&mut out, attribute, false, 0);
        }
        out
    }

    /// Write this entry as an LDIF record followed by a blank line.
    /// Returns false if filters or a plugin left the entry out.
    pub fn write_ldif<W: Write>(
        &self,
        writer: &mut W,
        schema: &Schema,
        config: &LdifExportConfig,
    ) -> Result<bool, LdifError> {
        if !config.includes_entry(self, schema)? {
            trace!("Skipping entry {} because of the export configuration", self.dn());
            return Ok(false);
        }

        if config.invoke_export_plugins {
            for plugin in &config.plugins {
                match plugin.process_export(self) {
                    ExportDecision::Continue => {}
                    ExportDecision::Skip => return Ok(false),
                    ExportDecision::Abort(message) => {
                        return Err(LdifError::Plugin {
                            dn: self.dn().to_string(),
                            message,
                        });
                    }
                }
            }
        }

        let wrap = config.wrap_column;
        let mut out = String::new();
        push_wrapped(&mut out, &ldif_line("dn", self.dn().to_string().as_bytes()), wrap);

        if config.include_object_classes {
            if config.types_only {
                push_wrapped(&mut out, "objectClass:", wrap);
            } else {
                for name in self.object_class_names() {
                    push_wrapped(&mut out, &format!("objectClass: {name}"), wrap);
                }
            }
        }

        let mut maps = vec![self.user_attributes()];
        if config.include_operational_attributes {
            maps.push(self.operational_attributes());
        }
        for map in maps {
            for (attribute_type, attributes) in map.iter() {
                if !config.includes_type(attribute_type) {
                    continue;
                }
                for attribute in attributes {
                    if attribute.is_virtual() && !config.include_virtual_attributes {
                        continue;
                    }
                    push_attribute(&mut out, attribute, config.types_only, wrap);
                }
            }
        }

        // Real values displaced by virtual ones
        if !config.include_virtual_attributes {
            for (attribute_type, attributes) in self.suppressed_attributes().iter() {
                if !config.includes_type(attribute_type) {
                    continue;
                }
                if attribute_type.is_operational() && !config.include_operational_attributes {
                    continue;
                }
                for attribute in attributes {
                    push_attribute(&mut out, attribute, config.types_only, wrap);
                }
            }
        }

        out.push('\n');
        writer.write_all(out.as_bytes())?;
        Ok(true)
    }

    /// Parse one LDIF content record. Comments, a leading `version:` line
    /// and folded lines are accepted; change records are not.
    pub fn from_ldif(schema: &Schema, ldif: &str) -> Result<Entry, LdifError> {
        let lines = unfold(ldif);
        let mut records = lines
            .iter()
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .peekable();

        if records
            .peek()
            .is_some_and(|(_, line)| line.to_ascii_lowercase().starts_with("version:"))
        {
            records.next();
        }

        let Some((dn_line, first)) = records.next() else {
            return Err(LdifError::Parse {
                line: 0,
                message: "no entry found".to_string(),
            });
        };
        let (name, value) = split_line(*dn_line, first)?;
        if !name.eq_ignore_ascii_case("dn") {
            return Err(LdifError::Parse {
                line: *dn_line,
                message: format!("expected a dn line, found '{name}'"),
            });
        }
        let dn = Dn::parse(&String::from_utf8_lossy(&value))?;
        let mut entry = Entry::new(dn);

        for (number, line) in records {
            let (description, value) = split_line(*number, line)?;
            if description.eq_ignore_ascii_case("changetype") {
                return Err(LdifError::Parse {
                    line: *number,
                    message: "change records are not supported".to_string(),
                });
            }
            let attribute = AttributeBuilder::from_description(description, schema)
                .value(AttributeValue::from(value))
                .build();
            let mut duplicates = Vec::new();
            entry.add_attribute(schema, attribute, &mut duplicates);
        }
        Ok(entry)
    }
}

/// Join continuation lines, keeping the 1-based number of each logical
/// line's first physical line.
pub(crate) fn unfold(ldif: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (index, raw) in ldif.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match (raw.strip_prefix(' '), lines.last_mut()) {
            (Some(continuation), Some((_, last))) => last.push_str(continuation),
            _ => lines.push((index + 1, raw.to_string())),
        }
    }
    lines
}

pub(crate) fn split_line(number: usize, line: &str) -> Result<(&str, Vec<u8>), LdifError> {
    let Some((name, rest)) = line.split_once(':') else {
        return Err(LdifError::Parse {
            line: number,
            message: format!("missing ':' in '{line}'"),
        });
    };
    if let Some(encoded) = rest.strip_prefix(':') {
        let value = STANDARD
            .decode(encoded.trim())
            .map_err(|e| LdifError::Parse {
                line: number,
                message: format!("invalid base64 value: {e}"),
            })?;
        return Ok((name.trim(), value));
    }
    if rest.starts_with('<') {
        return Err(LdifError::Parse {
            line: number,
            message: "URL values are not supported".to_string(),
        });
    }
    Ok((name.trim(), rest.trim_start_matches(' ').as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::virtual_attrs::{ConflictBehavior, UserDefinedProvider, VirtualAttributeRule};

    fn schema() -> Schema {
        Schema::with_core_schema().unwrap()
    }

    const BJENSEN: &str = "\
version: 1
# a person
dn: uid=bjensen,dc=example,dc=com
objectClass: top
objectClass: person
cn: Babs Jensen
sn: Jensen
description:: w6ljcml0
";

    #[test]
    fn test_from_ldif() {
        let schema = schema();
        let entry = Entry::from_ldif(&schema, BJENSEN).unwrap();
        assert_eq!(entry.dn().to_string(), "uid=bjensen,dc=example,dc=com");
        assert_eq!(entry.object_class_names().collect::<Vec<_>>(), vec!["top", "person"]);
        let description = schema.attribute_type("description").unwrap();
        assert_eq!(entry.get_attribute(&description)[0].values()[0].to_string_lossy(), "écrit");
    }

    #[test]
    fn test_to_ldif_uses_base64_for_unsafe_values() {
        let schema = schema();
        let entry = Entry::from_ldif(&schema, BJENSEN).unwrap();
        let ldif = entry.to_ldif();
        assert!(ldif.starts_with("dn: uid=bjensen,dc=example,dc=com\nobjectClass: top\n"));
        assert!(ldif.contains("cn: Babs Jensen\n"));
        assert!(ldif.contains("description:: w6ljcml0\n"));
        assert_eq!(Entry::from_ldif(&schema, &ldif).unwrap(), entry);
    }

    #[test]
    fn test_wrapping() {
        let mut out = String::new();
        push_wrapped(&mut out, "description: abcdefghij", 10);
        assert_eq!(out, "descriptio\n n: abcdef\n ghij\n");
        assert_eq!(unfold(&out)[0].1, "description: abcdefghij");
    }

    #[test]
    fn test_export_config() {
        let schema = schema();
        let entry = Entry::from_ldif(&schema, BJENSEN).unwrap();
        let config = LdifExportConfig::default()
            .exclude_attribute(schema.attribute_type("description").unwrap())
            .with_types_only(true);
        let mut out = Vec::new();
        assert!(entry.write_ldif(&mut out, &schema, &config).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "dn: uid=bjensen,dc=example,dc=com\nobjectClass:\ncn:\nsn:\n\n"
        );

        let config = LdifExportConfig::default()
            .include_filter(SearchFilter::parse("(cn=nobody)", &schema).unwrap());
        let mut out = Vec::new();
        assert!(!entry.write_ldif(&mut out, &schema, &config).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn test_suppressed_attributes_restored_on_export() {
        let schema = schema();
        let mut entry = Entry::from_ldif(&schema, BJENSEN).unwrap();
        let rule = VirtualAttributeRule::new(
            schema.attribute_type("description").unwrap(),
            Arc::new(UserDefinedProvider::new(["virtual"])),
        )
        .with_conflict_behavior(ConflictBehavior::VirtualOverridesReal);
        entry.process_virtual_attributes(&schema, &[rule], false);

        let mut out = Vec::new();
        entry.write_ldif(&mut out, &schema, &LdifExportConfig::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("description:: w6ljcml0"));
        assert!(!text.contains("description: virtual"));

        let mut out = Vec::new();
        entry
            .write_ldif(&mut out, &schema, &LdifExportConfig::default().with_virtual_attributes(true))
            .unwrap();
        assert!(String::from_utf8(out).unwrap().contains("description: virtual"));
    }

    #[derive(Debug)]
    struct Veto;

    impl LdifExportPlugin for Veto {
        fn process_export(&self, entry: &Entry) -> ExportDecision {
            ExportDecision::Abort(format!("{} is private", entry.dn()))
        }
    }

    #[test]
    fn test_plugin_abort() {
        let schema = schema();
        let entry = Entry::from_ldif(&schema, BJENSEN).unwrap();
        let config = LdifExportConfig::default().with_plugin(Arc::new(Veto));
        let mut out = Vec::new();
        assert!(matches!(
            entry.write_ldif(&mut out, &schema, &config),
            Err(LdifError::Plugin { .. })
        ));
    }
}
