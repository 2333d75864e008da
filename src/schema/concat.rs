//! Schema LDIF files and the concatenated schema snapshot.
//!
//! Schema files are single-entry LDIF documents whose `attributeTypes`,
//! `objectClasses`, `nameForms`, `dITContentRules`, `dITStructureRules`
//! and `matchingRuleUse` values hold RFC 4512 definitions. The
//! concatenated snapshot gathers every such value, tagged with the file it
//! came from, into `upgrade/schema.ldif.current` so that schema edits made
//! while the server was offline can be detected at the next start.

use super::definition::with_schema_file;
use super::registry::{DefinitionKind, Schema};
use super::types::SchemaElement;
use crate::entry::ldif::{split_line, unfold};
use crate::entry::{Attribute, AttributeValue, Modification};
use crate::error::{SchemaError, SchemaResult};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the configuration root holding upgrade state.
pub const UPGRADE_DIRECTORY: &str = "upgrade";
/// File name of the concatenated schema snapshot.
pub const CONCATENATED_SCHEMA_FILE: &str = "schema.ldif.current";

/// Definitions from one schema file, in file order.
pub fn parse_schema_ldif(file_name: &str, contents: &str) -> SchemaResult<Vec<(DefinitionKind, String)>> {
    let mut definitions = Vec::new();
    for (number, line) in unfold(contents) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        let (name, value) = split_line(number, &line)
            .map_err(|e| SchemaError::malformed(format!("{file_name}:{number}"), e.to_string()))?;
        let Some(kind) = DefinitionKind::from_attribute_name(name) else {
            continue;
        };
        let value = String::from_utf8(value).map_err(|_| {
            SchemaError::malformed(format!("{file_name}:{number}"), "definition is not valid UTF-8")
        })?;
        definitions.push((kind, value.trim().to_string()));
    }
    Ok(definitions)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// LDIF schema files in `directory`, sorted by name.
pub fn schema_files(directory: &Path) -> SchemaResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir_entry in fs::read_dir(directory)? {
        let path = dir_entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("ldif") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl Schema {
    /// Register every definition of an LDIF schema file, tagging each with
    /// `X-SCHEMA-FILE`. Kinds load in dependency order. Returns the number
    /// of definitions registered.
    pub fn load_schema_file(&self, path: &Path, overwrite: bool) -> SchemaResult<usize> {
        let file_name = file_name_of(path);
        let contents = fs::read_to_string(path)?;
        let definitions = parse_schema_ldif(&file_name, &contents)?;
        let mut registered = 0;
        for kind in DefinitionKind::load_order() {
            for (_, definition) in definitions.iter().filter(|(k, _)| *k == kind) {
                self.register_definition(kind, &with_schema_file(definition, &file_name), overwrite)?;
                registered += 1;
            }
        }
        debug!("Loaded {registered} definitions from {}", path.display());
        Ok(registered)
    }
}

/// Whitespace- and case-insensitive comparison key for a definition.
fn definition_key(definition: &str) -> String {
    definition
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Every schema definition value, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatenatedSchema {
    sets: Vec<(DefinitionKind, BTreeMap<String, String>)>,
}

impl Default for ConcatenatedSchema {
    fn default() -> Self {
        Self {
            sets: DefinitionKind::load_order()
                .into_iter()
                .map(|kind| (kind, BTreeMap::new()))
                .collect(),
        }
    }
}

impl ConcatenatedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, kind: DefinitionKind) -> &mut BTreeMap<String, String> {
        let index = DefinitionKind::load_order()
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        &mut self.sets[index].1
    }

    fn set(&self, kind: DefinitionKind) -> Option<&BTreeMap<String, String>> {
        self.sets.iter().find(|(k, _)| *k == kind).map(|(_, set)| set)
    }

    /// Add a definition; returns false if an equivalent one is present.
    pub fn insert(&mut self, kind: DefinitionKind, definition: &str) -> bool {
        let key = definition_key(definition);
        let set = self.set_mut(kind);
        if set.contains_key(&key) {
            return false;
        }
        set.insert(key, definition.trim().to_string());
        true
    }

    pub fn definitions(&self, kind: DefinitionKind) -> impl Iterator<Item = &str> {
        self.set(kind)
            .into_iter()
            .flat_map(|set| set.values().map(String::as_str))
    }

    pub fn contains(&self, kind: DefinitionKind, definition: &str) -> bool {
        self.set(kind)
            .is_some_and(|set| set.contains_key(&definition_key(definition)))
    }

    pub fn len(&self) -> usize {
        self.sets.iter().map(|(_, set)| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The definitions currently registered in `schema`.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut concatenated = Self::new();
        for element in schema.attribute_types() {
            concatenated.insert(DefinitionKind::AttributeType, element.definition());
        }
        for element in schema.object_classes() {
            concatenated.insert(DefinitionKind::ObjectClass, element.definition());
        }
        for element in schema.name_forms() {
            concatenated.insert(DefinitionKind::NameForm, element.definition());
        }
        for element in schema.dit_content_rules() {
            concatenated.insert(DefinitionKind::DitContentRule, element.definition());
        }
        for element in schema.dit_structure_rules() {
            concatenated.insert(DefinitionKind::DitStructureRule, element.definition());
        }
        for element in schema.matching_rule_uses() {
            concatenated.insert(DefinitionKind::MatchingRuleUse, element.definition());
        }
        concatenated
    }

    /// Gather the definitions of every LDIF file in a schema directory,
    /// appending `X-SCHEMA-FILE '<file>'` to each.
    pub fn from_schema_directory(directory: &Path) -> SchemaResult<Self> {
        let mut concatenated = Self::new();
        for path in schema_files(directory)? {
            let file_name = file_name_of(&path);
            let contents = fs::read_to_string(&path)?;
            for (kind, definition) in parse_schema_ldif(&file_name, &contents)? {
                concatenated.insert(kind, &with_schema_file(&definition, &file_name));
            }
        }
        debug!(
            "Concatenated {} schema definitions from {}",
            concatenated.len(),
            directory.display()
        );
        Ok(concatenated)
    }

    /// The snapshot as a single subschema LDIF entry.
    pub fn to_ldif(&self) -> String {
        let mut out = String::from(
            "dn: cn=schema\nobjectClass: top\nobjectClass: ldapSubentry\nobjectClass: subschema\ncn: schema\n",
        );
        for (kind, set) in &self.sets {
            for definition in set.values() {
                out.push_str(kind.attribute_name());
                out.push_str(": ");
                out.push_str(definition);
                out.push('\n');
            }
        }
        out
    }

    /// Path of the snapshot beneath a configuration directory.
    pub fn path_in(config_directory: &Path) -> PathBuf {
        config_directory
            .join(UPGRADE_DIRECTORY)
            .join(CONCATENATED_SCHEMA_FILE)
    }

    /// Write the snapshot to `<config>/upgrade/schema.ldif.current` through
    /// a temporary file renamed into place.
    pub fn write(&self, config_directory: &Path) -> SchemaResult<PathBuf> {
        let path = Self::path_in(config_directory);
        let directory = config_directory.join(UPGRADE_DIRECTORY);
        fs::create_dir_all(&directory)?;
        let temporary = directory.join(format!("{CONCATENATED_SCHEMA_FILE}.tmp"));
        fs::write(&temporary, self.to_ldif())?;
        fs::rename(&temporary, &path)?;
        info!("Wrote concatenated schema to {}", path.display());
        Ok(path)
    }

    /// Read a snapshot written by [`ConcatenatedSchema::write`].
    pub fn read(path: &Path) -> SchemaResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut concatenated = Self::new();
        for (kind, definition) in parse_schema_ldif(&file_name_of(path), &contents)? {
            concatenated.insert(kind, &definition);
        }
        Ok(concatenated)
    }

    /// Modifications turning `self` into `newer`: for each kind, a DELETE of
    /// the definitions only `self` has and an ADD of those only `newer` has.
    pub fn compare(&self, newer: &ConcatenatedSchema, schema: &Schema) -> Vec<Modification> {
        let mut modifications = Vec::new();
        for kind in DefinitionKind::load_order() {
            let empty = BTreeMap::new();
            let old = self.set(kind).unwrap_or(&empty);
            let new = newer.set(kind).unwrap_or(&empty);
            let attribute_type = schema.attribute_type_or_default(kind.attribute_name());

            let removed: Vec<AttributeValue> = old
                .iter()
                .filter(|(key, _)| !new.contains_key(*key))
                .map(|(_, definition)| AttributeValue::from(definition.as_str()))
                .collect();
            if !removed.is_empty() {
                modifications.push(Modification::delete(Attribute::new(attribute_type.clone(), removed)));
            }

            let added: Vec<AttributeValue> = new
                .iter()
                .filter(|(key, _)| !old.contains_key(*key))
                .map(|(_, definition)| AttributeValue::from(definition.as_str()))
                .collect();
            if !added.is_empty() {
                modifications.push(Modification::add(Attribute::new(attribute_type, added)));
            }
        }
        modifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ModificationType;

    const CUSTOM_SCHEMA: &str = "\
# Example custom schema
dn: cn=schema
objectClass: top
objectClass: ldapSubentry
objectClass: subschema
attributeTypes: ( 1.3.6.1.4.1.99999.1.1 NAME 'exampleColor'
  EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )
objectClasses: ( 1.3.6.1.4.1.99999.2.1 NAME 'exampleThing' SUP top STRUCTURAL
  MUST cn MAY exampleColor )
";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dirsrv-concat-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_schema_ldif() {
        let definitions = parse_schema_ldif("99-user.ldif", CUSTOM_SCHEMA).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].0, DefinitionKind::AttributeType);
        assert!(definitions[0].1.contains("EQUALITY caseIgnoreMatch"));
        assert_eq!(definitions[1].0, DefinitionKind::ObjectClass);
    }

    #[test]
    fn test_load_schema_file_tags_source() {
        let dir = scratch_dir("load");
        let path = dir.join("99-user.ldif");
        fs::write(&path, CUSTOM_SCHEMA).unwrap();

        let schema = Schema::with_core_schema().unwrap();
        assert_eq!(schema.load_schema_file(&path, false).unwrap(), 2);
        let color = schema.attribute_type("exampleColor").unwrap();
        assert_eq!(color.schema_file(), Some("99-user.ldif"));
        assert!(schema.object_class("exampleThing").unwrap().is_optional(&color));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_read_and_compare() {
        let schema_dir = scratch_dir("gen");
        fs::write(schema_dir.join("99-user.ldif"), CUSTOM_SCHEMA).unwrap();
        let generated = ConcatenatedSchema::from_schema_directory(&schema_dir).unwrap();
        assert_eq!(generated.len(), 2);
        assert!(generated
            .definitions(DefinitionKind::AttributeType)
            .all(|d| d.contains("X-SCHEMA-FILE '99-user.ldif'")));

        let config_dir = scratch_dir("config");
        let path = generated.write(&config_dir).unwrap();
        assert_eq!(path, ConcatenatedSchema::path_in(&config_dir));
        assert!(!path.with_file_name(format!("{CONCATENATED_SCHEMA_FILE}.tmp")).exists());
        let read = ConcatenatedSchema::read(&path).unwrap();
        assert_eq!(read, generated);

        let schema = Schema::with_core_schema().unwrap();
        assert!(read.compare(&generated, &schema).is_empty());

        let mut edited = generated.clone();
        edited.insert(
            DefinitionKind::AttributeType,
            "( 1.3.6.1.4.1.99999.1.2 NAME 'exampleSize' SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 X-SCHEMA-FILE '99-user.ldif' )",
        );
        let removed = generated.definitions(DefinitionKind::ObjectClass).next().unwrap().to_string();
        let mut pruned = ConcatenatedSchema::new();
        for kind in DefinitionKind::load_order() {
            for definition in edited.definitions(kind) {
                if definition != removed {
                    pruned.insert(kind, definition);
                }
            }
        }

        let modifications = read.compare(&pruned, &schema);
        assert_eq!(modifications.len(), 2);
        assert_eq!(modifications[0].kind(), ModificationType::Add);
        assert_eq!(modifications[0].attribute().name(), "attributeTypes");
        assert_eq!(modifications[1].kind(), ModificationType::Delete);
        assert_eq!(modifications[1].attribute().values()[0].to_string_lossy(), removed);

        fs::remove_dir_all(schema_dir).unwrap();
        fs::remove_dir_all(config_dir).unwrap();
    }

    #[test]
    fn test_equivalent_definitions_collapse() {
        let mut concatenated = ConcatenatedSchema::new();
        assert!(concatenated.insert(DefinitionKind::AttributeType, "( 1.2.3 NAME 'x' )"));
        assert!(!concatenated.insert(DefinitionKind::AttributeType, "(  1.2.3   name 'X' )"));
        assert!(concatenated.contains(DefinitionKind::AttributeType, "( 1.2.3 NAME 'x' )"));
        assert_eq!(concatenated.len(), 1);
    }

    #[test]
    fn test_from_schema_covers_core_elements() {
        let schema = Schema::with_core_schema().unwrap();
        let concatenated = ConcatenatedSchema::from_schema(&schema);
        assert_eq!(
            concatenated.definitions(DefinitionKind::AttributeType).count(),
            schema.attribute_types().len()
        );
        assert!(concatenated.to_ldif().starts_with("dn: cn=schema\n"));
    }
}
