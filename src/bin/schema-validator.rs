//! # Schema Validator
//!
//! A command-line utility for checking RFC 4512 LDIF schema files before
//! they are dropped into a directory server's schema directory.
//!
//! ## Overview
//!
//! Every `attributeTypes`, `objectClasses`, `nameForms`, `dITContentRules`,
//! `dITStructureRules` and `matchingRuleUse` value is parsed and registered
//! against a copy of the core schema, so unknown superiors, unknown
//! matching rules, malformed definitions and OID or name conflicts are all
//! reported the way the server would report them at startup.
//!
//! ## Usage
//!
//! ### Validate a Single Schema File
//!
//! ```bash
//! cargo run --bin schema-validator config/schema/99-user.ldif
//! ```
//!
//! ### Validate All Schema Files in a Directory
//!
//! ```bash
//! cargo run --bin schema-validator config/schema/
//! ```
//!
//! Files in a directory are loaded in name order into one shared schema,
//! so later files may reference elements from earlier ones.
//!
//! ## Output Examples
//!
//! ```text
//! Validating schema file: config/schema/99-user.ldif
//! ✓ Schema file is valid!
//!
//! Schema File Summary:
//!   Attribute types: 1
//!   Object classes: 1
//! ```
//!
//! ```text
//! Validating schema file: broken.ldif
//! ❌ Schema validation failed: Unknown attribute type 'missing' referenced by 'exampleThing'
//! ```
//!
//! ## Exit Codes
//!
//! - `0`: All schema files are valid
//! - `1`: One or more files are invalid or could not be read

use dirsrv_core::schema::concat::{parse_schema_ldif, schema_files};
use dirsrv_core::schema::{DefinitionKind, Schema};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <schema-file-or-directory>", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  {} config/schema/99-user.ldif", args[0]);
        eprintln!("  {} config/schema/", args[0]);
        process::exit(1);
    }

    let path = Path::new(&args[1]);
    let schema = match Schema::with_core_schema() {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("❌ Cannot build the core schema: {e}");
            process::exit(1);
        }
    };

    if path.is_file() {
        validate_single_file(&schema, path);
    } else if path.is_dir() {
        validate_directory(&schema, path);
    } else {
        eprintln!("Error: '{}' is not a valid file or directory", path.display());
        process::exit(1);
    }
}

fn validate_single_file(schema: &Schema, file_path: &Path) {
    println!("Validating schema file: {}", file_path.display());

    match load_and_validate(schema, file_path) {
        Ok(counts) => {
            println!("✓ Schema file is valid!");
            print_summary(&counts);
        }
        Err(e) => {
            eprintln!("❌ Schema validation failed: {e}");
            process::exit(1);
        }
    }
}

fn validate_directory(schema: &Schema, dir_path: &Path) {
    println!("Validating schema files in directory: {}", dir_path.display());

    let files = match schema_files(dir_path) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error reading directory: {e}");
            process::exit(1);
        }
    };

    let mut valid_count = 0;
    let mut error_count = 0;
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("\nValidating: {name}");
        match load_and_validate(schema, &path) {
            Ok(counts) => {
                let total: usize = counts.iter().map(|(_, n)| n).sum();
                println!("  ✓ Valid - {total} definitions");
                valid_count += 1;
            }
            Err(e) => {
                eprintln!("  ❌ Invalid - {e}");
                error_count += 1;
            }
        }
    }

    println!("\nValidation Summary:");
    println!("  Valid files: {valid_count}");
    println!("  Invalid files: {error_count}");
    println!("  Attribute types registered: {}", schema.attribute_types().len());
    println!("  Object classes registered: {}", schema.object_classes().len());

    if error_count > 0 {
        process::exit(1);
    }
}

/// Register the file's definitions and count them per kind.
fn load_and_validate(
    schema: &Schema,
    file_path: &Path,
) -> Result<Vec<(DefinitionKind, usize)>, Box<dyn std::error::Error>> {
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content = fs::read_to_string(file_path)?;
    let definitions = parse_schema_ldif(&file_name, &content)?;
    if definitions.is_empty() {
        return Err("File contains no schema definitions".into());
    }

    schema.load_schema_file(file_path, false)?;

    Ok(DefinitionKind::load_order()
        .into_iter()
        .map(|kind| (kind, definitions.iter().filter(|(k, _)| *k == kind).count()))
        .filter(|(_, count)| *count > 0)
        .collect())
}

fn print_summary(counts: &[(DefinitionKind, usize)]) {
    println!();
    println!("Schema File Summary:");
    for (kind, count) in counts {
        let label = match kind {
            DefinitionKind::AttributeType => "Attribute types",
            DefinitionKind::ObjectClass => "Object classes",
            DefinitionKind::NameForm => "Name forms",
            DefinitionKind::DitContentRule => "DIT content rules",
            DefinitionKind::DitStructureRule => "DIT structure rules",
            DefinitionKind::MatchingRuleUse => "Matching rule uses",
        };
        println!("  {label}: {count}");
    }
}
