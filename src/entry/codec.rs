//! Binary entry encoding.
//!
//! Two versions share one layout. Version 1:
//!
//! ```text
//! 0x01 | dn | object classes | user attributes | operational attributes
//! ```
//!
//! Version 2 inserts a length-prefixed configuration block after the version
//! byte whose first byte holds the [`EntryEncodeConfig`] flags. Depending on
//! those flags the DN is omitted, the object class list becomes one token and
//! attribute descriptions become tokens from a [`CompressedSchema`].
//!
//! Lengths and counts use the BER length form: values up to 127 take one
//! byte, larger values a `0x80 | n` byte followed by `n` big-endian bytes.
//! Virtual attributes and attributes without values are never written.

use super::attribute::{Attribute, AttributeBuilder, split_options};
use super::compressed::CompressedSchema;
use super::entry::Entry;
use crate::config::EntryEncodeConfig;
use crate::dn::Dn;
use crate::error::{CodecFault, DecodeError, DecodeResult};
use crate::schema::Schema;
use log::trace;
use std::collections::BTreeSet;

pub const ENCODING_VERSION_1: u8 = 0x01;
pub const ENCODING_VERSION_2: u8 = 0x02;

type CodecResult<T> = Result<T, CodecFault>;

/// Append `value` in BER length form.
pub fn write_length(out: &mut Vec<u8>, value: usize) {
    if value <= 0x7f {
        out.push(value as u8);
        return;
    }
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_length(out, bytes.len());
    out.extend_from_slice(bytes);
}

/// Cursor over an encoded entry.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> CodecResult<&'a [u8]> {
        if needed > self.remaining() {
            return Err(CodecFault::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_length(&mut self) -> CodecResult<usize> {
        let start = self.offset;
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return Err(CodecFault::InvalidLength { offset: start });
        }
        Ok(self
            .take(count)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize))
    }

    fn read_token(&mut self) -> CodecResult<u32> {
        let start = self.offset;
        let value = self.read_length()?;
        u32::try_from(value).map_err(|_| CodecFault::InvalidLength { offset: start })
    }

    fn read_prefixed(&mut self) -> CodecResult<&'a [u8]> {
        let length = self.read_length()?;
        self.take(length)
    }

    fn read_str(&mut self, length: usize) -> CodecResult<&'a str> {
        let start = self.offset;
        let bytes = self.take(length)?;
        std::str::from_utf8(bytes).map_err(|_| CodecFault::InvalidUtf8 { offset: start })
    }

    fn read_zero_terminated(&mut self) -> CodecResult<&'a str> {
        let start = self.offset;
        let end = self.bytes[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(CodecFault::Unterminated { offset: start })?;
        let text = self.read_str(end)?;
        self.offset += 1;
        Ok(text)
    }

    fn finish(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(CodecFault::TrailingBytes { count }),
        }
    }
}

/// Attributes that are written: stored, real and value-bearing.
fn persisted<'a>(attributes: impl Iterator<Item = &'a Attribute>) -> Vec<&'a Attribute> {
    attributes
        .filter(|a| !a.is_virtual() && !a.is_empty())
        .collect()
}

impl Entry {
    /// Encode with the given configuration in the current (V2) format.
    pub fn encode(&self, config: EntryEncodeConfig, compressed: &CompressedSchema) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(ENCODING_VERSION_2);
        write_bytes(&mut out, &[config.to_flags()]);

        if !config.exclude_dn {
            write_bytes(&mut out, self.dn().to_string().as_bytes());
        }

        let names: Vec<String> = self.object_class_names().map(str::to_string).collect();
        if config.compress_object_class_sets {
            write_length(&mut out, compressed.encode_object_classes(&names) as usize);
        } else {
            write_object_classes(&mut out, &names);
        }

        let user = persisted(self.user_attributes().attributes());
        let operational = persisted(self.operational_attributes().attributes());
        for block in [user, operational] {
            write_length(&mut out, block.len());
            for attribute in block {
                if config.compress_attribute_descriptions {
                    write_compressed_attribute(&mut out, attribute, compressed);
                } else {
                    write_attribute(&mut out, attribute);
                }
            }
        }
        trace!("Encoded {} as {} byte(s) (V2)", self.dn(), out.len());
        out
    }

    /// Encode in the original V1 format: DN always present, no compression.
    pub fn encode_v1(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(ENCODING_VERSION_1);
        write_bytes(&mut out, self.dn().to_string().as_bytes());

        let names: Vec<String> = self.object_class_names().map(str::to_string).collect();
        write_object_classes(&mut out, &names);

        let user = persisted(self.user_attributes().attributes());
        let operational = persisted(self.operational_attributes().attributes());
        for block in [user, operational] {
            write_length(&mut out, block.len());
            for attribute in block {
                write_attribute(&mut out, attribute);
            }
        }
        out
    }

    /// Decode either version, dispatching on the leading byte.
    pub fn decode(bytes: &[u8], schema: &Schema, compressed: &CompressedSchema) -> DecodeResult<Entry> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_u8()?;
        let config = match version {
            ENCODING_VERSION_1 => EntryEncodeConfig::default(),
            ENCODING_VERSION_2 => {
                let block = reader.read_prefixed()?;
                EntryEncodeConfig::from_flags(block.first().copied().unwrap_or_default())
            }
            other => return Err(DecodeError::UnrecognizedVersion(other)),
        };

        let entry = decode_body(&mut reader, config, schema, compressed)?;
        reader.finish()?;
        trace!("Decoded {} from {} byte(s) (V{version})", entry.dn(), bytes.len());
        Ok(entry)
    }
}

fn write_object_classes(out: &mut Vec<u8>, names: &[String]) {
    let joined = names.join("\0");
    write_bytes(out, joined.as_bytes());
}

fn write_values(out: &mut Vec<u8>, attribute: &Attribute) {
    write_length(out, attribute.len());
    for value in attribute.values() {
        write_bytes(out, value.as_bytes());
    }
}

fn write_attribute(out: &mut Vec<u8>, attribute: &Attribute) {
    out.extend_from_slice(attribute.name_with_options().as_bytes());
    out.push(0);
    write_values(out, attribute);
}

fn write_compressed_attribute(out: &mut Vec<u8>, attribute: &Attribute, compressed: &CompressedSchema) {
    let token = compressed.encode_attribute_description(attribute.name(), attribute.options());
    let mut record = Vec::new();
    write_length(&mut record, token as usize);
    write_values(&mut record, attribute);
    write_bytes(out, &record);
}

fn decode_body(
    reader: &mut Reader<'_>,
    config: EntryEncodeConfig,
    schema: &Schema,
    compressed: &CompressedSchema,
) -> CodecResult<Entry> {
    let dn = if config.exclude_dn {
        Dn::null()
    } else {
        let length = reader.read_length()?;
        Dn::parse(reader.read_str(length)?)?
    };
    let mut entry = Entry::new(dn);

    let names = if config.compress_object_class_sets {
        let token = reader.read_token()?;
        compressed
            .decode_object_classes(token)
            .ok_or(CodecFault::UnknownToken { token })?
    } else {
        let length = reader.read_length()?;
        let joined = reader.read_str(length)?;
        joined
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    };
    entry.set_object_classes(
        names
            .into_iter()
            .map(|name| (schema.object_class_or_default(&name), name)),
    );

    for _block in 0..2 {
        let count = reader.read_length()?;
        for _ in 0..count {
            let attribute = if config.compress_attribute_descriptions {
                let record = reader.read_prefixed()?;
                let mut record_reader = Reader::new(record);
                let token = record_reader.read_token()?;
                let (name, options) = compressed
                    .decode_attribute_description(token)
                    .ok_or(CodecFault::UnknownToken { token })?;
                let attribute = read_values(&mut record_reader, schema, &name, options)?;
                record_reader.finish()?;
                attribute
            } else {
                let description = reader.read_zero_terminated()?;
                let (name, options) = split_options(description);
                read_values(reader, schema, name, options)?
            };
            entry
                .partition_mut(attribute.attribute_type())
                .push(attribute);
        }
    }
    Ok(entry)
}

fn read_values(
    reader: &mut Reader<'_>,
    schema: &Schema,
    name: &str,
    options: BTreeSet<String>,
) -> CodecResult<Attribute> {
    let mut builder = AttributeBuilder::new(schema.attribute_type_or_default(name))
        .name(name)
        .options(options);
    let count = reader.read_length()?;
    for _ in 0..count {
        builder.add(reader.read_prefixed()?);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AttributeValue;

    fn schema() -> Schema {
        Schema::with_core_schema().unwrap()
    }

    fn sample(schema: &Schema) -> Entry {
        let mut entry = Entry::with_object_classes(
            Dn::parse("uid=bjensen,dc=example,dc=com").unwrap(),
            schema,
            &["top", "person", "organizationalPerson", "inetOrgPerson"],
        );
        let mut duplicates = Vec::new();
        for (name, values) in [
            ("cn", vec!["Babs Jensen", "Barbara Jensen"]),
            ("sn", vec!["Jensen"]),
            ("uid", vec!["bjensen"]),
            ("createTimestamp", vec!["20240101000000Z"]),
        ] {
            entry.add_attribute(
                schema,
                Attribute::new(schema.attribute_type_or_default(name), values),
                &mut duplicates,
            );
        }
        entry.add_attribute(
            schema,
            AttributeBuilder::from_description("description;lang-fr", schema)
                .value(vec![0u8, 200, 255])
                .build(),
            &mut duplicates,
        );
        entry
    }

    #[test]
    fn test_ber_lengths() {
        let mut out = Vec::new();
        write_length(&mut out, 0x7f);
        write_length(&mut out, 0x80);
        write_length(&mut out, 0x1234);
        assert_eq!(out, vec![0x7f, 0x81, 0x80, 0x82, 0x12, 0x34]);

        let mut reader = Reader::new(&out);
        assert_eq!(reader.read_length().unwrap(), 0x7f);
        assert_eq!(reader.read_length().unwrap(), 0x80);
        assert_eq!(reader.read_length().unwrap(), 0x1234);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_v1_layout() {
        let schema = schema();
        let entry = Entry::with_object_classes(Dn::parse("dc=com").unwrap(), &schema, &["top", "domain"]);
        let bytes = entry.encode_v1();
        let mut expected = vec![0x01, 6];
        expected.extend_from_slice(b"dc=com");
        expected.push(10);
        expected.extend_from_slice(b"top\0domain");
        expected.extend_from_slice(&[0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_all_flag_combinations_decode() {
        let schema = schema();
        let compressed = CompressedSchema::new();
        let entry = sample(&schema);
        for flags in 0u8..8 {
            let config = EntryEncodeConfig::from_flags(flags);
            let decoded = Entry::decode(&entry.encode(config, &compressed), &schema, &compressed).unwrap();
            if config.exclude_dn {
                assert!(decoded.dn().is_null());
                let mut with_dn = decoded.clone();
                with_dn.set_dn(entry.dn().clone());
                assert_eq!(with_dn, entry, "flags {flags:#04x}");
            } else {
                assert_eq!(decoded, entry, "flags {flags:#04x}");
            }
        }
        assert_eq!(Entry::decode(&entry.encode_v1(), &schema, &compressed).unwrap(), entry);
    }

    #[test]
    fn test_virtual_and_empty_attributes_are_skipped() {
        let schema = schema();
        let compressed = CompressedSchema::new();
        let mut entry = sample(&schema);
        let expected = entry.clone();
        let mut duplicates = Vec::new();
        entry.add_attribute(
            &schema,
            AttributeBuilder::new(schema.attribute_type_or_default("title"))
                .set_virtual(true)
                .value("Computed")
                .build(),
            &mut duplicates,
        );
        entry.add_attribute(&schema, Attribute::empty(schema.attribute_type_or_default("l")), &mut duplicates);
        let decoded = Entry::decode(&entry.encode(EntryEncodeConfig::default(), &compressed), &schema, &compressed).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_decode_errors() {
        let schema = schema();
        let compressed = CompressedSchema::new();
        assert!(matches!(
            Entry::decode(&[0x07, 0x00], &schema, &compressed),
            Err(DecodeError::UnrecognizedVersion(0x07))
        ));
        assert!(matches!(
            Entry::decode(&[], &schema, &compressed),
            Err(DecodeError::Malformed(CodecFault::Truncated { .. }))
        ));

        let mut bytes = sample(&schema).encode_v1();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Entry::decode(&bytes, &schema, &compressed), Err(DecodeError::Malformed(_))));

        let compressed_bytes = sample(&schema).encode(EntryEncodeConfig::compressed(), &compressed);
        let fresh = CompressedSchema::new();
        assert!(matches!(
            Entry::decode(&compressed_bytes, &schema, &fresh),
            Err(DecodeError::Malformed(CodecFault::UnknownToken { .. }))
        ));
    }

    #[test]
    fn test_binary_values_survive() {
        let schema = schema();
        let compressed = CompressedSchema::new();
        let decoded = Entry::decode(&sample(&schema).encode_v1(), &schema, &compressed).unwrap();
        let description = schema.attribute_type("description").unwrap();
        let found = decoded.get_attribute(&description);
        assert_eq!(found.len(), 1);
        assert!(found[0].has_option("lang-fr"));
        assert_eq!(found[0].values(), &[AttributeValue::new(vec![0u8, 200, 255])]);
    }
}
