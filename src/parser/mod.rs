//! Component 1 – input loading.
//!
//! Script sources, the pre-built global layout descriptor and the
//! definitions header all come through here.
pub mod header;

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::model::{LayoutDescriptor, LayoutDescriptorEntry};
use crate::processor::Source;
use crate::processor::layout::{LayoutEntry, StorageType, TypeSchema, VariableLayout};
use crate::processor::script_parser::parse_type;

pub use header::HeaderDefinitions;

/// Reads one script file; the path becomes the diagnostics file name.
pub fn load_source(path: &Path) -> Result<Source> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Reading {}", path.display()))?;
    debug!(file = %path.display(), bytes = content.len(), "loaded script");
    Ok(Source::new(content, path.display().to_string()))
}

pub fn load_definitions(path: &Path) -> Result<HeaderDefinitions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Reading {}", path.display()))?;
    HeaderDefinitions::parse(&content)
        .with_context(|| format!("Parsing definitions in {}", path.display()))
}

/// Parses a layout descriptor JSON string back into a layout.
pub fn load_layout_from_json(json: &str, schema: &dyn TypeSchema) -> Result<VariableLayout> {
    let descriptor: LayoutDescriptor = serde_json::from_str(json)?;
    debug!(entries = descriptor.entries.len(), "parsed layout descriptor");
    layout_from_descriptor(&descriptor, schema)
}

pub fn layout_from_descriptor(
    descriptor: &LayoutDescriptor,
    schema: &dyn TypeSchema,
) -> Result<VariableLayout> {
    let entries = descriptor
        .entries
        .iter()
        .map(|entry| {
            entry_from_descriptor(entry, schema)
                .with_context(|| format!("Variable `{}` in layout descriptor", entry.name))
        })
        .collect::<Result<Vec<_>>>()?;

    VariableLayout::from_entries(entries).map_err(|e| anyhow!(e))
}

fn entry_from_descriptor(
    entry: &LayoutDescriptorEntry,
    schema: &dyn TypeSchema,
) -> Result<LayoutEntry> {
    let data_type = parse_type(&entry.type_name)?;
    let storage = StorageType::resolve(&data_type.name.name, schema)
        .ok_or_else(|| anyhow!("invalid type {}", entry.type_name))?;

    let Some(expected_size) = storage.bit_size().checked_mul(data_type.count.unwrap_or(1)) else {
        bail!("array {} too large", entry.type_name);
    };
    if entry.bit_size != expected_size {
        bail!(
            "bitSize {} does not match type {} ({} bits)",
            entry.bit_size,
            entry.type_name,
            expected_size
        );
    }

    Ok(LayoutEntry {
        name: entry.name.clone(),
        type_name: data_type.to_string(),
        storage,
        count: data_type.count,
        bit_offset: entry.offset,
        bit_size: entry.bit_size,
        default: decode_hex(&entry.initial_value)?,
    })
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        bail!("initialValue `{}` has an odd number of digits", text);
    }

    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("initialValue `{}` is not hex", text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::layout::BuiltinTypes;

    #[test]
    fn test_decode_hex() {
        let test_cases = vec![
            ("", Some(vec![])),
            ("00ff", Some(vec![0, 255])),
            ("0A1b", Some(vec![10, 27])),
            ("abc", None),
            ("zz", None),
        ];

        for (text, expected) in test_cases {
            assert_eq!(decode_hex(text).ok(), expected, "hex {text}");
        }
    }

    #[test]
    fn test_descriptor_errors() {
        let test_cases = vec![
            (
                r#"{"entries":[{"name":"a","type":"u64","offset":0,"bitSize":64,"initialValue":""}]}"#,
                "invalid type u64",
            ),
            (
                r#"{"entries":[{"name":"a","type":"i32","offset":0,"bitSize":16,"initialValue":""}]}"#,
                "bitSize 16 does not match type i32",
            ),
            (
                r#"{"entries":[{"name":"a","type":"i16","offset":8,"bitSize":16,"initialValue":"0000"}]}"#,
                "not aligned",
            ),
            (
                r#"{"entries":[{"name":"a","type":"char[600000000]","offset":0,"bitSize":0,"initialValue":""}]}"#,
                "array char[600000000] too large",
            ),
            (
                r#"{"entries":[{"name":"a","type":"i32[100000000]","offset":3200000000,"bitSize":3200000000,"initialValue":""}]}"#,
                "does not fit in the layout",
            ),
        ];

        for (json, message) in test_cases {
            let err = load_layout_from_json(json, &BuiltinTypes).unwrap_err();
            assert!(format!("{err:#}").contains(message), "{err:#} should contain {message}");
        }
    }
}
