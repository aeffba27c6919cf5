//! Layout descriptor JSON, read back by `parser::load_layout_from_json`.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::model::{LayoutDescriptor, LayoutDescriptorEntry};
use crate::processor::layout::VariableLayout;

pub fn descriptor(layout: &VariableLayout) -> LayoutDescriptor {
    LayoutDescriptor {
        entries: layout
            .entries()
            .iter()
            .map(|entry| LayoutDescriptorEntry {
                name: entry.name.clone(),
                type_name: entry.type_name.clone(),
                offset: entry.bit_offset,
                bit_size: entry.bit_size,
                initial_value: encode_hex(&entry.default),
            })
            .collect(),
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub fn to_json(layout: &VariableLayout) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&descriptor(layout))
}

pub fn emit(layout: &VariableLayout, out: &Path) -> io::Result<()> {
    fs::write(out, to_json(layout)?)?;
    info!(file = %out.display(), variables = layout.entries().len(), "wrote layout descriptor");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Source;
    use crate::processor::layout::{self, BuiltinTypes};
    use crate::processor::script_parser::parse;

    #[test]
    fn test_descriptor_fields() {
        let source = Source::new("scene n: i16 = 258; scene on: bool = true;", "test");
        let program = parse(&source).expect("parses");
        let layout = layout::build(&program.scene, &source, &BuiltinTypes).expect("layout");

        let json: serde_json::Value =
            serde_json::from_str(&to_json(&layout).expect("serialises")).expect("valid json");
        assert_eq!(
            json,
            serde_json::json!({
                "entries": [
                    {"name": "on", "type": "bool", "offset": 0, "bitSize": 1, "initialValue": "01"},
                    {"name": "n", "type": "i16", "offset": 16, "bitSize": 16, "initialValue": "0102"},
                ]
            })
        );
    }
}
