use serde::{Deserialize, Serialize};

use crate::processor::layout::VariableLayout;
use crate::processor::step_generator::CutsceneProgram;

/// Everything one compile produces, handed to `writer`.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub program: CutsceneProgram,
    /// Final CTSN binary.
    pub blob: Vec<u8>,
    pub globals: VariableLayout,
    pub scene: VariableLayout,
    pub locals: VariableLayout,
}

/// On-disk description of a variable layout (`<output>.json`).
///
/// ```json
/// {"entries": [{"name": "a", "type": "i32", "offset": 0, "bitSize": 32, "initialValue": "00000007"}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    pub entries: Vec<LayoutDescriptorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDescriptorEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Bit offset from the start of the block.
    pub offset: u32,
    pub bit_size: u32,
    /// Lowercase hex of the default bytes.
    #[serde(default)]
    pub initial_value: String,
}
