//! Raw binary outputs: the CTSN cutscene and the global defaults block.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::model::CompiledScript;
use crate::processor::layout::VariableLayout;

pub fn emit(compiled: &CompiledScript, out: &Path) -> io::Result<()> {
    fs::write(out, &compiled.blob)?;
    info!(file = %out.display(), bytes = compiled.blob.len(), "wrote cutscene");
    Ok(())
}

/// Initial contents of the global variable block (`<output>.dat`).
pub fn emit_defaults(layout: &VariableLayout, out: &Path) -> io::Result<()> {
    let block = layout.default_block();
    fs::write(out, &block)?;
    info!(file = %out.display(), bytes = block.len(), "wrote default values");
    Ok(())
}
