//! CTSN assembler: turns a generated program into the binary the cutscene
//! runner loads, and reads such a binary back for inspection.
//!
//! Layout (big-endian):
//!
//! ```text
//! "CTSN" | u16 step count | u16 locals size | locals bytes
//! then per step: u8 opcode | payload
//! ```

use anyhow::{Result, anyhow, bail};

use crate::processor::layout::VariableLayout;
use crate::processor::step_generator::{CutsceneProgram, Instruction};
use crate::processor::steps::{self, ArgKind, StepOpcode};

pub const HEADER: &[u8; 4] = b"CTSN";

/// Serialises `program` with `locals` providing the initial local memory.
/// Jumps must already be resolved.
pub fn assemble(program: &CutsceneProgram, locals: &VariableLayout) -> Result<Vec<u8>> {
    let step_count = u16::try_from(program.len()).map_err(|_| {
        anyhow!(
            "cutscene too large, {} steps instead of at most {}",
            program.len(),
            u16::MAX
        )
    })?;

    let defaults = locals.default_block();
    let locals_size = u16::try_from(defaults.len()).map_err(|_| {
        anyhow!(
            "local variables too large, {} bytes instead of at most {}",
            defaults.len(),
            u16::MAX
        )
    })?;

    let mut blob = Vec::new();
    blob.extend_from_slice(HEADER);
    blob.extend_from_slice(&step_count.to_be_bytes());
    blob.extend_from_slice(&locals_size.to_be_bytes());
    blob.extend_from_slice(&defaults);

    for instruction in &program.instructions {
        blob.push(instruction.opcode() as u8);

        match instruction {
            Instruction::Step { payload, .. } => blob.extend_from_slice(payload),
            Instruction::Jump { offset, .. } => blob.extend_from_slice(&offset.to_be_bytes()),
        }
    }

    Ok(blob)
}

/// One decoded step of a CTSN binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStep {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl RawStep {
    pub fn jump_offset(&self) -> Option<i16> {
        let is_jump = self.opcode == StepOpcode::Jump as u8 || self.opcode == StepOpcode::JumpIfNot as u8;
        match (is_jump, self.payload.as_slice()) {
            (true, &[hi, lo]) => Some(i16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }
}

/// Decoded CTSN binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub locals: Vec<u8>,
    pub steps: Vec<RawStep>,
}

struct Reader<'a> {
    blob: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.at + len;
        let bytes = self
            .blob
            .get(self.at..end)
            .ok_or_else(|| anyhow!("unexpected end of cutscene at byte {}", self.at))?;
        self.at = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Skips a length-prefixed string.
    fn skip_string(&mut self) -> Result<()> {
        let low = self.u8()? as usize;
        let len = if low & 0x80 != 0 {
            ((self.u8()? as usize) << 7) | (low & 0x7f)
        } else {
            low
        };
        self.take(len)?;
        Ok(())
    }
}

/// Splits a CTSN binary back into its steps.
pub fn disassemble(blob: &[u8]) -> Result<Disassembly> {
    let mut reader = Reader { blob, at: 0 };

    if reader.take(4)? != HEADER {
        bail!("not a cutscene, header mismatch");
    }
    let step_count = reader.u16()?;
    let locals_size = reader.u16()? as usize;
    let locals = reader.take(locals_size)?.to_vec();

    let mut steps = Vec::with_capacity(step_count as usize);
    for _ in 0..step_count {
        let opcode = reader.u8()?;
        let start = reader.at;

        match opcode {
            op if op == StepOpcode::Expression as u8 => {
                if reader.take(4)? != b"EXPR" {
                    bail!("expression at byte {} has no EXPR header", start);
                }
                let len = reader.u16()? as usize;
                reader.take(len)?;
            }
            op if op == StepOpcode::Jump as u8 || op == StepOpcode::JumpIfNot as u8 => {
                reader.take(2)?;
            }
            op if op == StepOpcode::SetLocal as u8
                || op == StepOpcode::SetScene as u8
                || op == StepOpcode::SetGlobal as u8 =>
            {
                reader.take(4)?;
            }
            op => {
                let definition = steps::STEPS
                    .iter()
                    .find(|s| s.opcode as u8 == op)
                    .ok_or_else(|| anyhow!("unknown step opcode {} at byte {}", op, start - 1))?;

                for kind in definition.args {
                    match kind {
                        ArgKind::Template => {
                            reader.u8()?;
                            reader.skip_string()?;
                        }
                        ArgKind::Str => reader.skip_string()?,
                        ArgKind::U8 | ArgKind::Bool => {
                            reader.take(1)?;
                        }
                        ArgKind::U16 => {
                            reader.take(2)?;
                        }
                        ArgKind::F32 => {
                            reader.take(4)?;
                        }
                        ArgKind::Int => {}
                    }
                }
            }
        }

        steps.push(RawStep {
            opcode,
            payload: blob[start..reader.at].to_vec(),
        });
    }

    if reader.at != blob.len() {
        bail!("{} trailing bytes after the last step", blob.len() - reader.at);
    }

    Ok(Disassembly { locals, steps })
}
