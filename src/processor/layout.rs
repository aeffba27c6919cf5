//! Variable memory maps.
//!
//! Each scope (globals, scene, locals) gets its own packed, bit-addressed
//! block.  Entries are sorted by `(alignment, name)` before allocation so the
//! result only depends on the set of declared names, never on declaration
//! order – the global map is shared with other exporters and diffed across
//! builds.

use std::collections::HashMap;

use tracing::debug;

use super::ast::{DataType, ExprKind, Program, Scope, VariableDeclaration};
use super::evaluator::{Constant, StaticEvaluator};
use super::source::{CompileError, Diagnostics, Source};

/// Lookup interface for names defined outside the script language: extra
/// integer type names and enum constants.
pub trait TypeSchema {
    fn bit_width(&self, _type_name: &str) -> Option<u32> {
        None
    }

    fn constant(&self, _name: &str) -> Option<i32> {
        None
    }
}

/// The language's own types only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTypes;

impl TypeSchema for BuiltinTypes {}

/// How a variable is stored and addressed by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Bool,
    I8,
    I16,
    I32,
    Float,
    Char,
}

impl StorageType {
    pub fn resolve(type_name: &str, schema: &dyn TypeSchema) -> Option<StorageType> {
        let builtin = match type_name {
            "bool" => Some(StorageType::Bool),
            "i8" => Some(StorageType::I8),
            "char" => Some(StorageType::Char),
            "i16" | "entity_id" => Some(StorageType::I16),
            "i32" | "entity_spawner" => Some(StorageType::I32),
            "float" => Some(StorageType::Float),
            _ => None,
        };

        builtin.or_else(|| match schema.bit_width(type_name)? {
            8 => Some(StorageType::I8),
            16 => Some(StorageType::I16),
            32 => Some(StorageType::I32),
            _ => None,
        })
    }

    pub fn bit_size(self) -> u32 {
        match self {
            StorageType::Bool => 1,
            StorageType::I8 | StorageType::Char => 8,
            StorageType::I16 => 16,
            StorageType::I32 | StorageType::Float => 32,
        }
    }

    /// Data type tag understood by the VM's load/store instructions.
    pub fn type_tag(self) -> u16 {
        match self {
            StorageType::I8 => 1,
            StorageType::I16 => 2,
            StorageType::I32 => 3,
            StorageType::Bool => 4,
            StorageType::Float => 5,
            StorageType::Char => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: String,
    pub type_name: String,
    pub storage: StorageType,
    pub count: Option<u32>,
    pub bit_offset: u32,
    pub bit_size: u32,
    /// Big-endian default value; one `0`/`1` byte for a bool.  Empty for an
    /// array without a default, which starts zeroed.
    pub default: Vec<u8>,
}

impl LayoutEntry {
    pub fn alignment(&self) -> u32 {
        self.storage.bit_size()
    }

    /// The addressing unit of load/store opcodes.
    pub fn word_offset(&self) -> u32 {
        self.bit_offset / self.storage.bit_size()
    }

    pub fn is_string(&self) -> bool {
        self.storage == StorageType::Char && self.count.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableLayout {
    entries: Vec<LayoutEntry>,
    index: HashMap<String, usize>,
}

impl VariableLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a layout from already-allocated entries, e.g. a descriptor
    /// read back from disk.  Rejects misaligned or overlapping entries.
    pub fn from_entries(mut entries: Vec<LayoutEntry>) -> Result<Self, String> {
        entries.sort_by_key(|e| e.bit_offset);

        let mut index = HashMap::new();
        let mut end = 0;

        for (i, entry) in entries.iter().enumerate() {
            if entry.bit_offset % entry.alignment() != 0 {
                return Err(format!(
                    "{} at bit {} is not aligned to {} bits",
                    entry.name,
                    entry.bit_offset,
                    entry.alignment()
                ));
            }
            if entry.bit_offset < end {
                return Err(format!("{} overlaps the previous variable", entry.name));
            }
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(format!("{} is defined twice", entry.name));
            }
            end = entry
                .bit_offset
                .checked_add(entry.bit_size)
                .ok_or_else(|| format!("{} does not fit in the layout", entry.name))?;
        }

        Ok(Self { entries, index })
    }

    pub fn get(&self, name: &str) -> Option<&LayoutEntry> {
        self.index.get(name).and_then(|&i| self.entries.get(i))
    }

    /// Entries in ascending offset order.
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bit_size(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.bit_offset + e.bit_size)
            .max()
            .unwrap_or(0)
    }

    pub fn byte_size(&self) -> usize {
        self.bit_size().div_ceil(8) as usize
    }

    /// Checks declarations against an already-built layout, such as the
    /// shared global map every script is compiled against.
    pub fn verify(
        &self,
        declarations: &[VariableDeclaration],
        source: &Source,
        diagnostics: &mut Diagnostics,
    ) {
        for declaration in declarations {
            let name = &declaration.name;
            match self.get(&name.name) {
                None => diagnostics.report(
                    source,
                    &format!("{} is missing from the global layout", name.name),
                    name.at,
                ),
                Some(entry) if entry.type_name != declaration.data_type.to_string() => {
                    diagnostics.report(
                        source,
                        &format!(
                            "redefinition of variable with mismatched type, {} was {}",
                            entry.type_name, declaration.data_type
                        ),
                        name.at,
                    )
                }
                Some(_) => {}
            }
        }
    }

    /// The initial memory block with every default value packed in.
    pub fn default_block(&self) -> Vec<u8> {
        let mut block = vec![0u8; self.byte_size()];

        for entry in &self.entries {
            let byte = (entry.bit_offset / 8) as usize;

            if entry.storage == StorageType::Bool {
                if entry.default.iter().any(|&b| b != 0) && entry.count.is_none() {
                    if let Some(slot) = block.get_mut(byte) {
                        *slot |= 0x80 >> (entry.bit_offset % 8);
                    }
                }
                continue;
            }

            let len = (entry.bit_size / 8) as usize;
            for (slot, value) in block[byte..byte + len].iter_mut().zip(&entry.default) {
                *slot = *value;
            }
        }

        block
    }
}

struct Pending {
    name: String,
    data_type: DataType,
    storage: StorageType,
    bit_size: u32,
    default: Vec<u8>,
    /// Pre-rendered pointer back at this declaration for redefinition errors.
    previous: String,
    /// Pre-rendered error for when the allocation runs past the end of memory.
    overflow: String,
}

impl Pending {
    fn alignment(&self) -> u32 {
        self.storage.bit_size()
    }
}

/// Collects declarations (possibly from several files) into one layout.
pub struct VariableLayoutBuilder<'a> {
    schema: &'a dyn TypeSchema,
    pending: Vec<Pending>,
    diagnostics: Diagnostics,
}

impl<'a> VariableLayoutBuilder<'a> {
    pub fn new(schema: &'a dyn TypeSchema) -> Self {
        Self {
            schema,
            pending: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn add_all(&mut self, declarations: &[VariableDeclaration], source: &Source) {
        for declaration in declarations {
            self.add_declaration(declaration, source);
        }
    }

    pub fn add_declaration(&mut self, declaration: &VariableDeclaration, source: &Source) {
        let name = &declaration.name;

        if let Some(existing) = self.pending.iter().find(|p| p.name == name.name) {
            if !existing.data_type.same_as(&declaration.data_type) {
                self.diagnostics.report(
                    source,
                    &format!(
                        "redefinition of variable with mismatched type, {} was {}",
                        existing.data_type, declaration.data_type
                    ),
                    name.at,
                );
                self.diagnostics.push(existing.previous.clone());
            }
            return;
        }

        let data_type = &declaration.data_type;
        let Some(storage) = StorageType::resolve(&data_type.name.name, self.schema) else {
            self.diagnostics.report(
                source,
                &format!("invalid type {}", data_type.name.name),
                data_type.name.at,
            );
            return;
        };

        let Some(bit_size) = storage.bit_size().checked_mul(data_type.count.unwrap_or(1)) else {
            self.diagnostics
                .report(source, "array too large", data_type.name.at);
            return;
        };
        let Some(default) = self.default_value(declaration, storage, bit_size, source) else {
            return;
        };

        self.pending.push(Pending {
            name: name.name.clone(),
            data_type: data_type.clone(),
            storage,
            bit_size,
            default,
            previous: source.format_message("previous definition was here", name.at),
            overflow: source.format_message("variables do not fit in memory", name.at),
        });
    }

    fn default_value(
        &mut self,
        declaration: &VariableDeclaration,
        storage: StorageType,
        bit_size: u32,
        source: &Source,
    ) -> Option<Vec<u8>> {
        let Some(expr) = &declaration.default else {
            // arrays are left to the zero fill of `default_block`
            return Some(match (storage, declaration.data_type.count) {
                (_, Some(_)) => Vec::new(),
                (StorageType::Bool, None) => vec![0],
                (_, None) => vec![0; bit_size.div_ceil(8) as usize],
            });
        };

        if let Some(count) = declaration.data_type.count {
            if storage != StorageType::Char {
                self.diagnostics.report(
                    source,
                    "only char arrays can have a default value",
                    expr.at,
                );
                return None;
            }

            let text = match &expr.kind {
                ExprKind::Str(literal) => literal.plain_text(),
                _ => None,
            };
            let Some(text) = text else {
                self.diagnostics
                    .report(source, "char arrays need a plain string default", expr.at);
                return None;
            };

            let mut bytes: Vec<u8> = text.bytes().take(count as usize).collect();
            bytes.resize(count as usize, 0);
            return Some(bytes);
        }

        let Some(value) = StaticEvaluator::new(self.schema).evaluate(expr) else {
            self.diagnostics
                .report(source, "default value must be a constant", expr.at);
            return None;
        };

        Some(pack_scalar(storage, value))
    }

    pub fn build(self) -> Result<VariableLayout, CompileError> {
        let (layout, diagnostics) = self.into_parts();
        diagnostics.finish(layout)
    }

    /// The layout of every declaration that was valid, plus the errors for
    /// the rest.
    pub fn into_parts(self) -> (VariableLayout, Diagnostics) {
        let mut pending = self.pending;
        let mut diagnostics = self.diagnostics;
        pending.sort_by(|a, b| (a.alignment(), &a.name).cmp(&(b.alignment(), &b.name)));

        let mut offset = 0u32;
        let mut entries = Vec::with_capacity(pending.len());

        for p in pending {
            let span = offset
                .checked_next_multiple_of(p.alignment())
                .and_then(|start| Some((start, start.checked_add(p.bit_size)?)));
            let Some((start, end)) = span else {
                diagnostics.push(p.overflow);
                break;
            };

            debug!(
                name = %p.name,
                r#type = %p.data_type,
                offset = start,
                bits = p.bit_size,
                "allocated variable"
            );

            entries.push(LayoutEntry {
                name: p.name,
                type_name: p.data_type.to_string(),
                storage: p.storage,
                count: p.data_type.count,
                bit_offset: start,
                bit_size: p.bit_size,
                default: p.default,
            });
            offset = end;
        }

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        (VariableLayout { entries, index }, diagnostics)
    }
}

/// Big-endian encoding of a scalar default.
pub fn pack_scalar(storage: StorageType, value: Constant) -> Vec<u8> {
    match storage {
        StorageType::Bool => vec![value.is_truthy() as u8],
        StorageType::I8 | StorageType::Char => (value.as_i32() as i8).to_be_bytes().to_vec(),
        StorageType::I16 => (value.as_i32() as i16).to_be_bytes().to_vec(),
        StorageType::I32 => value.as_i32().to_be_bytes().to_vec(),
        StorageType::Float => (value.as_f64() as f32).to_be_bytes().to_vec(),
    }
}

/// Builds the layout of one scope's declarations.
pub fn build(
    declarations: &[VariableDeclaration],
    source: &Source,
    schema: &dyn TypeSchema,
) -> Result<VariableLayout, CompileError> {
    let mut builder = VariableLayoutBuilder::new(schema);
    builder.add_all(declarations, source);
    builder.build()
}

fn build_into(
    declarations: &[VariableDeclaration],
    source: &Source,
    schema: &dyn TypeSchema,
    diagnostics: &mut Diagnostics,
) -> VariableLayout {
    let mut builder = VariableLayoutBuilder::new(schema);
    builder.add_all(declarations, source);
    let (layout, found) = builder.into_parts();
    diagnostics.extend(found);
    layout
}

/// Lays out all three scopes of `program`, reporting the errors of every
/// scope together.
///
/// With `shared_globals` the script's `global` declarations are checked
/// against that layout instead of being laid out.
pub fn build_context(
    program: &Program,
    shared_globals: Option<&VariableLayout>,
    source: &Source,
    schema: &dyn TypeSchema,
) -> Result<VariableContext, CompileError> {
    let mut diagnostics = Diagnostics::new();

    let globals = match shared_globals {
        Some(shared) => {
            shared.verify(&program.globals, source, &mut diagnostics);
            shared.clone()
        }
        None => build_into(&program.globals, source, schema, &mut diagnostics),
    };
    let scene = build_into(&program.scene, source, schema, &mut diagnostics);
    let locals = build_into(&program.locals, source, schema, &mut diagnostics);

    diagnostics.finish(VariableContext::new(globals, scene, locals))
}

/// The three layouts visible to one script.  Locals shadow scene variables,
/// which shadow globals.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub globals: VariableLayout,
    pub scene: VariableLayout,
    pub locals: VariableLayout,
}

impl VariableContext {
    pub fn new(globals: VariableLayout, scene: VariableLayout, locals: VariableLayout) -> Self {
        Self {
            globals,
            scene,
            locals,
        }
    }

    pub fn layout(&self, scope: Scope) -> &VariableLayout {
        match scope {
            Scope::Global => &self.globals,
            Scope::Scene => &self.scene,
            Scope::Local => &self.locals,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<(Scope, &LayoutEntry)> {
        [Scope::Local, Scope::Scene, Scope::Global]
            .into_iter()
            .find_map(|scope| self.layout(scope).get(name).map(|entry| (scope, entry)))
    }
}
