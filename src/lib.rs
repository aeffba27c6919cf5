pub mod cli;
pub mod logger;
pub mod model;
pub mod parser;
pub mod processor;
pub mod writer;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::cli::Command;
use crate::processor::layout::{BuiltinTypes, TypeSchema};

pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    logger::init(args.verbose);

    match args.command {
        Command::Compile {
            input,
            output,
            globals,
            definitions,
        } => compile(&input, &output, globals.as_deref(), definitions.as_deref()),
        Command::Globals {
            output,
            inputs,
            definitions,
        } => globals(&output, &inputs, definitions.as_deref()),
    }
}

fn load_schema(definitions: Option<&Path>) -> anyhow::Result<Box<dyn TypeSchema>> {
    Ok(match definitions {
        Some(path) => Box::new(parser::load_definitions(path)?),
        None => Box::new(BuiltinTypes),
    })
}

pub fn compile(
    input: &Path,
    output: &Path,
    globals: Option<&Path>,
    definitions: Option<&Path>,
) -> anyhow::Result<()> {
    // 1. ── Parse ──────────────────────────────────────────────────────
    let schema = load_schema(definitions)?;
    let source = parser::load_source(input)?;
    let shared_globals = globals
        .map(|path| {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Reading {}", path.display()))?;
            parser::load_layout_from_json(&json, schema.as_ref())
                .with_context(|| format!("Parsing global layout {}", path.display()))
        })
        .transpose()?;

    // 2. ── Process ────────────────────────────────────────────────────
    let compiled = processor::compile(&source, shared_globals.as_ref(), schema.as_ref())
        .with_context(|| format!("Compiling {}", input.display()))?;

    // 3. ── Write outputs ──────────────────────────────────────────────
    writer::bin::emit(&compiled, output)
        .with_context(|| format!("Writing {}", output.display()))?;
    let descriptor = writer::with_suffix(output, ".json");
    writer::json::emit(&compiled.scene, &descriptor)
        .with_context(|| format!("Writing {}", descriptor.display()))?;

    Ok(())
}

pub fn globals(output: &Path, inputs: &[PathBuf], definitions: Option<&Path>) -> anyhow::Result<()> {
    // 1. ── Parse ──────────────────────────────────────────────────────
    let schema = load_schema(definitions)?;
    let sources = inputs
        .iter()
        .map(|path| parser::load_source(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // 2. ── Process ────────────────────────────────────────────────────
    let layout = processor::build_globals(&sources, schema.as_ref())
        .with_context(|| "Building the global layout")?;

    // 3. ── Write outputs ──────────────────────────────────────────────
    let defaults = writer::with_suffix(output, ".dat");
    writer::bin::emit_defaults(&layout, &defaults)
        .with_context(|| format!("Writing {}", defaults.display()))?;
    let descriptor = writer::with_suffix(output, ".json");
    writer::json::emit(&layout, &descriptor)
        .with_context(|| format!("Writing {}", descriptor.display()))?;

    Ok(())
}
