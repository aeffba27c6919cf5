//! Component 3 – the functional core.
//!
//! Source text goes in, a CTSN binary plus the variable layouts come out.
//! Every pass is a plain function over the previous pass's output.
pub mod ast;
pub mod blob;
pub mod evaluator;
pub mod expression;
pub mod layout;
pub mod lexer;
pub mod script_parser;
pub mod source;
pub mod step_generator;
pub mod steps;
pub mod types;

pub use expression::generate_condition;
pub use source::{CompileError, Source};

use anyhow::Result;
use tracing::{debug, info};

use crate::model::CompiledScript;
use layout::{TypeSchema, VariableContext, VariableLayout, VariableLayoutBuilder};

/// Runs every pass over one script.
///
/// With `shared_globals` the script's `global` declarations must agree with
/// that layout; without it the globals are laid out from the script alone.
pub fn compile(
    source: &Source,
    shared_globals: Option<&VariableLayout>,
    schema: &dyn TypeSchema,
) -> Result<CompiledScript> {
    info!(file = %source.filename, "parsing");
    let program = script_parser::parse(source)?;
    debug!(
        globals = program.globals.len(),
        scene = program.scene.len(),
        locals = program.locals.len(),
        statements = program.statements.len(),
        "parsed"
    );

    info!("laying out variables");
    let context = layout::build_context(&program, shared_globals, source, schema)?;

    info!("generating steps");
    let generated = step_generator::generate(&program, &context, schema, source)?;

    info!(steps = generated.len(), "assembling");
    let blob = blob::assemble(&generated, &context.locals)?;
    debug!(bytes = blob.len(), "assembled");

    let VariableContext {
        globals,
        scene,
        locals,
    } = context;

    Ok(CompiledScript {
        program: generated,
        blob,
        globals,
        scene,
        locals,
    })
}

/// Merges the `global` declarations of several scripts into the shared
/// global layout.
pub fn build_globals(sources: &[Source], schema: &dyn TypeSchema) -> Result<VariableLayout> {
    let mut builder = VariableLayoutBuilder::new(schema);

    for source in sources {
        info!(file = %source.filename, "collecting globals");
        let program = script_parser::parse(source)?;
        builder.add_all(&program.globals, source);
    }

    let layout = builder.build()?;
    info!(
        variables = layout.entries().len(),
        bytes = layout.byte_size(),
        "built global layout"
    );
    Ok(layout)
}
