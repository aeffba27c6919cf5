//! Lowers statements into the flat instruction list the cutscene runner
//! steps through.
//!
//! Jumps are relative to the instruction after the jump.  `if` chains are
//! back-patched as soon as their targets are known; named labels (`$exit`)
//! are resolved in one pass at the end so every missing label is reported.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::debug;

use super::ast::{Expr, ExprKind, Ident, IfStatement, Program, Scope, Statement, StepCall};
use super::expression::{ExpressionGenerator, ExpressionScript, variable_address};
use super::layout::{StorageType, TypeSchema, VariableContext};
use super::source::{CompileError, Diagnostics, Source};
use super::steps::{self, ArgKind, EXIT_STEP, StepOpcode};
use super::types::{TypeTable, ValueType, check_program};

/// Label defined after the main body, ahead of the idle clean-up.
pub const EXIT_LABEL: &str = "$exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpLabel {
    pub name: String,
    /// Where the jump was written, for diagnostics.
    pub at: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Step {
        opcode: StepOpcode,
        payload: Vec<u8>,
    },
    Jump {
        opcode: StepOpcode,
        offset: i16,
        label: Option<JumpLabel>,
    },
}

impl Instruction {
    pub fn opcode(&self) -> StepOpcode {
        match self {
            Instruction::Step { opcode, .. } | Instruction::Jump { opcode, .. } => *opcode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutsceneProgram {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
}

impl CutsceneProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Appends and returns the index of the new instruction.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    pub fn push_step(&mut self, opcode: StepOpcode, payload: Vec<u8>) -> usize {
        self.push(Instruction::Step { opcode, payload })
    }

    /// A jump whose target is filled in later, by `patch_jump` or by label.
    pub fn push_jump(&mut self, opcode: StepOpcode, label: Option<JumpLabel>) -> usize {
        self.push(Instruction::Jump {
            opcode,
            offset: 0,
            label,
        })
    }

    /// Points the jump at `index` to `target`.  Returns false, leaving the
    /// jump untouched, when the distance does not fit the i16 offset.
    pub fn patch_jump(&mut self, index: usize, target: usize) -> bool {
        let Some(distance) = relative_offset(index, target) else {
            return false;
        };
        if let Some(Instruction::Jump { offset, .. }) = self.instructions.get_mut(index) {
            *offset = distance;
        }
        true
    }

    /// Labels the next instruction to be pushed.
    pub fn define_label(&mut self, name: &str) {
        self.labels.insert(name.to_string(), self.len());
    }

    /// Absolute index a jump lands on.
    pub fn jump_target(&self, index: usize) -> Option<usize> {
        match self.instructions.get(index)? {
            Instruction::Jump { offset, .. } => usize::try_from(index as i64 + 1 + *offset as i64).ok(),
            Instruction::Step { .. } => None,
        }
    }

    /// Resolves every labelled jump; reports all unknown labels at once.
    pub fn resolve_labels(&mut self, source: &Source, diagnostics: &mut Diagnostics) {
        for (index, instruction) in self.instructions.iter_mut().enumerate() {
            let Instruction::Jump {
                offset,
                label: Some(label),
                ..
            } = instruction
            else {
                continue;
            };

            let Some(&target) = self.labels.get(&label.name) else {
                diagnostics.report(
                    source,
                    &format!("the label {} is not defined", label.name),
                    label.at,
                );
                continue;
            };
            match relative_offset(index, target) {
                Some(distance) => *offset = distance,
                None => diagnostics.report(
                    source,
                    &format!("the label {} is too far away to jump to", label.name),
                    label.at,
                ),
            }
        }
    }
}

/// `target - (index + 1)`, if it fits.
fn relative_offset(index: usize, target: usize) -> Option<i16> {
    let distance = i64::try_from(target).ok()? - i64::try_from(index).ok()? - 1;
    i16::try_from(distance).ok()
}

pub struct StepGenerator<'a> {
    source: &'a Source,
    context: &'a VariableContext,
    expressions: ExpressionGenerator<'a>,
    program: CutsceneProgram,
    diagnostics: Diagnostics,
}

impl<'a> StepGenerator<'a> {
    pub fn new(
        source: &'a Source,
        context: &'a VariableContext,
        types: &'a TypeTable,
        schema: &'a dyn TypeSchema,
    ) -> Self {
        Self {
            source,
            context,
            expressions: ExpressionGenerator::new(context, types, schema),
            program: CutsceneProgram::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn report(&mut self, message: &str, at: usize) {
        self.diagnostics.report(self.source, message, at);
    }

    /// True when the type pass rejected `expr` or one of its interpolations.
    /// Those errors are already reported, so no code is generated for it.
    fn failed_to_type(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Str(literal) => literal
                .interpolations
                .iter()
                .any(|interpolation| self.failed_to_type(interpolation)),
            _ => self.expressions.type_of(expr).is_none(),
        }
    }

    pub fn compile_block(&mut self, statements: &[Statement]) {
        for statement in statements {
            match statement {
                Statement::Assignment { name, value } => self.compile_assignment(name, value),
                Statement::If(branch) => self.compile_if(branch),
                Statement::Step(step) => self.compile_step(step),
            }
        }
    }

    fn push_expression(&mut self, script: &ExpressionScript, at: usize) {
        match script.to_bytes() {
            Ok(bytes) => {
                self.program.push_step(StepOpcode::Expression, bytes);
            }
            Err(err) => err.report(&mut self.diagnostics, self.source, at),
        }
    }

    fn compile_assignment(&mut self, name: &Ident, value: &Expr) {
        let Some((scope, entry)) = self.context.resolve(&name.name) else {
            self.report(&format!("the variable {} is not defined", name.name), name.at);
            return;
        };
        if self.failed_to_type(value) {
            return;
        }

        let target = match (entry.storage, entry.count) {
            (_, Some(_)) => None,
            (StorageType::Float, None) => Some(ValueType::Float),
            (_, None) => Some(ValueType::Int),
        };
        let target = match (target, self.expressions.type_of(value)) {
            (Some(_), Some(ValueType::Str)) | (None, _) => None,
            (target, _) => target,
        };
        let Some(target) = target else {
            self.report("can only assign numerical types", value.at);
            return;
        };

        let Some((type_tag, word_offset)) = variable_address(entry) else {
            self.report(
                &format!("the variable {} is outside the addressable range", name.name),
                name.at,
            );
            return;
        };

        let mut script = ExpressionScript::new();
        if let Err(err) = self.expressions.generate_to_type(value, target, &mut script) {
            err.report(&mut self.diagnostics, self.source, value.at);
            return;
        }
        self.push_expression(&script, value.at);

        let opcode = match scope {
            Scope::Local => StepOpcode::SetLocal,
            Scope::Scene => StepOpcode::SetScene,
            Scope::Global => StepOpcode::SetGlobal,
        };
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&type_tag.to_be_bytes());
        payload.extend_from_slice(&word_offset.to_be_bytes());
        self.program.push_step(opcode, payload);
    }

    fn compile_if(&mut self, branch: &IfStatement) {
        if !self.failed_to_type(&branch.condition) {
            let mut condition = ExpressionScript::new();
            match self
                .expressions
                .generate_to_type(&branch.condition, ValueType::Int, &mut condition)
            {
                Ok(()) => self.push_expression(&condition, branch.condition.at),
                Err(err) => err.report(&mut self.diagnostics, self.source, branch.condition.at),
            }
        }

        let skip_then = self.program.push_jump(StepOpcode::JumpIfNot, None);
        self.compile_block(&branch.then_block);

        match &branch.else_block {
            Some(else_block) => {
                let skip_else = self.program.push_jump(StepOpcode::Jump, None);
                self.patch_jump_here(skip_then, branch.at);
                self.compile_block(else_block);
                self.patch_jump_here(skip_else, branch.at);
            }
            None => self.patch_jump_here(skip_then, branch.at),
        }
    }

    /// Points the jump at `index` to the next instruction.
    fn patch_jump_here(&mut self, index: usize, at: usize) {
        if !self.program.patch_jump(index, self.program.len()) {
            self.report("branch is too long to jump over", at);
        }
    }

    fn compile_step(&mut self, step: &StepCall) {
        let name = &step.name;

        if name.name == EXIT_STEP {
            if !step.args.is_empty() {
                self.report("exit takes no arguments", name.at);
            }
            self.program.push_jump(
                StepOpcode::Jump,
                Some(JumpLabel {
                    name: EXIT_LABEL.to_string(),
                    at: name.at,
                }),
            );
            return;
        }

        let Some(definition) = steps::lookup(&name.name) else {
            self.report(&format!("{} is not a valid step name", name.name), name.at);
            return;
        };

        if step.args.len() != definition.args.len() {
            self.report(
                &format!(
                    "{} expects {} arguments got {}",
                    name.name,
                    definition.args.len(),
                    step.args.len()
                ),
                name.at,
            );
            return;
        }

        let mut payload = Vec::new();
        let mut pushed = ExpressionScript::new();
        let mut valid = true;

        for (arg, kind) in step.args.iter().zip(definition.args) {
            valid &= self.compile_arg(arg, *kind, &mut payload, &mut pushed);
        }

        if !valid {
            return;
        }
        if !pushed.is_empty() {
            self.push_expression(&pushed, name.at);
        }
        self.program.push_step(definition.opcode, payload);
    }

    /// Packs a static argument into `payload` or appends a dynamic one to
    /// `pushed`.  Returns false after reporting an error.
    fn compile_arg(
        &mut self,
        arg: &Expr,
        kind: ArgKind,
        payload: &mut Vec<u8>,
        pushed: &mut ExpressionScript,
    ) -> bool {
        if self.failed_to_type(arg) {
            return false;
        }
        match kind {
            ArgKind::Template => return self.compile_template(arg, payload, pushed),
            ArgKind::Int => {
                if self.expressions.type_of(arg) == Some(ValueType::Str) {
                    self.report(&format!("expected {} got str", kind.describe()), arg.at);
                    return false;
                }
                if let Err(err) = self.expressions.generate_to_type(arg, ValueType::Int, pushed) {
                    err.report(&mut self.diagnostics, self.source, arg.at);
                    return false;
                }
                return true;
            }
            ArgKind::Str => {
                let text = match &arg.kind {
                    ExprKind::Str(literal) => literal.plain_text(),
                    _ => None,
                };
                let Some(text) = text else {
                    self.report(&format!("expected {}", kind.describe()), arg.at);
                    return false;
                };
                if let Err(message) = steps::encode_string(text, payload) {
                    self.report(&message, arg.at);
                    return false;
                }
                return true;
            }
            ArgKind::U8 | ArgKind::U16 | ArgKind::F32 | ArgKind::Bool => {}
        }

        let Some(value) = self.expressions.evaluator().evaluate(arg) else {
            self.report(&format!("expected {}", kind.describe()), arg.at);
            return false;
        };

        match kind {
            ArgKind::U8 => match u8::try_from(value.as_i32()) {
                Ok(v) => payload.push(v),
                Err(_) => {
                    self.report(&format!("{} does not fit in u8", value.as_i32()), arg.at);
                    return false;
                }
            },
            ArgKind::U16 => match u16::try_from(value.as_i32()) {
                Ok(v) => payload.extend_from_slice(&v.to_be_bytes()),
                Err(_) => {
                    self.report(&format!("{} does not fit in u16", value.as_i32()), arg.at);
                    return false;
                }
            },
            ArgKind::F32 => payload.extend_from_slice(&(value.as_f64() as f32).to_be_bytes()),
            ArgKind::Bool => payload.push(value.is_truthy() as u8),
            ArgKind::Template | ArgKind::Int | ArgKind::Str => {}
        }
        true
    }

    fn compile_template(
        &mut self,
        arg: &Expr,
        payload: &mut Vec<u8>,
        pushed: &mut ExpressionScript,
    ) -> bool {
        let ExprKind::Str(literal) = &arg.kind else {
            self.report(&format!("expected {}", ArgKind::Template.describe()), arg.at);
            return false;
        };

        let mut template = String::new();
        let mut nargs = 0usize;
        let mut valid = true;

        for (idx, segment) in literal.segments.iter().enumerate() {
            template.push_str(&steps::escape_template(segment));

            let Some(interpolation) = literal.interpolations.get(idx) else {
                continue;
            };

            let placeholder = match self.expressions.type_of(interpolation) {
                Some(ValueType::Float) => "%f",
                Some(ValueType::Str) => "%s",
                _ => "%d",
            };
            if let Err(err) = self.expressions.generate(interpolation, pushed) {
                err.report(&mut self.diagnostics, self.source, interpolation.at);
                valid = false;
            }
            template.push_str(placeholder);
            nargs += 1;
        }

        let Ok(nargs) = u8::try_from(nargs) else {
            self.report("too many interpolations in one string", arg.at);
            return false;
        };
        if let Err(message) = steps::encode_template(&template, nargs, payload) {
            self.report(&message, arg.at);
            return false;
        }
        valid
    }

    /// Distinct actor ids of every interacting step, in first-seen order.
    fn collect_idle_actors(&self, statements: &[Statement], actors: &mut IndexSet<u16>) {
        for statement in statements {
            match statement {
                Statement::Assignment { .. } => {}
                Statement::If(branch) => {
                    self.collect_idle_actors(&branch.then_block, actors);
                    if let Some(else_block) = &branch.else_block {
                        self.collect_idle_actors(else_block, actors);
                    }
                }
                Statement::Step(step) => {
                    let actor = steps::lookup(&step.name.name)
                        .and_then(|definition| definition.idle_actor)
                        .and_then(|idx| step.args.get(idx))
                        .and_then(|arg| self.expressions.evaluator().evaluate(arg))
                        .and_then(|value| u16::try_from(value.as_i32()).ok());
                    if let Some(actor) = actor {
                        actors.insert(actor);
                    }
                }
            }
        }
    }

    /// Defines `$exit`, appends the idle clean-up and resolves labels.
    pub fn finish(mut self, statements: &[Statement]) -> (CutsceneProgram, Diagnostics) {
        self.program.define_label(EXIT_LABEL);

        let mut actors = IndexSet::new();
        self.collect_idle_actors(statements, &mut actors);
        for actor in &actors {
            self.program
                .push_step(StepOpcode::IdleNpc, actor.to_be_bytes().to_vec());
        }

        self.program.resolve_labels(self.source, &mut self.diagnostics);

        debug!(
            instructions = self.program.len(),
            idle = actors.len(),
            "generated steps"
        );
        (self.program, self.diagnostics)
    }
}

/// Type checks and lowers the statements of `program`.  Steps are still
/// validated when the type pass fails, and both passes report together.
pub fn generate(
    program: &Program,
    context: &VariableContext,
    schema: &dyn TypeSchema,
    source: &Source,
) -> Result<CutsceneProgram, CompileError> {
    let (types, mut diagnostics) = check_program(program, context, schema, source);

    let mut generator = StepGenerator::new(source, context, &types, schema);
    generator.compile_block(&program.statements);
    let (generated, step_errors) = generator.finish(&program.statements);

    diagnostics.extend(step_errors);
    diagnostics.finish(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::layout::{self, BuiltinTypes};
    use crate::processor::script_parser::parse;

    fn compile(src: &str) -> Result<CutsceneProgram, CompileError> {
        let source = Source::new(src, "test");
        let program = parse(&source).expect("parses");
        let context = VariableContext::new(
            layout::build(&program.globals, &source, &BuiltinTypes)?,
            layout::build(&program.scene, &source, &BuiltinTypes)?,
            layout::build(&program.locals, &source, &BuiltinTypes)?,
        );
        generate(&program, &context, &BuiltinTypes, &source)
    }

    fn opcodes(program: &CutsceneProgram) -> Vec<StepOpcode> {
        program.instructions.iter().map(Instruction::opcode).collect()
    }

    fn payload(program: &CutsceneProgram, index: usize) -> &[u8] {
        match &program.instructions[index] {
            Instruction::Step { payload, .. } => payload,
            other => panic!("not a step: {other:?}"),
        }
    }

    fn errors(src: &str) -> Vec<String> {
        compile(src)
            .expect_err(src)
            .messages()
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    #[test]
    fn test_folded_assignment() {
        let program = compile("global a: i32; a = 3 + 4;").expect("compiles");
        assert_eq!(
            opcodes(&program),
            vec![StepOpcode::Expression, StepOpcode::SetGlobal]
        );
        assert_eq!(
            payload(&program, 0),
            &[b'E', b'X', b'P', b'R', 0, 6, 4, 0, 0, 0, 7, 0]
        );
        assert_eq!(payload(&program, 1), &[0, 3, 0, 0]);
        assert_eq!(program.labels.get(EXIT_LABEL), Some(&2));
    }

    #[test]
    fn test_assignment_conversion() {
        let program = compile("local f: float; local b: bool; f = 2; b = f;").expect("compiles");
        // b: bit 0, f: bits 32..64
        assert_eq!(
            payload(&program, 0),
            &[b'E', b'X', b'P', b'R', 0, 6, 4, 0x40, 0, 0, 0, 0]
        );
        assert_eq!(payload(&program, 1), &[0, 5, 0, 1]);
        assert_eq!(
            payload(&program, 2),
            &[b'E', b'X', b'P', b'R', 0, 7, 1, 0, 5, 0, 1, 25, 0]
        );
        assert_eq!(payload(&program, 3), &[0, 4, 0, 0]);
    }

    #[test]
    fn test_if_else_jumps() {
        let program =
            compile("local a: i32; if a > 3 then say \"big\"; else say \"small\"; end")
                .expect("compiles");
        assert_eq!(
            opcodes(&program),
            vec![
                StepOpcode::Expression,
                StepOpcode::JumpIfNot,
                StepOpcode::Say,
                StepOpcode::Jump,
                StepOpcode::Say,
            ]
        );
        assert_eq!(program.jump_target(1), Some(4));
        assert_eq!(program.jump_target(3), Some(5));
    }

    #[test]
    fn test_elif_chain() {
        let program = compile(
            "local a: i32;\n\
             if a == 1 then say \"one\";\n\
             elif a == 2 then say \"two\";\n\
             else say \"many\";\n\
             end\n\
             say \"done\";",
        )
        .expect("compiles");

        use StepOpcode::*;
        assert_eq!(
            opcodes(&program),
            vec![
                Expression, JumpIfNot, Say, Jump, Expression, JumpIfNot, Say, Jump, Say, Say
            ]
        );
        assert_eq!(program.jump_target(1), Some(4));
        assert_eq!(program.jump_target(3), Some(9));
        assert_eq!(program.jump_target(5), Some(8));
        assert_eq!(program.jump_target(7), Some(9));
    }

    #[test]
    fn test_if_without_else() {
        let program = compile("local a: i32; if a then a = 1; end").expect("compiles");
        assert_eq!(program.len(), 4);
        assert_eq!(program.jump_target(1), Some(4));
    }

    #[test]
    fn test_template() {
        let program = compile("say \"value is {1+2}\";").expect("compiles");
        assert_eq!(opcodes(&program), vec![StepOpcode::Expression, StepOpcode::Say]);
        assert_eq!(
            payload(&program, 0),
            &[b'E', b'X', b'P', b'R', 0, 6, 4, 0, 0, 0, 3, 0]
        );
        let mut expected = vec![1, 11];
        expected.extend_from_slice(b"value is %d");
        assert_eq!(payload(&program, 1), expected.as_slice());
    }

    #[test]
    fn test_template_placeholders() {
        let program = compile(
            "local f: float; local name: char[4]; say \"{name}: {f} at 100%\";",
        )
        .expect("compiles");
        // name: bits 0..32, f: bits 32..64
        assert_eq!(
            payload(&program, 0),
            &[b'E', b'X', b'P', b'R', 0, 11, 1, 0, 6, 0, 0, 1, 0, 5, 0, 1, 0]
        );
        let say = payload(&program, 1);
        assert_eq!(say[0], 2);
        assert_eq!(&say[2..], b"%s: %f at 100%%");
    }

    #[test]
    fn test_plain_say_has_no_expression() {
        let program = compile("say \"hello\";").expect("compiles");
        assert_eq!(opcodes(&program), vec![StepOpcode::Say]);
        assert_eq!(payload(&program, 0), &[0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_static_arguments() {
        let program = compile(
            "camera_move_to 1.0, 2, -0.5, true, 0; fade 2, 0.25; npc_animate 7, \"wave\", 1;",
        )
        .expect("compiles");
        assert_eq!(
            payload(&program, 0),
            &[0x3f, 0x80, 0, 0, 0x40, 0, 0, 0, 0xbf, 0, 0, 0, 1, 0]
        );
        assert_eq!(payload(&program, 1), &[2, 0x3e, 0x80, 0, 0]);
        assert_eq!(payload(&program, 2), &[0, 7, 4, b'w', b'a', b'v', b'e', 1]);
    }

    #[test]
    fn test_dynamic_argument() {
        let program = compile("local s: entity_spawner; spawn s;").expect("compiles");
        assert_eq!(opcodes(&program), vec![StepOpcode::Expression, StepOpcode::Spawn]);
        assert_eq!(
            payload(&program, 0),
            &[b'E', b'X', b'P', b'R', 0, 6, 1, 0, 3, 0, 0, 0]
        );
        assert!(payload(&program, 1).is_empty());
    }

    #[test]
    fn test_idle_actors() {
        let program = compile(
            "interact_with_npc 1, 2, 3;\n\
             if 1 then interact_with_location 0, 5, \"door\"; end\n\
             interact_with_npc 1, 2, 3;\n\
             interact_with_position 1, 4, 0.0, 0.0, 0.0;",
        )
        .expect("compiles");

        let exit = program.labels[EXIT_LABEL];
        let idles: Vec<_> = program.instructions[exit..]
            .iter()
            .map(|i| match i {
                Instruction::Step {
                    opcode: StepOpcode::IdleNpc,
                    payload,
                } => u16::from_be_bytes([payload[0], payload[1]]),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(idles, vec![2, 5, 4]);
    }

    #[test]
    fn test_exit_jumps_past_body() {
        let program =
            compile("local a: i32; if a then exit; end interact_with_npc 0, 9, 1;").expect("compiles");
        // expr, jump_if_not, jump($exit), interact, idle
        assert_eq!(program.labels[EXIT_LABEL], 4);
        assert_eq!(program.jump_target(2), Some(4));
        assert_eq!(program.instructions[4].opcode(), StepOpcode::IdleNpc);
    }

    #[test]
    fn test_unresolved_labels_are_batched() {
        let source = Source::new("exit; exit;", "test");
        let mut program = CutsceneProgram::new();
        for at in [0, 6] {
            program.push_jump(
                StepOpcode::Jump,
                Some(JumpLabel {
                    name: "missing".to_string(),
                    at,
                }),
            );
        }
        let mut diagnostics = Diagnostics::new();
        program.resolve_labels(&source, &mut diagnostics);
        let err = diagnostics.finish(()).unwrap_err();
        assert_eq!(err.messages().len(), 2);
        assert!(err.messages()[1].starts_with("test:1:7: the label missing is not defined"));
    }

    #[test]
    fn test_jumps_out_of_range() {
        let body = "camera_follow; ".repeat(i16::MAX as usize + 1);
        let errors = errors(&format!("if 1 then {body}end"));
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].starts_with("test:1:1: branch is too long to jump over"));

        let source = Source::new("exit;", "test");
        let mut program = CutsceneProgram::new();
        program.push_jump(
            StepOpcode::Jump,
            Some(JumpLabel {
                name: EXIT_LABEL.to_string(),
                at: 0,
            }),
        );
        for _ in 0..=i16::MAX {
            program.push_step(StepOpcode::CameraFollow, Vec::new());
        }
        program.define_label(EXIT_LABEL);

        let mut diagnostics = Diagnostics::new();
        program.resolve_labels(&source, &mut diagnostics);
        let err = diagnostics.finish(()).unwrap_err();
        assert!(err.messages()[0].starts_with("test:1:1: the label $exit is too far away"));

        assert!(!program.patch_jump(0, i16::MAX as usize + 2));
        assert!(program.patch_jump(0, i16::MAX as usize + 1));
        assert_eq!(program.jump_target(0), Some(i16::MAX as usize + 1));
    }

    #[test]
    fn test_semantic_errors() {
        let test_cases = vec![
            ("local a: i32; a = \"text\";", vec!["can only assign numerical types"]),
            ("local t: char[4]; t = 1;", vec!["can only assign numerical types"]),
            ("b = 1;", vec!["the variable b is not defined"]),
            ("dance 1;", vec!["dance is not a valid step name"]),
            ("delay 1, 2;", vec!["delay expects 1 arguments got 2"]),
            ("local a: i32; delay a;", vec!["expected constant float"]),
            ("show_title \"{1}\";", vec!["expected constant string"]),
            ("show_item 70000;", vec!["70000 does not fit in u16"]),
            ("spawn \"x\";", vec!["expected int got str"]),
            ("say 3;", vec!["expected string"]),
            (
                "dance; delay; exit 1;",
                vec![
                    "dance is not a valid step name",
                    "delay expects 1 arguments got 0",
                    "exit takes no arguments",
                ],
            ),
        ];

        for (src, expected) in test_cases {
            let errors = errors(src);
            assert_eq!(errors.len(), expected.len(), "source: {src}: {errors:?}");
            for (error, message) in errors.iter().zip(expected) {
                assert!(error.contains(message), "{error} should contain {message}");
            }
        }
    }

    #[test]
    fn test_type_and_step_errors_reported_together() {
        let test_cases = vec![
            (
                "local a: i32; a = missing; say \"{other}\";",
                vec![
                    "the variable missing is not defined",
                    "the variable other is not defined",
                ],
            ),
            (
                "local a: i32;\na = missing;\ndance 1;",
                vec![
                    "test:2:5: the variable missing is not defined",
                    "test:3:1: dance is not a valid step name",
                ],
            ),
            (
                "if missing then dance; end delay \"{a + 1.5}\";",
                vec![
                    "the variable missing is not defined",
                    "the variable a is not defined",
                    "dance is not a valid step name",
                ],
            ),
        ];

        for (src, expected) in test_cases {
            let errors = errors(src);
            assert_eq!(errors.len(), expected.len(), "source: {src}: {errors:?}");
            for (error, message) in errors.iter().zip(expected) {
                assert!(error.contains(message), "{error} should contain {message}");
            }
        }
    }
}
