//! Stack byte-code for the VM's expression evaluator.
//!
//! Binary opcodes pop `a` (top of stack) then `b` and push `a op b`, so the
//! right operand is emitted first.  `<` and `<=` have no opcode of their own
//! and are emitted as `>`/`>=` with the operands swapped.

use thiserror::Error;

use super::ast::{BinaryOp, Expr, ExprKind, Scope, UnaryOp};
use super::evaluator::{Constant, StaticEvaluator};
use super::layout::{LayoutEntry, StorageType, TypeSchema, VariableContext};
use super::source::{CompileError, Diagnostics, Source};
use super::types::{TypeChecker, TypeTable, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExprOpcode {
    End = 0,
    LoadLocal = 1,
    LoadScene = 2,
    LoadGlobal = 3,
    LoadLiteral = 4,
    And = 5,
    Or = 6,
    Not = 7,
    Eq = 8,
    Neq = 9,
    Gt = 10,
    Gte = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Negate = 16,
    Gtf = 17,
    Gtef = 18,
    Addf = 19,
    Subf = 20,
    Mulf = 21,
    Divf = 22,
    Negatef = 23,
    Itof = 24,
    Ftoi = 25,
}

impl ExprOpcode {
    pub fn load(scope: Scope) -> Self {
        match scope {
            Scope::Local => ExprOpcode::LoadLocal,
            Scope::Scene => ExprOpcode::LoadScene,
            Scope::Global => ExprOpcode::LoadGlobal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExprInstruction {
    Op(ExprOpcode),
    Load {
        opcode: ExprOpcode,
        type_tag: u16,
        word_offset: u16,
    },
    Int(i32),
    Float(f32),
}

impl ExprInstruction {
    pub fn opcode(&self) -> ExprOpcode {
        match self {
            ExprInstruction::Op(op) => *op,
            ExprInstruction::Load { opcode, .. } => *opcode,
            ExprInstruction::Int(_) | ExprInstruction::Float(_) => ExprOpcode::LoadLiteral,
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match self {
            ExprInstruction::Op(_) => {}
            ExprInstruction::Load {
                type_tag,
                word_offset,
                ..
            } => {
                out.extend_from_slice(&type_tag.to_be_bytes());
                out.extend_from_slice(&word_offset.to_be_bytes());
            }
            ExprInstruction::Int(value) => out.extend_from_slice(&value.to_be_bytes()),
            ExprInstruction::Float(value) => out.extend_from_slice(&value.to_bits().to_be_bytes()),
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            ExprInstruction::Op(_) => 1,
            _ => 5,
        }
    }
}

/// An instruction sequence; the terminating `END` is only added on
/// serialisation so scripts can be appended to one another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionScript {
    pub instructions: Vec<ExprInstruction>,
}

impl ExpressionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn push(&mut self, instruction: ExprInstruction) {
        self.instructions.push(instruction);
    }

    pub fn append(&mut self, other: ExpressionScript) {
        self.instructions.extend(other.instructions);
    }

    /// Bytes of the instructions plus `END`.
    pub fn byte_len(&self) -> usize {
        self.instructions.iter().map(|i| i.byte_len()).sum::<usize>() + 1
    }

    /// `"EXPR"`, u16 byte length, instructions, `END`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerateError> {
        let len = u16::try_from(self.byte_len()).map_err(|_| GenerateError::TooLong {
            len: self.byte_len(),
        })?;

        let mut out = Vec::with_capacity(self.byte_len() + 6);
        out.extend_from_slice(b"EXPR");
        out.extend_from_slice(&len.to_be_bytes());
        for instruction in &self.instructions {
            instruction.write(&mut out);
        }
        out.push(ExprOpcode::End as u8);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("cannot convert {from} to {to}")]
    Conversion {
        at: usize,
        from: ValueType,
        to: ValueType,
    },
    #[error("the variable {name} is not defined")]
    Undefined { at: usize, name: String },
    #[error("the variable {name} is outside the addressable range")]
    OutOfRange { at: usize, name: String },
    #[error("expression is too long, {len} bytes")]
    TooLong { len: usize },
}

impl GenerateError {
    pub fn at(&self) -> Option<usize> {
        match self {
            GenerateError::Conversion { at, .. }
            | GenerateError::Undefined { at, .. }
            | GenerateError::OutOfRange { at, .. } => Some(*at),
            GenerateError::TooLong { .. } => None,
        }
    }

    pub fn report(&self, diagnostics: &mut Diagnostics, source: &Source, fallback: usize) {
        diagnostics.report(source, &self.to_string(), self.at().unwrap_or(fallback));
    }
}

pub struct ExpressionGenerator<'a> {
    context: &'a VariableContext,
    types: &'a TypeTable,
    evaluator: StaticEvaluator<'a>,
}

impl<'a> ExpressionGenerator<'a> {
    pub fn new(
        context: &'a VariableContext,
        types: &'a TypeTable,
        schema: &'a dyn TypeSchema,
    ) -> Self {
        Self {
            context,
            types,
            evaluator: StaticEvaluator::new(schema),
        }
    }

    pub fn type_of(&self, expr: &Expr) -> Option<ValueType> {
        self.types.get(expr)
    }

    pub fn evaluator(&self) -> &StaticEvaluator<'a> {
        &self.evaluator
    }

    /// Emits `expr` and converts the result to `to`.
    pub fn generate_to_type(
        &self,
        expr: &Expr,
        to: ValueType,
        script: &mut ExpressionScript,
    ) -> Result<(), GenerateError> {
        if to != ValueType::Str {
            if let Some(value) = self.evaluator.evaluate(expr) {
                script.push(literal(value, to));
                return Ok(());
            }
        }

        let from = self.type_of(expr).unwrap_or(to);
        let conversion = match (from, to) {
            (a, b) if a == b => None,
            (ValueType::Int, ValueType::Float) => Some(ExprOpcode::Itof),
            (ValueType::Float, ValueType::Int) => Some(ExprOpcode::Ftoi),
            _ => {
                return Err(GenerateError::Conversion {
                    at: expr.at,
                    from,
                    to,
                });
            }
        };

        self.generate(expr, script)?;
        if let Some(op) = conversion {
            script.push(ExprInstruction::Op(op));
        }
        Ok(())
    }

    pub fn generate(&self, expr: &Expr, script: &mut ExpressionScript) -> Result<(), GenerateError> {
        let value_type = self.type_of(expr).unwrap_or(ValueType::Int);

        if let Some(value) = self.evaluator.evaluate(expr) {
            script.push(literal(value, value_type));
            return Ok(());
        }

        match &expr.kind {
            ExprKind::Identifier(name) => self.load(name, expr.at, script),
            ExprKind::Int(_) | ExprKind::Float(_) => Ok(()),
            ExprKind::Str(_) => Err(GenerateError::Conversion {
                at: expr.at,
                from: ValueType::Str,
                to: ValueType::Int,
            }),
            ExprKind::Unary { op, operand } => {
                self.generate(operand, script)?;
                script.push(ExprInstruction::Op(match (op, value_type) {
                    (UnaryOp::Negate, ValueType::Float) => ExprOpcode::Negatef,
                    (UnaryOp::Negate, _) => ExprOpcode::Negate,
                    (UnaryOp::Not, _) => ExprOpcode::Not,
                }));
                Ok(())
            }
            ExprKind::Binary { op, left, right } => {
                self.binary(*op, left, right, value_type, script)
            }
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        value_type: ValueType,
        script: &mut ExpressionScript,
    ) -> Result<(), GenerateError> {
        let operand_type = if op.is_comparison()
            && (self.type_of(left) == Some(ValueType::Float)
                || self.type_of(right) == Some(ValueType::Float))
        {
            ValueType::Float
        } else if op.is_comparison() || op.is_logical() {
            ValueType::Int
        } else {
            value_type
        };

        let (first, second) = match op {
            BinaryOp::Less | BinaryOp::LessEqual => (left, right),
            _ => (right, left),
        };
        self.generate_to_type(first, operand_type, script)?;
        self.generate_to_type(second, operand_type, script)?;

        let float = operand_type == ValueType::Float;
        let opcode = match op {
            BinaryOp::And => ExprOpcode::And,
            BinaryOp::Or => ExprOpcode::Or,
            BinaryOp::Equal => ExprOpcode::Eq,
            BinaryOp::NotEqual => ExprOpcode::Neq,
            BinaryOp::Greater | BinaryOp::Less if float => ExprOpcode::Gtf,
            BinaryOp::Greater | BinaryOp::Less => ExprOpcode::Gt,
            BinaryOp::GreaterEqual | BinaryOp::LessEqual if float => ExprOpcode::Gtef,
            BinaryOp::GreaterEqual | BinaryOp::LessEqual => ExprOpcode::Gte,
            BinaryOp::Add if float => ExprOpcode::Addf,
            BinaryOp::Add => ExprOpcode::Add,
            BinaryOp::Sub if float => ExprOpcode::Subf,
            BinaryOp::Sub => ExprOpcode::Sub,
            BinaryOp::Mul if float => ExprOpcode::Mulf,
            BinaryOp::Mul => ExprOpcode::Mul,
            BinaryOp::Div if float => ExprOpcode::Divf,
            BinaryOp::Div => ExprOpcode::Div,
        };
        script.push(ExprInstruction::Op(opcode));
        Ok(())
    }

    fn load(&self, name: &str, at: usize, script: &mut ExpressionScript) -> Result<(), GenerateError> {
        let (scope, entry) = self
            .context
            .resolve(name)
            .ok_or_else(|| GenerateError::Undefined {
                at,
                name: name.to_string(),
            })?;

        script.push(load_instruction(ExprOpcode::load(scope), entry).ok_or_else(|| {
            GenerateError::OutOfRange {
                at,
                name: name.to_string(),
            }
        })?);
        Ok(())
    }
}

fn literal(value: Constant, as_type: ValueType) -> ExprInstruction {
    match as_type {
        ValueType::Float => ExprInstruction::Float(value.as_f64() as f32),
        _ => ExprInstruction::Int(value.as_i32()),
    }
}

/// Type tag and word offset as addressed by loads and stores.  Scalar chars
/// are addressed as `i8`.
pub fn variable_address(entry: &LayoutEntry) -> Option<(u16, u16)> {
    let tag = match (entry.storage, entry.count) {
        (StorageType::Char, None) => StorageType::I8.type_tag(),
        (storage, _) => storage.type_tag(),
    };
    let word = u16::try_from(entry.word_offset()).ok()?;
    Some((tag, word))
}

fn load_instruction(opcode: ExprOpcode, entry: &LayoutEntry) -> Option<ExprInstruction> {
    let (type_tag, word_offset) = variable_address(entry)?;
    Some(ExprInstruction::Load {
        opcode,
        type_tag,
        word_offset,
    })
}

/// Checks, folds and generates a standalone expression, e.g. a spawn
/// condition attached to an object by an exporter.  With `expected` set the
/// result is converted to that type.
pub fn generate_condition(
    expr: &Expr,
    context: &VariableContext,
    schema: &dyn TypeSchema,
    source: &Source,
    expected: Option<ValueType>,
) -> Result<ExpressionScript, CompileError> {
    let mut checker = TypeChecker::new(context, schema, source);
    let actual = checker.check(expr);
    let types = checker.finish()?;

    let generator = ExpressionGenerator::new(context, &types, schema);
    let mut script = ExpressionScript::new();

    let result = match (expected, actual) {
        (Some(to), Some(from)) if to != from => generator.generate_to_type(expr, to, &mut script),
        _ => generator.generate(expr, &mut script),
    };

    let mut diagnostics = Diagnostics::new();
    if let Err(err) = result {
        err.report(&mut diagnostics, source, expr.at);
    }
    diagnostics.finish(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::layout::{self, BuiltinTypes};
    use crate::processor::script_parser::{parse, parse_expression};

    use ExprInstruction::{Float, Int, Load, Op};
    use ExprOpcode::*;

    fn context() -> VariableContext {
        let source = Source::new(
            "global g: i32; scene s: bool; local a: i32; local b: i32; local f: float; local t: char[4];",
            "decls",
        );
        let program = parse(&source).expect("parses");
        VariableContext::new(
            layout::build(&program.globals, &source, &BuiltinTypes).expect("globals"),
            layout::build(&program.scene, &source, &BuiltinTypes).expect("scene"),
            layout::build(&program.locals, &source, &BuiltinTypes).expect("locals"),
        )
    }

    fn generate(src: &str, expected: Option<ValueType>) -> Vec<ExprInstruction> {
        let source = Source::new(src, "test");
        let expr = parse_expression(&source).expect("parses");
        generate_condition(&expr, &context(), &BuiltinTypes, &source, expected)
            .expect("generates")
            .instructions
    }

    // locals: t char 0..32, a 32..64, b 64..96, f 96..128
    fn local(tag: u16, word: u16) -> ExprInstruction {
        Load {
            opcode: LoadLocal,
            type_tag: tag,
            word_offset: word,
        }
    }

    #[test]
    fn test_generate() {
        let test_cases = vec![
            ("3 + 4", vec![Int(7)]),
            ("7 / 2", vec![Int(3)]),
            ("7.0 / 2", vec![Float(3.5)]),
            ("a", vec![local(3, 1)]),
            ("a - b", vec![local(3, 2), local(3, 1), Op(Sub)]),
            ("a < b", vec![local(3, 1), local(3, 2), Op(Gt)]),
            ("a <= b", vec![local(3, 1), local(3, 2), Op(Gte)]),
            ("a > b", vec![local(3, 2), local(3, 1), Op(Gt)]),
            ("a + f", vec![local(5, 3), local(3, 1), Op(Itof), Op(Addf)]),
            ("a < f", vec![local(3, 1), Op(Itof), local(5, 3), Op(Gtf)]),
            ("a == 1.5", vec![Float(1.5), local(3, 1), Op(Itof), Op(Eq)]),
            ("a != 2", vec![Int(2), local(3, 1), Op(Neq)]),
            ("-f", vec![local(5, 3), Op(Negatef)]),
            ("-a", vec![local(3, 1), Op(Negate)]),
            ("not s", vec![
                Load {
                    opcode: LoadScene,
                    type_tag: 4,
                    word_offset: 0,
                },
                Op(Not),
            ]),
            ("g and a", vec![
                local(3, 1),
                Load {
                    opcode: LoadGlobal,
                    type_tag: 3,
                    word_offset: 0,
                },
                Op(And),
            ]),
            ("a * (1 + 2)", vec![Int(3), local(3, 1), Op(Mul)]),
            ("t", vec![local(6, 0)]),
        ];

        for (src, expected) in test_cases {
            assert_eq!(generate(src, None), expected, "source: {src}");
        }
    }

    #[test]
    fn test_expected_type_conversion() {
        assert_eq!(generate("f", Some(ValueType::Int)), vec![local(5, 3), Op(Ftoi)]);
        assert_eq!(generate("a", Some(ValueType::Float)), vec![local(3, 1), Op(Itof)]);
        assert_eq!(generate("1", Some(ValueType::Float)), vec![Float(1.0)]);
        assert_eq!(generate("f > 1", None), vec![Float(1.0), local(5, 3), Op(Gtf)]);
        assert_eq!(generate("a", Some(ValueType::Int)), vec![local(3, 1)]);
    }

    #[test]
    fn test_condition_errors() {
        let source = Source::new("t", "test");
        let expr = parse_expression(&source).expect("parses");
        let err = generate_condition(&expr, &context(), &BuiltinTypes, &source, Some(ValueType::Int))
            .unwrap_err();
        assert!(err.to_string().contains("cannot convert str to int"), "{err}");

        let source = Source::new("q > 1", "test");
        let expr = parse_expression(&source).expect("parses");
        let err = generate_condition(&expr, &context(), &BuiltinTypes, &source, None).unwrap_err();
        assert!(err.to_string().contains("the variable q is not defined"));
    }

    #[test]
    fn test_serialise() {
        let mut script = ExpressionScript::new();
        script.push(Int(7));
        script.push(local(3, 1));
        script.push(Op(Add));
        assert_eq!(script.byte_len(), 12);
        assert_eq!(
            script.to_bytes().expect("fits"),
            vec![
                b'E', b'X', b'P', b'R', 0, 12, 4, 0, 0, 0, 7, 1, 0, 3, 0, 1, 12, 0
            ]
        );

        let mut float = ExpressionScript::new();
        float.push(Float(1.0));
        assert_eq!(
            float.to_bytes().expect("fits"),
            vec![b'E', b'X', b'P', b'R', 0, 6, 4, 0x3f, 0x80, 0, 0, 0]
        );
    }

    #[test]
    fn test_append() {
        let mut first = ExpressionScript::new();
        first.push(Int(1));
        let mut second = ExpressionScript::new();
        second.push(Int(2));
        first.append(second);
        assert_eq!(first.instructions, vec![Int(1), Int(2)]);
        assert_eq!(first.byte_len(), 11);
    }
}
