//! Type checking of script expressions.
//!
//! Every node gets one of three value types.  Errors are collected rather
//! than returned so a single pass reports every mismatch in the script.

use std::collections::HashMap;
use std::fmt;

use super::ast::{BinaryOp, Expr, ExprId, ExprKind, Program, Statement, UnaryOp};
use super::evaluator::StaticEvaluator;
use super::layout::{StorageType, TypeSchema, VariableContext};
use super::source::{CompileError, Diagnostics, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    Str,
}

impl ValueType {
    pub fn is_numerical(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
        })
    }
}

/// Result of one checking pass, keyed by expression id.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<ExprId, ValueType>,
}

impl TypeTable {
    pub fn get(&self, expr: &Expr) -> Option<ValueType> {
        self.types.get(&expr.id).copied()
    }

    fn insert(&mut self, expr: &Expr, value: ValueType) {
        self.types.insert(expr.id, value);
    }
}

pub struct TypeChecker<'a> {
    context: &'a VariableContext,
    evaluator: StaticEvaluator<'a>,
    source: &'a Source,
    table: TypeTable,
    diagnostics: Diagnostics,
}

impl<'a> TypeChecker<'a> {
    pub fn new(context: &'a VariableContext, schema: &'a dyn TypeSchema, source: &'a Source) -> Self {
        Self {
            context,
            evaluator: StaticEvaluator::new(schema),
            source,
            table: TypeTable::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Checks every expression reachable from the statement list.
    pub fn check_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            match statement {
                Statement::Assignment { value, .. } => {
                    self.check(value);
                }
                Statement::If(branch) => {
                    self.check(&branch.condition);
                    self.check_statements(&branch.then_block);
                    if let Some(else_block) = &branch.else_block {
                        self.check_statements(else_block);
                    }
                }
                Statement::Step(step) => {
                    for arg in &step.args {
                        self.check(arg);
                    }
                }
            }
        }
    }

    /// Determines the type of `expr`, recording it (and every sub-expression)
    /// in the table.  `None` means an error was reported somewhere below.
    pub fn check(&mut self, expr: &Expr) -> Option<ValueType> {
        let result = self.determine(expr);
        if let Some(value) = result {
            self.table.insert(expr, value);
        }
        result
    }

    fn report(&mut self, message: &str, at: usize) -> Option<ValueType> {
        self.diagnostics.report(self.source, message, at);
        None
    }

    fn determine(&mut self, expr: &Expr) -> Option<ValueType> {
        match &expr.kind {
            ExprKind::Int(_) => Some(ValueType::Int),
            ExprKind::Float(_) => Some(ValueType::Float),
            ExprKind::Str(literal) => {
                for interpolation in &literal.interpolations {
                    self.check(interpolation);
                }
                Some(ValueType::Str)
            }
            ExprKind::Identifier(name) => self.identifier(name, expr.at),
            ExprKind::Unary { op, operand } => {
                let operand_type = self.check(operand)?;
                match op {
                    UnaryOp::Negate if operand_type.is_numerical() => Some(operand_type),
                    UnaryOp::Not if operand_type == ValueType::Int => Some(ValueType::Int),
                    _ => self.report(
                        &format!("operator does not apply to {operand_type}"),
                        expr.at,
                    ),
                }
            }
            ExprKind::Binary { op, left, right } => {
                // both sides are checked so errors in each are reported
                let a = self.check(left);
                let b = self.check(right);
                let (a, b) = (a?, b?);
                self.binary(*op, a, b, expr.at)
            }
        }
    }

    fn identifier(&mut self, name: &str, at: usize) -> Option<ValueType> {
        if self.evaluator.named_constant(name).is_some() {
            return Some(ValueType::Int);
        }

        let Some((_, entry)) = self.context.resolve(name) else {
            return self.report(&format!("the variable {name} is not defined"), at);
        };

        match (entry.storage, entry.count) {
            (StorageType::Char, Some(_)) => Some(ValueType::Str),
            (StorageType::Float, None) => Some(ValueType::Float),
            (_, None) => Some(ValueType::Int),
            (_, Some(_)) => self.report(&format!("unknown type {}", entry.type_name), at),
        }
    }

    fn binary(&mut self, op: BinaryOp, a: ValueType, b: ValueType, at: usize) -> Option<ValueType> {
        if op.is_logical() {
            if a != ValueType::Int || b != ValueType::Int {
                return self.report(&format!("operator only applies to int types got {a} {b}"), at);
            }
            return Some(ValueType::Int);
        }

        if !a.is_numerical() || !b.is_numerical() {
            return self.report(
                &format!("operator only applies to numerical types got {a} {b}"),
                at,
            );
        }

        if op.is_comparison() {
            Some(ValueType::Int)
        } else if a == ValueType::Float || b == ValueType::Float {
            Some(ValueType::Float)
        } else {
            Some(ValueType::Int)
        }
    }

    pub fn into_parts(self) -> (TypeTable, Diagnostics) {
        (self.table, self.diagnostics)
    }

    pub fn finish(self) -> Result<TypeTable, CompileError> {
        self.diagnostics.finish(self.table)
    }
}

/// Checks a whole program against its variable context.  The table holds
/// every expression that type checked, even when others did not.
pub fn check_program(
    program: &Program,
    context: &VariableContext,
    schema: &dyn TypeSchema,
    source: &Source,
) -> (TypeTable, Diagnostics) {
    let mut checker = TypeChecker::new(context, schema, source);
    checker.check_statements(&program.statements);
    checker.into_parts()
}
