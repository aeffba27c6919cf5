//! Compile-time constant folding.
//!
//! Purely structural: literals, `true`/`false`, enum constants from the type
//! schema and arithmetic over them fold; variables and strings never do.

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::layout::TypeSchema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f64),
}

impl Constant {
    pub fn as_f64(self) -> f64 {
        match self {
            Constant::Int(v) => v as f64,
            Constant::Float(v) => v,
        }
    }

    /// Float constants truncate toward zero, like the VM's float-to-int.
    pub fn as_i32(self) -> i32 {
        match self {
            Constant::Int(v) => v,
            Constant::Float(v) => v as i32,
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Constant::Int(v) => v != 0,
            Constant::Float(v) => v != 0.0,
        }
    }
}

fn flag(value: bool) -> Constant {
    Constant::Int(value as i32)
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i32, b: i32) -> i32 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

pub struct StaticEvaluator<'a> {
    schema: &'a dyn TypeSchema,
}

impl<'a> StaticEvaluator<'a> {
    pub fn new(schema: &'a dyn TypeSchema) -> Self {
        Self { schema }
    }

    /// Named integer constants: the boolean literals plus schema enums.
    pub fn named_constant(&self, name: &str) -> Option<i32> {
        match name {
            "true" => Some(1),
            "false" => Some(0),
            _ => self.schema.constant(name),
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Option<Constant> {
        match &expr.kind {
            ExprKind::Int(value) => Some(Constant::Int(*value)),
            ExprKind::Float(value) => Some(Constant::Float(*value)),
            ExprKind::Str(_) => None,
            ExprKind::Identifier(name) => self.named_constant(name).map(Constant::Int),
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                Some(match (op, value) {
                    (UnaryOp::Negate, Constant::Int(v)) => Constant::Int(v.wrapping_neg()),
                    (UnaryOp::Negate, Constant::Float(v)) => Constant::Float(-v),
                    (UnaryOp::Not, v) => flag(!v.is_truthy()),
                })
            }
            ExprKind::Binary { op, left, right } => {
                let a = self.evaluate(left)?;
                let b = self.evaluate(right)?;
                fold_binary(*op, a, b)
            }
        }
    }
}

fn fold_binary(op: BinaryOp, a: Constant, b: Constant) -> Option<Constant> {
    use Constant::{Float, Int};

    let result = match op {
        BinaryOp::And => flag(a.is_truthy() && b.is_truthy()),
        BinaryOp::Or => flag(a.is_truthy() || b.is_truthy()),
        BinaryOp::Equal => flag(a.as_f64() == b.as_f64()),
        BinaryOp::NotEqual => flag(a.as_f64() != b.as_f64()),
        BinaryOp::Greater => flag(a.as_f64() > b.as_f64()),
        BinaryOp::Less => flag(a.as_f64() < b.as_f64()),
        BinaryOp::GreaterEqual => flag(a.as_f64() >= b.as_f64()),
        BinaryOp::LessEqual => flag(a.as_f64() <= b.as_f64()),
        BinaryOp::Add => match (a, b) {
            (Int(x), Int(y)) => Int(x.wrapping_add(y)),
            _ => Float(a.as_f64() + b.as_f64()),
        },
        BinaryOp::Sub => match (a, b) {
            (Int(x), Int(y)) => Int(x.wrapping_sub(y)),
            _ => Float(a.as_f64() - b.as_f64()),
        },
        BinaryOp::Mul => match (a, b) {
            (Int(x), Int(y)) => Int(x.wrapping_mul(y)),
            _ => Float(a.as_f64() * b.as_f64()),
        },
        BinaryOp::Div => match (a, b) {
            // left to the runtime
            (_, Int(0)) => return None,
            (_, Float(y)) if y == 0.0 => return None,
            (Int(x), Int(y)) => Int(floor_div(x, y)),
            _ => Float(a.as_f64() / b.as_f64()),
        },
    };

    Some(result)
}
