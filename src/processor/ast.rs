//! High-level AST for one cutscene script *before* it is lowered to byte-code.

use std::fmt;

/// Per-compile identity of an expression node, used to key side tables
/// such as the type checker's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

/// A name together with the place it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub at: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub name: Ident,
    pub count: Option<u32>,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(count) => write!(f, "{}[{}]", self.name.name, count),
            None => write!(f, "{}", self.name.name),
        }
    }
}

impl DataType {
    /// Types compare by spelling, not by where they were written.
    pub fn same_as(&self, other: &DataType) -> bool {
        self.name.name == other.name.name && self.count == other.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Scene,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: Ident,
    pub data_type: DataType,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn priority(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::Greater | BinaryOp::Less | BinaryOp::GreaterEqual | BinaryOp::LessEqual => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::And)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Greater
                | BinaryOp::Less
                | BinaryOp::GreaterEqual
                | BinaryOp::LessEqual
        )
    }
}

/// `"text {expr} more"` – `segments` always has one more entry than
/// `interpolations`.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub segments: Vec<String>,
    pub interpolations: Vec<Expr>,
}

impl StringLiteral {
    pub fn is_plain(&self) -> bool {
        self.interpolations.is_empty()
    }

    /// The literal text when there is nothing to interpolate.
    pub fn plain_text(&self) -> Option<&str> {
        if self.is_plain() {
            self.segments.first().map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier(String),
    Int(i32),
    Float(f64),
    Str(StringLiteral),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    /// Offset of the token diagnostics should point at (the operator for
    /// unary/binary nodes).
    pub at: usize,
    pub kind: ExprKind,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => write!(f, "{name}"),
            ExprKind::Int(value) => write!(f, "{value}"),
            ExprKind::Float(value) => write!(f, "{value:?}"),
            ExprKind::Str(literal) => {
                write!(f, "\"")?;
                for (idx, segment) in literal.segments.iter().enumerate() {
                    write!(f, "{segment}")?;
                    if let Some(expr) = literal.interpolations.get(idx) {
                        write!(f, "{{{expr}}}")?;
                    }
                }
                write!(f, "\"")
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate => write!(f, "-{operand}"),
                UnaryOp::Not => write!(f, "not {operand}"),
            },
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub at: usize,
    pub condition: Expr,
    pub then_block: Vec<Statement>,
    /// `elif` chains are stored as an else block holding a single nested if.
    pub else_block: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepCall {
    pub name: Ident,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = expr;`
    Assignment { name: Ident, value: Expr },

    /// `if <expr> then … [elif … then …] [else …] end`
    If(IfStatement),

    /// `say "hello";`, `delay 1.5;` … – a built-in game action.
    Step(StepCall),
}

/// One parsed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub globals: Vec<VariableDeclaration>,
    pub scene: Vec<VariableDeclaration>,
    pub locals: Vec<VariableDeclaration>,
    pub statements: Vec<Statement>,
}
