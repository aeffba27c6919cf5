//! Parser that consumes the lexer and builds a `Program` AST.
//!
//! The parser stops at the first syntax error; semantic checks happen in
//! later passes.

use super::ast::*;
use super::lexer::{Token, TokenKind, tokenize};
use super::source::{CompileError, Source};

const KEYWORDS: &[&str] = &[
    "global", "scene", "local", "if", "then", "elif", "else", "end", "and", "or", "not",
];

/// Parses a whole cutscene script.
pub fn parse(source: &Source) -> Result<Program, CompileError> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parses a single standalone expression, e.g. an object's spawn condition.
pub fn parse_expression(source: &Source) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    parser.require(TokenKind::Eof)?;
    Ok(expr)
}

/// Parses a type spelling such as `i32` or `char[16]`.
pub fn parse_type(text: &str) -> Result<DataType, CompileError> {
    let source = Source::new(text, "<type>");
    let mut parser = Parser::new(&source)?;
    let data_type = parser.parse_type()?;
    parser.require(TokenKind::Eof)?;
    Ok(data_type)
}

struct Parser<'a> {
    source: &'a Source,
    tokens: Vec<Token>,
    eof: Token,
    current: usize,
    next_id: u32,
}

impl<'a> Parser<'a> {
    fn new(source: &'a Source) -> Result<Self, CompileError> {
        Self::with_tokens(source, tokenize(&source.content), 0)
    }

    fn with_tokens(
        source: &'a Source,
        tokens: Vec<Token>,
        next_id: u32,
    ) -> Result<Self, CompileError> {
        if let Some(error) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
            let message = if error.text.starts_with('"') {
                "string not terminated".to_string()
            } else {
                let c = error.text.chars().next().unwrap_or(' ');
                format!("unexpected character '{c}'")
            };
            return Err(CompileError::Lexical(source.format_message(&message, error.at)));
        }

        let eof = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Eof)
            .cloned()
            .unwrap_or(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                at: source.content.len(),
            });

        Ok(Self {
            source,
            tokens: tokens.into_iter().filter(|t| !t.kind.is_trivia()).collect(),
            eof,
            current: 0,
            next_id,
        })
    }

    // ── token helpers ──────────────────────────────────────────────────

    fn error<T>(&self, message: &str, at: usize) -> Result<T, CompileError> {
        Err(CompileError::Syntax(self.source.format_message(message, at)))
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.current + offset).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        let next = self.peek();
        next.kind == TokenKind::Identifier && next.text == keyword
    }

    fn describe(token: &Token) -> String {
        match token.kind {
            TokenKind::Eof => "eof".to_string(),
            _ => token.text.clone(),
        }
    }

    fn require(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        let next = self.peek();
        if next.kind != kind {
            return self.error(
                &format!("expected '{}' got '{}'", kind.describe(), Self::describe(next)),
                next.at,
            );
        }
        Ok(self.advance())
    }

    fn require_keyword(&mut self, keyword: &str) -> Result<Token, CompileError> {
        if !self.is_keyword(keyword) {
            let next = self.peek();
            return self.error(
                &format!("expected '{keyword}' got '{}'", Self::describe(next)),
                next.at,
            );
        }
        Ok(self.advance())
    }

    fn optional(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek().kind == kind {
            Some(self.advance())
        } else {
            None
        }
    }

    fn node(&mut self, at: usize, kind: ExprKind) -> Expr {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        Expr { id, at, kind }
    }

    // ── declarations ───────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Program, CompileError> {
        let mut program = Program::default();

        while self.peek().kind != TokenKind::Eof {
            let scope = match self.peek().text.as_str() {
                "global" if self.peek().kind == TokenKind::Identifier => Some(Scope::Global),
                "scene" if self.peek().kind == TokenKind::Identifier => Some(Scope::Scene),
                "local" if self.peek().kind == TokenKind::Identifier => Some(Scope::Local),
                _ => None,
            };

            match scope {
                Some(scope) => {
                    let declaration = self.parse_declaration()?;
                    match scope {
                        Scope::Global => program.globals.push(declaration),
                        Scope::Scene => program.scene.push(declaration),
                        Scope::Local => program.locals.push(declaration),
                    }
                }
                None => program.statements.push(self.parse_statement()?),
            }
        }

        Ok(program)
    }

    fn parse_declaration(&mut self) -> Result<VariableDeclaration, CompileError> {
        // scope keyword
        self.advance();
        let name = self.require(TokenKind::Identifier)?;
        self.require(TokenKind::Colon)?;
        let data_type = self.parse_type()?;

        let default = match self.optional(TokenKind::Assign) {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };

        self.require(TokenKind::Semicolon)?;

        Ok(VariableDeclaration {
            name: Ident {
                name: name.text,
                at: name.at,
            },
            data_type,
            default,
        })
    }

    fn parse_type(&mut self) -> Result<DataType, CompileError> {
        let name = self.require(TokenKind::Identifier)?;
        let mut count = None;

        if self.optional(TokenKind::LBracket).is_some() {
            let size = self.require(TokenKind::Int)?;
            match size.text.parse::<u32>() {
                Ok(n) if n > 0 => count = Some(n),
                _ => return self.error("invalid array size", size.at),
            }
            self.require(TokenKind::RBracket)?;
        }

        Ok(DataType {
            name: Ident {
                name: name.text,
                at: name.at,
            },
            count,
        })
    }

    // ── statements ─────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, CompileError> {
        if self.is_keyword("if") {
            let keyword = self.advance();
            return Ok(Statement::If(self.parse_if_rest(keyword.at)?));
        }

        if self.peek().kind == TokenKind::Identifier && self.peek_at(1).kind == TokenKind::Assign {
            return self.parse_assignment();
        }

        self.parse_step()
    }

    /// Statements until one of `end`, `else`, `elif` or end of input.
    fn parse_block(&mut self) -> Result<Vec<Statement>, CompileError> {
        let mut result = Vec::new();

        while self.peek().kind != TokenKind::Eof
            && !self.is_keyword("end")
            && !self.is_keyword("else")
            && !self.is_keyword("elif")
        {
            result.push(self.parse_statement()?);
        }

        Ok(result)
    }

    /// Everything after an `if` or `elif` keyword.  The innermost branch of
    /// an elif chain consumes the single closing `end`.
    fn parse_if_rest(&mut self, at: usize) -> Result<IfStatement, CompileError> {
        let condition = self.parse_expression()?;
        self.require_keyword("then")?;
        let then_block = self.parse_block()?;

        let else_block = if self.is_keyword("elif") {
            let keyword = self.advance();
            let nested = self.parse_if_rest(keyword.at)?;
            Some(vec![Statement::If(nested)])
        } else if self.is_keyword("else") {
            self.advance();
            let block = self.parse_block()?;
            self.require_keyword("end")?;
            Some(block)
        } else {
            self.require_keyword("end")?;
            None
        };

        Ok(IfStatement {
            at,
            condition,
            then_block,
            else_block,
        })
    }

    fn parse_assignment(&mut self) -> Result<Statement, CompileError> {
        let name = self.require(TokenKind::Identifier)?;
        self.require(TokenKind::Assign)?;
        let value = self.parse_expression()?;
        self.require(TokenKind::Semicolon)?;

        Ok(Statement::Assignment {
            name: Ident {
                name: name.text,
                at: name.at,
            },
            value,
        })
    }

    fn parse_step(&mut self) -> Result<Statement, CompileError> {
        let name = self.require(TokenKind::Identifier)?;
        let mut args = Vec::new();

        if self.optional(TokenKind::Semicolon).is_none() {
            loop {
                args.push(self.parse_expression()?);
                if self.optional(TokenKind::Comma).is_none() {
                    self.require(TokenKind::Semicolon)?;
                    break;
                }
            }
        }

        Ok(Statement::Step(StepCall {
            name: Ident {
                name: name.text,
                at: name.at,
            },
            args,
        }))
    }

    // ── expressions ────────────────────────────────────────────────────

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary(0)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let next = self.peek();
        let op = match next.kind {
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Identifier if next.text == "and" => BinaryOp::And,
            TokenKind::Identifier if next.text == "or" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing.  The right operand is parsed one level tighter
    /// than the operator, so operators of equal priority associate left.
    fn parse_binary(&mut self, min_priority: u8) -> Result<Expr, CompileError> {
        let mut result = self.parse_unary()?;

        while let Some(op) = self.peek_binary_op() {
            if op.priority() < min_priority {
                break;
            }

            let operator = self.advance();
            let right = self.parse_binary(op.priority() + 1)?;

            result = self.node(
                operator.at,
                ExprKind::Binary {
                    op,
                    left: Box::new(result),
                    right: Box::new(right),
                },
            );
        }

        Ok(result)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = if self.peek().kind == TokenKind::Minus {
            Some(UnaryOp::Negate)
        } else if self.is_keyword("not") {
            Some(UnaryOp::Not)
        } else {
            None
        };

        match op {
            Some(op) => {
                let operator = self.advance();
                let operand = self.parse_unary()?;
                Ok(self.node(
                    operator.at,
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                ))
            }
            None => self.parse_single(),
        }
    }

    fn parse_single(&mut self) -> Result<Expr, CompileError> {
        let next = self.peek().clone();

        match next.kind {
            TokenKind::Identifier if !KEYWORDS.contains(&next.text.as_str()) => {
                self.advance();
                Ok(self.node(next.at, ExprKind::Identifier(next.text)))
            }
            TokenKind::Int => {
                self.advance();
                match next.text.parse::<i32>() {
                    Ok(value) => Ok(self.node(next.at, ExprKind::Int(value))),
                    Err(_) => self.error("integer literal out of range", next.at),
                }
            }
            TokenKind::Float => {
                self.advance();
                match next.text.parse::<f64>() {
                    Ok(value) => Ok(self.node(next.at, ExprKind::Float(value))),
                    Err(_) => self.error("invalid float literal", next.at),
                }
            }
            TokenKind::Str => {
                self.advance();
                self.parse_string(&next)
            }
            TokenKind::LParen => {
                self.advance();
                let result = self.parse_expression()?;
                self.require(TokenKind::RParen)?;
                Ok(result)
            }
            _ => self.error("expected expression", next.at),
        }
    }

    // ── string literals ────────────────────────────────────────────────

    fn parse_string(&mut self, token: &Token) -> Result<Expr, CompileError> {
        let body = &token.text[1..token.text.len() - 1];
        let chars = dedent(body, token.at + 1);

        let mut segments = Vec::new();
        let mut interpolations = Vec::new();
        let mut current = String::new();

        let mut i = 0;
        while i < chars.len() {
            let (at, c) = chars[i];
            match c {
                '\\' => {
                    i += 1;
                    if let Some(&(_, escaped)) = chars.get(i) {
                        current.push(match escaped {
                            'n' => '\n',
                            other => other,
                        });
                    }
                }
                '{' => {
                    let Some(close) = chars[i..].iter().position(|&(_, c)| c == '}') else {
                        return self.error("interpolation not terminated", at);
                    };
                    let close = i + close;
                    let expr = self.parse_interpolation(at + 1, chars[close].0)?;
                    segments.push(std::mem::take(&mut current));
                    interpolations.push(expr);
                    i = close;
                }
                c => current.push(c),
            }
            i += 1;
        }
        segments.push(current);

        Ok(self.node(
            token.at,
            ExprKind::Str(StringLiteral {
                segments,
                interpolations,
            }),
        ))
    }

    /// Parses the source between `{` and `}` as a nested expression.
    fn parse_interpolation(&mut self, start: usize, end: usize) -> Result<Expr, CompileError> {
        let mut tokens = tokenize(&self.source.content[start..end]);
        for token in &mut tokens {
            token.at += start;
        }

        let mut nested = Parser::with_tokens(self.source, tokens, self.next_id)?;
        if nested.peek().kind == TokenKind::Eof {
            return self.error("empty interpolation", start);
        }
        let expr = nested.parse_expression()?;

        let next = nested.peek();
        if next.kind != TokenKind::Eof {
            return self.error(
                &format!("expected '}}' got '{}'", Self::describe(next)),
                next.at,
            );
        }

        self.next_id = nested.next_id;
        Ok(expr)
    }
}

/// Heredoc-style indentation stripping for string bodies.
///
/// Only applies when the body starts with a newline.  That newline is
/// dropped, the leading spaces/tabs of the first line become the prefix,
/// and the prefix is removed from every line that starts with it.  Returns
/// the surviving characters with their absolute source offsets.
fn dedent(body: &str, base: usize) -> Vec<(usize, char)> {
    let chars: Vec<(usize, char)> = body.char_indices().map(|(i, c)| (base + i, c)).collect();

    let skip = if body.starts_with("\r\n") {
        2
    } else if body.starts_with('\n') {
        1
    } else {
        return chars;
    };

    let rest = &chars[skip..];
    let prefix: Vec<char> = rest
        .iter()
        .map(|&(_, c)| c)
        .take_while(|&c| c == ' ' || c == '\t')
        .collect();

    let mut result = Vec::with_capacity(rest.len());
    let mut i = 0;
    let mut line_start = true;

    while i < rest.len() {
        if line_start {
            line_start = false;
            let matches_prefix = rest[i..].len() >= prefix.len()
                && rest[i..i + prefix.len()]
                    .iter()
                    .zip(&prefix)
                    .all(|(&(_, c), &p)| c == p);
            if matches_prefix {
                i += prefix.len();
                continue;
            }
        }

        let (at, c) = rest[i];
        result.push((at, c));
        if c == '\n' {
            line_start = true;
        }
        i += 1;
    }

    result
}
