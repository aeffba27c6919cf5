//! Hand-written lexer for the cutscene script language.
//!
//! The lexer is a small explicit state machine: every state owns one
//! transition function that looks at the next character (or end of input)
//! and decides the following state and whether the token that ended *before*
//! that character should be emitted.  Keywords are not recognised here –
//! `if`, `global`, `and` … all come out as `Identifier` and the parser
//! interprets them later.
//
//  Lexical items:
//
//      Identifier ::= [A-Za-z_][A-Za-z0-9_]*
//      Int        ::= [0-9]+
//      Float      ::= [0-9]* '.' [0-9]*
//      Str        ::= '"' ( '\' any | [^"\\] )* '"'
//      Symbols    ::= + - * / : [ ] ( ) , ; = == != > >= < <=
//      Comment    ::= '#' .* until end of line
//
//  Whitespace and comments are emitted as tokens too so the parser can see
//  them when it wants to; it normally skips them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Identifier,
    Int,
    Float,
    Str,
    Plus,
    Minus,
    Star,
    Slash,
    Colon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Assign,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Error,
    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Identifier => "identifier",
            TokenKind::Int => "int",
            TokenKind::Float => "float",
            TokenKind::Str => "string",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Colon => ":",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Assign => "=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Error => "error",
            TokenKind::Eof => "eof",
        }
    }

    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the first character in the source.
    pub at: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Whitespace,
    Comment,
    Identifier,
    Integer,
    Float,
    Str,
    StrEscape,
    StrEnd,
    Single(TokenKind),
    Assign,
    Bang,
    Greater,
    Less,
    Error,
}

type Transition = (State, Option<TokenKind>);

impl State {
    fn transition(self, c: Option<char>) -> Transition {
        match self {
            State::Start => (start(c), None),
            State::Whitespace => whitespace(c),
            State::Comment => comment(c),
            State::Identifier => identifier(c),
            State::Integer => integer(c),
            State::Float => float(c),
            State::Str => string(c),
            State::StrEscape => string_escape(c),
            State::StrEnd => (start(c), Some(TokenKind::Str)),
            State::Single(kind) => (start(c), Some(kind)),
            State::Assign => paired(c, TokenKind::Equal, TokenKind::Assign),
            State::Bang => match c {
                Some('=') => (State::Single(TokenKind::NotEqual), None),
                _ => error(c),
            },
            State::Greater => paired(c, TokenKind::GreaterEqual, TokenKind::Greater),
            State::Less => paired(c, TokenKind::LessEqual, TokenKind::Less),
            State::Error => error(c),
        }
    }
}

/// Picks the state for a token starting with `c`.
fn start(c: Option<char>) -> State {
    let Some(c) = c else {
        return State::Start;
    };
    match c {
        '"' => State::Str,
        '#' => State::Comment,
        c if c.is_whitespace() => State::Whitespace,
        c if c.is_ascii_alphabetic() || c == '_' => State::Identifier,
        c if c.is_ascii_digit() => State::Integer,
        '.' => State::Float,
        '+' => State::Single(TokenKind::Plus),
        '-' => State::Single(TokenKind::Minus),
        '*' => State::Single(TokenKind::Star),
        '/' => State::Single(TokenKind::Slash),
        ':' => State::Single(TokenKind::Colon),
        '[' => State::Single(TokenKind::LBracket),
        ']' => State::Single(TokenKind::RBracket),
        '(' => State::Single(TokenKind::LParen),
        ')' => State::Single(TokenKind::RParen),
        ',' => State::Single(TokenKind::Comma),
        ';' => State::Single(TokenKind::Semicolon),
        '=' => State::Assign,
        '!' => State::Bang,
        '>' => State::Greater,
        '<' => State::Less,
        _ => State::Error,
    }
}

fn whitespace(c: Option<char>) -> Transition {
    match c {
        Some(c) if c.is_whitespace() => (State::Whitespace, None),
        _ => (start(c), Some(TokenKind::Whitespace)),
    }
}

fn comment(c: Option<char>) -> Transition {
    match c {
        Some('\n') | None => (start(c), Some(TokenKind::Comment)),
        Some(_) => (State::Comment, None),
    }
}

fn identifier(c: Option<char>) -> Transition {
    match c {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => (State::Identifier, None),
        _ => (start(c), Some(TokenKind::Identifier)),
    }
}

fn integer(c: Option<char>) -> Transition {
    match c {
        Some(c) if c.is_ascii_digit() => (State::Integer, None),
        Some('.') => (State::Float, None),
        _ => (start(c), Some(TokenKind::Int)),
    }
}

fn float(c: Option<char>) -> Transition {
    match c {
        Some(c) if c.is_ascii_digit() => (State::Float, None),
        _ => (start(c), Some(TokenKind::Float)),
    }
}

fn string(c: Option<char>) -> Transition {
    match c {
        Some('\\') => (State::StrEscape, None),
        Some('"') => (State::StrEnd, None),
        Some(_) => (State::Str, None),
        None => error(c),
    }
}

fn string_escape(c: Option<char>) -> Transition {
    match c {
        Some(_) => (State::Str, None),
        None => error(c),
    }
}

fn paired(c: Option<char>, with_equal: TokenKind, alone: TokenKind) -> Transition {
    match c {
        Some('=') => (State::Single(with_equal), None),
        _ => (start(c), Some(alone)),
    }
}

/// Sink state: swallows the rest of the input and emits one `Error` token.
fn error(c: Option<char>) -> Transition {
    match c {
        None => (State::Error, Some(TokenKind::Error)),
        Some(_) => (State::Error, None),
    }
}

/// Splits `content` into tokens, always ending with `Eof`.
///
/// Malformed input never fails here; it produces a trailing `Error` token
/// that the caller must check for.
pub fn tokenize(content: &str) -> Vec<Token> {
    let mut result = Vec::new();
    let mut chars = content.char_indices().peekable();

    let mut state = start(chars.peek().map(|&(_, c)| c));
    let mut last_start = 0;

    // the first character is already consumed by `start`
    chars.next();

    loop {
        let (idx, c) = match chars.next() {
            Some((idx, c)) => (idx, Some(c)),
            None => (content.len(), None),
        };

        let (next_state, emit) = state.transition(c);

        if let Some(kind) = emit {
            result.push(Token {
                kind,
                text: content[last_start..idx].to_string(),
                at: last_start,
            });
            last_start = idx;
        }

        state = next_state;

        if c.is_none() {
            break;
        }
    }

    result.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        at: content.len(),
    });

    result
}
