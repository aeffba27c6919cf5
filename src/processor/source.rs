//! Source text bookkeeping and the diagnostics every phase reports through.
//!
//! All messages share one layout:
//!
//! ```text
//! file:line:col: message
//! <the offending source line>
//!     ^
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub content: String,
    pub filename: String,
}

impl Source {
    pub fn new(content: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: filename.into(),
        }
    }

    /// 1-based line and column of a byte offset.
    pub fn location(&self, at: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (idx, c) in self.content.char_indices() {
            if idx >= at {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// The full line containing `at`, without its newline.
    pub fn line_text(&self, at: usize) -> &str {
        let at = at.min(self.content.len());
        let start = self.content[..at].rfind('\n').map_or(0, |i| i + 1);
        let end = self.content[at..]
            .find('\n')
            .map_or(self.content.len(), |i| at + i);
        self.content[start..end].trim_end_matches('\r')
    }

    pub fn format_message(&self, message: &str, at: usize) -> String {
        let (line, col) = self.location(at);
        let padding = " ".repeat(col - 1);
        format!(
            "{}:{}:{}: {}\n{}\n{}^",
            self.filename,
            line,
            col,
            message,
            self.line_text(at),
            padding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{0}")]
    Lexical(String),
    #[error("{0}")]
    Syntax(String),
    #[error("{}", .0.join("\n"))]
    Semantic(Vec<String>),
}

impl CompileError {
    pub fn messages(&self) -> Vec<&str> {
        match self {
            CompileError::Lexical(m) | CompileError::Syntax(m) => vec![m.as_str()],
            CompileError::Semantic(all) => all.iter().map(String::as_str).collect(),
        }
    }
}

/// Accumulates semantic errors so one run reports every defect.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, source: &Source, message: &str, at: usize) {
        self.errors.push(source.format_message(message, at));
    }

    pub fn push(&mut self, formatted: String) {
        self.errors.push(formatted);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Hands back `value` only when nothing was reported.
    pub fn finish<T>(self, value: T) -> Result<T, CompileError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(CompileError::Semantic(self.errors))
        }
    }
}
