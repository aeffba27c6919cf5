//! Reads the game's definitions header for names scripts may use.
//!
//! Only two constructs matter: `enum` bodies, whose members become integer
//! constants, and `typedef (u)intN_t name;`, which adds `name` as an N-bit
//! integer type.  Everything else in the header is skipped.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};

use crate::processor::layout::TypeSchema;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderDefinitions {
    constants: HashMap<String, i32>,
    widths: HashMap<String, u32>,
}

impl TypeSchema for HeaderDefinitions {
    fn bit_width(&self, type_name: &str) -> Option<u32> {
        self.widths.get(type_name).copied()
    }

    fn constant(&self, name: &str) -> Option<i32> {
        self.constants.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Number(i64),
    Punct(char),
}

/// Splits C source into words, numbers and punctuation, dropping comments
/// and preprocessor lines.
fn tokenize(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = content.chars().peekable();
    let mut line_start = true;

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                line_start = true;
                continue;
            }
            c if c.is_whitespace() => continue,
            '#' if line_start => {
                // preprocessor directive, honouring line continuations
                let mut previous = c;
                for next in chars.by_ref() {
                    if next == '\n' && previous != '\\' {
                        break;
                    }
                    previous = next;
                }
                continue;
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                line_start = true;
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            c if c.is_ascii_digit() => {
                let mut text = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }
                tokens.push(match parse_number(&text) {
                    Some(value) => Token::Number(value),
                    None => Token::Word(text),
                });
            }
            c => tokens.push(Token::Punct(c)),
        }
        line_start = false;
    }

    tokens
}

fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn integer_width(type_name: &str) -> Option<u32> {
    match type_name {
        "int8_t" | "uint8_t" | "char" => Some(8),
        "int16_t" | "uint16_t" | "short" => Some(16),
        "int32_t" | "uint32_t" | "int" => Some(32),
        _ => None,
    }
}

impl HeaderDefinitions {
    pub fn parse(content: &str) -> Result<Self> {
        let tokens = tokenize(content);
        let mut result = Self::default();
        let mut at = 0;

        while at < tokens.len() {
            match &tokens[at] {
                Token::Word(word) if word == "enum" => {
                    at = result.parse_enum(&tokens, at + 1)?;
                }
                Token::Word(word) if word == "typedef" => {
                    at = result.parse_typedef(&tokens, at + 1);
                }
                _ => at += 1,
            }
        }

        Ok(result)
    }

    /// Returns the index after the enum body, or `at` unchanged for a plain
    /// `enum name` type reference.
    fn parse_enum(&mut self, tokens: &[Token], mut at: usize) -> Result<usize> {
        if let Some(Token::Word(_)) = tokens.get(at) {
            at += 1;
        }
        if tokens.get(at) != Some(&Token::Punct('{')) {
            return Ok(at);
        }
        at += 1;

        let mut next_value: i64 = 0;

        loop {
            let name = match tokens.get(at) {
                Some(Token::Punct('}')) => return Ok(at + 1),
                Some(Token::Word(name)) => name.clone(),
                Some(other) => bail!("unexpected {:?} in enum body", other),
                None => bail!("enum body not terminated"),
            };
            at += 1;

            if tokens.get(at) == Some(&Token::Punct('=')) {
                let (value, next) = self.enum_value(tokens, at + 1)?;
                next_value = value;
                at = next;
            }

            let value = i32::try_from(next_value)
                .map_err(|_| anyhow!("enum value {} = {} does not fit in 32 bits", name, next_value))?;
            self.constants.insert(name, value);
            next_value += 1;

            if tokens.get(at) == Some(&Token::Punct(',')) {
                at += 1;
            }
        }
    }

    /// `-`? (number | earlier constant)
    fn enum_value(&self, tokens: &[Token], mut at: usize) -> Result<(i64, usize)> {
        let negative = tokens.get(at) == Some(&Token::Punct('-'));
        if negative {
            at += 1;
        }

        let value = match tokens.get(at) {
            Some(Token::Number(value)) => *value,
            Some(Token::Word(name)) => self
                .constants
                .get(name)
                .map(|&v| v as i64)
                .ok_or_else(|| anyhow!("enum value refers to unknown constant {}", name))?,
            other => bail!("expected enum value got {:?}", other),
        };

        Ok((if negative { -value } else { value }, at + 1))
    }

    fn parse_typedef(&mut self, tokens: &[Token], at: usize) -> usize {
        match (tokens.get(at), tokens.get(at + 1), tokens.get(at + 2)) {
            (Some(Token::Word(base)), Some(Token::Word(name)), Some(Token::Punct(';'))) => {
                if let Some(width) = integer_width(base) {
                    self.widths.insert(name.clone(), width);
                }
                at + 3
            }
            // `typedef enum …` and friends are handled by the main loop
            _ => at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"
#ifndef __SCENE_DEFINITION_H__
#define __SCENE_DEFINITION_H__ \
    1

#include <stdint.h>

// interaction kinds
enum interaction_type {
    INTERACTION_NONE,
    INTERACTION_LOOK, /* look at */
    INTERACTION_MOVE = 5,
    INTERACTION_MOVE_TO,
    INTERACTION_ALIAS = INTERACTION_LOOK,
};

typedef enum fade_colors {
    FADE_COLOR_NONE = -1,
    FADE_COLOR_BLACK,
    FADE_COLOR_WHITE = 0x10,
} fade_colors_t;

typedef uint16_t entity_id;
typedef uint8_t room_id;
typedef struct point point_t;

struct scene {
    enum interaction_type kind;
    room_id room;
};

#endif
"#;

    #[test]
    fn test_enum_constants() {
        let definitions = HeaderDefinitions::parse(HEADER).expect("parses");

        let test_cases = vec![
            ("INTERACTION_NONE", Some(0)),
            ("INTERACTION_LOOK", Some(1)),
            ("INTERACTION_MOVE", Some(5)),
            ("INTERACTION_MOVE_TO", Some(6)),
            ("INTERACTION_ALIAS", Some(1)),
            ("FADE_COLOR_NONE", Some(-1)),
            ("FADE_COLOR_BLACK", Some(0)),
            ("FADE_COLOR_WHITE", Some(16)),
            ("fade_colors_t", None),
            ("__SCENE_DEFINITION_H__", None),
        ];

        for (name, expected) in test_cases {
            assert_eq!(definitions.constant(name), expected, "constant {name}");
        }
    }

    #[test]
    fn test_typedef_widths() {
        let definitions = HeaderDefinitions::parse(HEADER).expect("parses");
        assert_eq!(definitions.bit_width("entity_id"), Some(16));
        assert_eq!(definitions.bit_width("room_id"), Some(8));
        assert_eq!(definitions.bit_width("point_t"), None);
    }

    #[test]
    fn test_malformed_enum() {
        let err = HeaderDefinitions::parse("enum broken { A = MISSING };").unwrap_err();
        assert!(err.to_string().contains("unknown constant MISSING"), "{err}");

        assert!(HeaderDefinitions::parse("enum open { A, B").is_err());
    }
}
