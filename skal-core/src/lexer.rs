//! Lexer for skal source text.
//!
//! Produces the token stream the parser consumes. Comments are kept as
//! `Comment` tokens (the parser turns them into comment declarations);
//! unknown characters and unterminated strings become diagnostics and
//! lexing continues.

use crate::diagnostic::Diagnostic;
use crate::token::{Literal, Token, TokenKind};

/// Result of lexing a source string.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a source string into tokens.
///
/// The token stream is always terminated by a single `Eof` token, even
/// when diagnostics were recorded along the way.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        index: 0,
        line: 1,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    line: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                self.line += 1;
                self.consume_char();
                continue;
            }
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }

            let start = self.index;
            let line = self.line;
            let token = match ch {
                b'(' => self.single(TokenKind::LeftParen),
                b')' => self.single(TokenKind::RightParen),
                b'{' => self.single(TokenKind::LeftBrace),
                b'}' => self.single(TokenKind::RightBrace),
                b',' => self.single(TokenKind::Comma),
                b'.' => self.single(TokenKind::Dot),
                b':' => self.single(TokenKind::Colon),
                b';' => self.single(TokenKind::Semicolon),
                b'+' => self.single(TokenKind::Plus),
                b'-' => self.single(TokenKind::Minus),
                b'*' => self.single(TokenKind::Star),
                b'=' => self.one_or_two(TokenKind::Equal, b'=', TokenKind::EqualEqual),
                b'!' => self.one_or_two(TokenKind::Bang, b'=', TokenKind::BangEqual),
                b'>' => self.one_or_two(TokenKind::Greater, b'=', TokenKind::GreaterEqual),
                b'<' => self.one_or_two(TokenKind::Less, b'=', TokenKind::LessEqual),
                b'/' => match self.peek_next() {
                    Some(b'/') => self.lex_line_comment(),
                    Some(b'*') => self.lex_block_comment(),
                    _ => self.single(TokenKind::Slash),
                },
                b'"' => self.lex_string(),
                b'0'..=b'9' => self.lex_number(),
                _ => {
                    if is_ident_start(ch) {
                        self.lex_ident_or_keyword()
                    } else {
                        self.consume_char();
                        let lexeme = &self.source[start..self.index];
                        self.diagnostics.push(
                            Diagnostic::error(format!("unexpected character '{lexeme}'"), line)
                                .with_code("E0001"),
                        );
                        None
                    }
                }
            };

            if let Some(token) = token {
                tokens.push(token);
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line));

        LexResult {
            tokens,
            diagnostics: core::mem::take(&mut self.diagnostics),
        }
    }

    fn single(&mut self, kind: TokenKind) -> Option<Token> {
        let start = self.index;
        self.consume_char();
        Some(self.token_from(kind, start))
    }

    fn one_or_two(&mut self, single: TokenKind, next: u8, double: TokenKind) -> Option<Token> {
        let start = self.index;
        self.consume_char();
        if self.peek_char() == Some(next) {
            self.consume_char();
            Some(self.token_from(double, start))
        } else {
            Some(self.token_from(single, start))
        }
    }

    fn token_from(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, &self.source[start..self.index], self.line)
    }

    fn lex_line_comment(&mut self) -> Option<Token> {
        let line = self.line;
        self.consume_char(); // '/'
        self.consume_char(); // '/'
        let start = self.index;
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
        let text = self.source[start..self.index].trim().to_string();
        Some(Token::new(TokenKind::Comment, text, line))
    }

    fn lex_block_comment(&mut self) -> Option<Token> {
        let line = self.line;
        self.consume_char(); // '/'
        self.consume_char(); // '*'
        let start = self.index;
        while let Some(ch) = self.peek_char() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                let text = self.source[start..self.index].trim().to_string();
                self.consume_char();
                self.consume_char();
                return Some(Token::new(TokenKind::Comment, text, line));
            }
            if ch == b'\n' {
                self.line += 1;
            }
            self.consume_char();
        }

        self.diagnostics
            .push(Diagnostic::error("unterminated block comment", line).with_code("E0002"));
        None
    }

    fn lex_string(&mut self) -> Option<Token> {
        let line = self.line;
        let start = self.index;
        self.consume_char(); // opening quote

        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    self.consume_char();
                    let lexeme = &self.source[start..self.index];
                    return Some(
                        Token::new(TokenKind::String, lexeme, line)
                            .with_literal(Literal::String(value)),
                    );
                }
                b'\\' => {
                    self.consume_char();
                    match self.peek_char() {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'"') => value.push('"'),
                        Some(b'\\') => value.push('\\'),
                        Some(other) => value.push(other as char),
                        None => break,
                    }
                    self.consume_char();
                }
                b'\n' => {
                    self.line += 1;
                    value.push('\n');
                    self.consume_char();
                }
                _ => {
                    value.push(ch as char);
                    self.consume_char();
                }
            }
        }

        self.diagnostics
            .push(Diagnostic::error("unterminated string literal", line).with_code("E0003"));
        None
    }

    fn lex_number(&mut self) -> Option<Token> {
        let line = self.line;
        let start = self.index;
        while matches!(self.peek_char(), Some(b'0'..=b'9')) {
            self.consume_char();
        }

        let mut is_double = false;
        if self.peek_char() == Some(b'.') && matches!(self.peek_next(), Some(b'0'..=b'9')) {
            is_double = true;
            self.consume_char(); // '.'
            while matches!(self.peek_char(), Some(b'0'..=b'9')) {
                self.consume_char();
            }
        }

        let lexeme = &self.source[start..self.index];
        if is_double {
            match lexeme.parse::<f64>() {
                Ok(value) => Some(
                    Token::new(TokenKind::Double, lexeme, line)
                        .with_literal(Literal::Double(value)),
                ),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(format!("invalid number literal '{lexeme}'"), line)
                            .with_code("E0004"),
                    );
                    None
                }
            }
        } else {
            match lexeme.parse::<i64>() {
                Ok(value) => Some(
                    Token::new(TokenKind::Int, lexeme, line).with_literal(Literal::Int(value)),
                ),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(format!("int literal '{lexeme}' is out of range"), line)
                            .with_code("E0004"),
                    );
                    None
                }
            }
        }
    }

    fn lex_ident_or_keyword(&mut self) -> Option<Token> {
        let line = self.line;
        let start = self.index;
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let lexeme = &self.source[start..self.index];
        let kind = match lexeme {
            "val" => TokenKind::Val,
            "var" => TokenKind::Var,
            "func" => TokenKind::Func,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            "while" => TokenKind::While,
            "typedef" => TokenKind::Typedef,
            "struct" => TokenKind::Struct,
            "external" => TokenKind::External,
            "this" => TokenKind::This,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier,
        };

        let token = Token::new(kind, lexeme, line);
        match kind {
            TokenKind::True => Some(token.with_literal(Literal::Bool(true))),
            TokenKind::False => Some(token.with_literal(Literal::Bool(false))),
            _ => Some(token),
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("val x = 10;"),
            vec![
                TokenKind::Val,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_two_char_operators() {
        assert_eq!(
            kinds("== != >= <= > <"),
            vec![
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::Less,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_number_literals() {
        let result = lex("42 3.25");
        assert_eq!(result.tokens[0].literal, Some(Literal::Int(42)));
        assert_eq!(result.tokens[1].literal, Some(Literal::Double(3.25)));
    }

    #[test]
    fn lexes_string_with_escapes() {
        let result = lex(r#""a\nb""#);
        assert_eq!(
            result.tokens[0].literal,
            Some(Literal::String("a\nb".to_string()))
        );
    }

    #[test]
    fn keeps_comments_as_tokens() {
        let result = lex("// note\nval x = 1;");
        assert_eq!(result.tokens[0].kind, TokenKind::Comment);
        assert_eq!(result.tokens[0].lexeme, "note");
        assert_eq!(result.tokens[1].kind, TokenKind::Val);
    }

    #[test]
    fn tracks_lines() {
        let result = lex("val x = 1;\nval y = 2;");
        let y_decl = result
            .tokens
            .iter()
            .find(|t| t.lexeme == "y")
            .expect("token for y");
        assert_eq!(y_decl.line, 2);
    }

    #[test]
    fn reports_unexpected_character() {
        let result = lex("val x = #;");
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("unexpected character"));
        // lexing continued past the bad character
        assert!(result.tokens.iter().any(|t| t.kind == TokenKind::Semicolon));
    }

    #[test]
    fn reports_unterminated_string() {
        let result = lex("\"abc");
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("unterminated string"));
    }
}
