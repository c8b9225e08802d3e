//! Lexer for the Koko scripting language.
//!
//! Converts source text into a stream of tokens.

use crate::token::{Span, Token, TokenKind};
use std::str::Chars;

/// Lexer for Koko source code.
pub struct Lexer<'a> {
    /// Source text being lexed.
    source: &'a str,
    /// Character iterator.
    chars: Chars<'a>,
    /// Current byte position.
    pos: usize,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
    /// Start position of current token.
    token_start: usize,
    /// Start line of current token.
    token_start_line: u32,
    /// Start column of current token.
    token_start_column: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
        }
    }

    /// Tokenize the entire source, returning all tokens including EOF.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.mark_token_start();

        let Some(c) = self.peek() else {
            return self.make_token(TokenKind::Eof);
        };

        // Single-line comment
        if c == '/' && self.peek_next() == Some('/') {
            return self.lex_comment();
        }

        // String literal
        if c == '"' {
            return self.lex_string();
        }

        // Number literal
        if c.is_ascii_digit() {
            return self.lex_number();
        }

        // Identifier or keyword
        if c.is_alphabetic() || c == '_' {
            return self.lex_identifier();
        }

        // Operators and punctuation
        self.lex_operator_or_punctuation()
    }

    /// Skip whitespace characters.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Mark the start of a new token.
    fn mark_token_start(&mut self) {
        self.token_start = self.pos;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    /// Peek at the current character without consuming it.
    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Peek at the next character (after current) without consuming.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next()
    }

    /// Advance to the next character, returning the current one.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Create a token with the current span.
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            Span::new(
                self.token_start,
                self.pos,
                self.token_start_line,
                self.token_start_column,
            ),
        )
    }

    /// Get the text of the current token.
    fn token_text(&self) -> &'a str {
        &self.source[self.token_start..self.pos]
    }

    /// Lex a single-line comment.
    fn lex_comment(&mut self) -> Token {
        // Skip //
        self.advance();
        self.advance();

        let content_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }

        let content = self.source[content_start..self.pos].to_string();
        self.make_token(TokenKind::Comment(content))
    }

    /// Lex a string literal.
    fn lex_string(&mut self) -> Token {
        // Skip opening quote
        self.advance();

        let mut content = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self
                        .make_token(TokenKind::Error("unterminated string literal".to_string()));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            content.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            content.push('\t');
                            self.advance();
                        }
                        Some('\\') => {
                            content.push('\\');
                            self.advance();
                        }
                        Some('"') => {
                            content.push('"');
                            self.advance();
                        }
                        Some(other) => {
                            return self.make_token(TokenKind::Error(format!(
                                "unknown escape sequence \\{}",
                                other
                            )));
                        }
                        None => {
                            return self.make_token(TokenKind::Error(
                                "unterminated string literal".to_string(),
                            ));
                        }
                    }
                }
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }

        self.make_token(TokenKind::Str(content))
    }

    /// Lex a number literal (integer or float).
    fn lex_number(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        // Fractional part. A dot must be followed by a digit, otherwise
        // the literal is malformed (`5.` is not a float).
        let mut is_float = false;
        if self.peek() == Some('.') {
            if self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        self.advance();
                    } else {
                        break;
                    }
                }
            } else {
                self.advance();
                return self
                    .make_token(TokenKind::Error("malformed number literal".to_string()));
            }
        }

        let text = self.token_text();
        if is_float {
            match text.parse::<f64>() {
                Ok(x) => self.make_token(TokenKind::Float(x)),
                Err(_) => {
                    self.make_token(TokenKind::Error(format!("invalid float literal {}", text)))
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.make_token(TokenKind::Int(n)),
                Err(_) => self.make_token(TokenKind::Error(format!(
                    "integer literal {} out of range",
                    text
                ))),
            }
        }
    }

    /// Lex an identifier or keyword.
    fn lex_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '?' {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.token_text();
        match TokenKind::keyword(text) {
            Some(kind) => self.make_token(kind),
            None => self.make_token(TokenKind::Ident(text.to_string())),
        }
    }

    /// Lex an operator or punctuation token.
    fn lex_operator_or_punctuation(&mut self) -> Token {
        let c = self.advance().expect("caller checked non-empty");
        let kind = match c {
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => TokenKind::Error(format!("unexpected character {:?}", other)),
        };
        self.make_token(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_let_statement() {
        assert_eq!(
            kinds("let five = 5;"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("five".to_string()),
                TokenKind::Assign,
                TokenKind::Int(5),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            kinds("a == b != c < d > e"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Eq,
                TokenKind::Ident("b".to_string()),
                TokenKind::NotEq,
                TokenKind::Ident("c".to_string()),
                TokenKind::Lt,
                TokenKind::Ident("d".to_string()),
                TokenKind::Gt,
                TokenKind::Ident("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            kinds("42 3.14 0"),
            vec![
                TokenKind::Int(42),
                TokenKind::Float(3.14),
                TokenKind::Int(0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_malformed_float() {
        let toks = kinds("5.");
        assert!(matches!(toks[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_string_with_escapes() {
        assert_eq!(
            kinds(r#""hello\nworld""#),
            vec![TokenKind::Str("hello\nworld".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn lex_unterminated_string() {
        let toks = kinds("\"oops");
        assert!(matches!(toks[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_comment_is_trivia() {
        let toks = kinds("1 // trailing\n2");
        assert_eq!(toks[0], TokenKind::Int(1));
        assert_eq!(toks[1], TokenKind::Comment(" trailing".to_string()));
        assert_eq!(toks[2], TokenKind::Int(2));
    }

    #[test]
    fn lex_keywords_and_function_literals() {
        assert_eq!(
            kinds("let f = pfn(a) { return a; }"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("f".to_string()),
                TokenKind::Assign,
                TokenKind::Pfn,
                TokenKind::LParen,
                TokenKind::Ident("a".to_string()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Ident("a".to_string()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn spans_track_lines() {
        let tokens = Lexer::new("1\n  2").tokenize();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }
}
