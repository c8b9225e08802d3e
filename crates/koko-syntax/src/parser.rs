//! Recursive descent (Pratt) parser for the Koko scripting language.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

/// Parser error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of file at {span}")]
    UnexpectedEof { span: Span },
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },
}

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidSyntax { span, .. } => *span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Operator binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    /// `==`, `!=`
    Equals,
    /// `<`, `>`
    LessGreater,
    /// `+`, `-`
    Sum,
    /// `*`, `/`, `%`
    Product,
    /// `!x`, `-x`
    Prefix,
    /// `f(...)`
    Call,
    /// `a[...]`
    Index,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Parse a complete program from source text.
pub fn parse(source: &str) -> ParseResult<Program> {
    Parser::new(source).parse_program()
}

/// Parser for Koko source code.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from source text.
    pub fn new(source: &str) -> Self {
        let tokens: Vec<_> = Lexer::new(source)
            .tokenize()
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect();
        Self { tokens, pos: 0 }
    }

    /// Parse a complete program.
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.current().is_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        if token.is_eof() {
            ParseError::UnexpectedEof { span: token.span }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind.to_string(),
                span: token.span,
            }
        }
    }

    /// Consume a trailing semicolon if present. Statements may omit it.
    fn eat_semicolon(&mut self) {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match &self.current().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Import => self.parse_import_statement(),
            TokenKind::Error(message) => Err(ParseError::InvalidSyntax {
                message: message.clone(),
                span: self.current().span,
            }),
            _ => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                let span = expr.span();
                self.eat_semicolon();
                Ok(Stmt::Expr { expr, span })
            }
        }
    }

    fn parse_let_statement(&mut self) -> ParseResult<Stmt> {
        let let_token = self.advance();
        let name = self.parse_ident()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        let span = let_token.span.merge(value.span());
        self.eat_semicolon();
        Ok(Stmt::Let { name, value, span })
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        let return_token = self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        let span = return_token.span.merge(value.span());
        self.eat_semicolon();
        Ok(Stmt::Return { value, span })
    }

    fn parse_import_statement(&mut self) -> ParseResult<Stmt> {
        let import_token = self.advance();
        let token = self.advance();
        let TokenKind::Str(path) = token.kind else {
            return Err(ParseError::UnexpectedToken {
                expected: "string literal".to_string(),
                found: token.kind.to_string(),
                span: token.span,
            });
        };
        let span = import_token.span.merge(token.span);
        self.eat_semicolon();
        Ok(Stmt::Import { path, span })
    }

    fn parse_ident(&mut self) -> ParseResult<Ident> {
        let token = self.current().clone();
        if let TokenKind::Ident(name) = token.kind {
            self.advance();
            Ok(Ident::new(name, token.span))
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while precedence < precedence_of(&self.current().kind) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(Ident::new(name, token.span)))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::IntLit {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::FloatLit {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::StringLit {
                    value,
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                })
            }
            TokenKind::Bang => self.parse_prefix_op(PrefixOp::Bang),
            TokenKind::Minus => self.parse_prefix_op(PrefixOp::Minus),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Fn => self.parse_function_literal(false),
            TokenKind::Pfn => self.parse_function_literal(true),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            TokenKind::Error(message) => Err(ParseError::InvalidSyntax {
                message,
                span: token.span,
            }),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_prefix_op(&mut self, op: PrefixOp) -> ParseResult<Expr> {
        let op_token = self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        let span = op_token.span.merge(right.span());
        Ok(Expr::Prefix {
            op,
            right: Box::new(right),
            span,
        })
    }

    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.current().kind {
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_expression(left),
            _ => self.parse_infix_op(left),
        }
    }

    fn parse_infix_op(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.advance();
        let op = match token.kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Sub,
            TokenKind::Star => InfixOp::Mul,
            TokenKind::Slash => InfixOp::Div,
            TokenKind::Percent => InfixOp::Mod,
            TokenKind::Eq => InfixOp::Eq,
            TokenKind::NotEq => InfixOp::NotEq,
            TokenKind::Lt => InfixOp::Lt,
            TokenKind::Gt => InfixOp::Gt,
            _ => return Err(self.unexpected("infix operator")),
        };
        let right = self.parse_expression(precedence_of(&token.kind))?;
        let span = left.span().merge(right.span());
        Ok(Expr::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        })
    }

    fn parse_call_expression(&mut self, func: Expr) -> ParseResult<Expr> {
        let lparen = self.advance();
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression(Precedence::Lowest)?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expression(Precedence::Lowest)?);
            }
        }
        let rparen = self.expect(TokenKind::RParen)?;
        let span = func.span().merge(lparen.span).merge(rparen.span);
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            span,
        })
    }

    fn parse_index_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        let rbracket = self.expect(TokenKind::RBracket)?;
        let span = left.span().merge(rbracket.span);
        Ok(Expr::Index {
            left: Box::new(left),
            index: Box::new(index),
            span,
        })
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expr> {
        let if_token = self.advance();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen)?;
        let consequence = self.parse_block()?;
        let mut span = if_token.span.merge(consequence.span);

        let alternative = if self.check(&TokenKind::Elsif) {
            // Rewrite `elsif (c) { .. }` into an alternative holding a
            // nested if expression, so evaluation sees plain if/else.
            let elsif_span = self.current().span;
            // Treat the `elsif` as the `if` of the nested expression.
            self.tokens[self.pos].kind = TokenKind::If;
            let nested = self.parse_if_expression()?;
            let nested_span = nested.span();
            span = span.merge(nested_span);
            Some(Block {
                statements: vec![Stmt::Expr {
                    expr: nested,
                    span: nested_span,
                }],
                span: elsif_span.merge(nested_span),
            })
        } else if self.check(&TokenKind::Else) {
            self.advance();
            let block = self.parse_block()?;
            span = span.merge(block.span);
            Some(block)
        } else {
            None
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            consequence,
            alternative,
            span,
        })
    }

    fn parse_function_literal(&mut self, pure: bool) -> ParseResult<Expr> {
        let fn_token = self.advance();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.parse_ident()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                params.push(self.parse_ident()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = fn_token.span.merge(body.span);
        Ok(if pure {
            Expr::PureFunctionLit { params, body, span }
        } else {
            Expr::FunctionLit { params, body, span }
        })
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let lbrace = self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.current().is_eof() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current().span,
                });
            }
            statements.push(self.parse_statement()?);
        }
        let rbrace = self.expect(TokenKind::RBrace)?;
        Ok(Block {
            statements,
            span: lbrace.span.merge(rbrace.span),
        })
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        let lbracket = self.advance();
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_expression(Precedence::Lowest)?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                elements.push(self.parse_expression(Precedence::Lowest)?);
            }
        }
        let rbracket = self.expect(TokenKind::RBracket)?;
        Ok(Expr::ArrayLit {
            elements,
            span: lbracket.span.merge(rbracket.span),
        })
    }

    fn parse_hash_literal(&mut self) -> ParseResult<Expr> {
        let lbrace = self.advance();
        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression(Precedence::Lowest)?;
                pairs.push((key, value));
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let rbrace = self.expect(TokenKind::RBrace)?;
        Ok(Expr::HashLit {
            pairs,
            span: lbrace.span.merge(rbrace.span),
        })
    }
}
