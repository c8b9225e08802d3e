//! Lexer, parser, and AST for the Koko scripting language.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, ParseError, Parser};
pub use token::{Span, Token, TokenKind};
