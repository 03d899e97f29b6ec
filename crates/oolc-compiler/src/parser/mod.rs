//! Lexer and recursive-descent parser producing the AST from source text.
//!
//! Out of scope for the semantic core proper, but needed for a runnable end-to-end compiler:
//! these modules turn source text into the `ast::Program` that `semant` and `codegen` consume.

pub mod grammar;
pub mod lexer;

pub use lexer::{Token, TokenKind};
