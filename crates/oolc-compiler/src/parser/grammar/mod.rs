//! Recursive-descent parser over the token stream from [`super::lexer`], producing the AST
//! defined in [`crate::ast`].
//!
//! One module per syntactic category: the class/feature lists here, expression precedence
//! levels in `expressions`, and atoms (literals, identifiers, parenthesized/let/case forms) in
//! `atoms`.

mod atoms;
mod expressions;

use crate::ast::{Class, Feature, NodeId};
use crate::parser::lexer::{Token, TokenKind};
use crate::session::CompileSession;
use oolc_core::Symbol;
use std::rc::Rc;

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    filename: &'a str,
    session: &'a mut CompileSession,
}

impl<'a> Parser<'a> {
    pub(crate) fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    pub(crate) fn peek_line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let line = self.peek_line();
        self.session.diagnostics.error(self.filename.to_string(), line, message.into());
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes `kind` or records a syntax error naming what was expected.
    pub(crate) fn expect(&mut self, kind: &TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(format!("syntax error: expected {what}"));
            false
        }
    }

    /// Skips tokens until a `;` at the current nesting depth (used to resynchronize after a
    /// malformed feature or class so one mistake doesn't cascade into spurious errors).
    pub(crate) fn recover_to_semi(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace if depth > 0 => {
                    depth -= 1;
                    self.advance();
                }
                TokenKind::RBrace => return,
                TokenKind::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn intern(&mut self, s: &str) -> Symbol {
        self.session.intern(s)
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        self.session.node_ids.next()
    }
}

/// Parses the top-level `[class;]+` production for one file, returning the classes it
/// contains. Lexical/syntax errors are recorded into `session.diagnostics`; parsing continues
/// past a malformed class to surface as many syntax errors as possible in one pass.
pub fn parse_classes(tokens: &[Token], filename: &str, session: &mut CompileSession) -> Vec<Rc<Class>> {
    let mut parser = Parser { tokens, pos: 0, filename, session };
    let mut classes = Vec::new();

    while !parser.at_eof() {
        if let Some(class) = parse_class(&mut parser, filename) {
            classes.push(Rc::new(class));
        } else {
            parser.recover_to_semi();
        }
        if !parser.expect(&TokenKind::Semi, "';'") {
            // already reported; keep scanning for the next class
        }
    }

    classes
}

fn parse_class(parser: &mut Parser, filename: &str) -> Option<Class> {
    let line = parser.peek_line();
    parser.expect(&TokenKind::Class, "'class'");
    let name = expect_type_id(parser)?;

    let parent = if parser.eat(&TokenKind::Inherits) {
        expect_type_id(parser)?
    } else {
        parser.intern("Object")
    };

    parser.expect(&TokenKind::LBrace, "'{'");
    let mut features = Vec::new();
    while !matches!(parser.peek(), TokenKind::RBrace | TokenKind::Eof) {
        if let Some(feature) = parse_feature(parser) {
            features.push(feature);
        } else {
            parser.recover_to_semi();
            continue;
        }
        parser.expect(&TokenKind::Semi, "';'");
    }
    parser.expect(&TokenKind::RBrace, "'}'");

    let filename_sym = parser.intern(filename);
    Some(Class { name, parent, features, filename: filename_sym, line })
}

fn parse_feature(parser: &mut Parser) -> Option<Feature> {
    let line = parser.peek_line();
    let name = expect_object_id(parser)?;

    if parser.eat(&TokenKind::LParen) {
        let mut formals = Vec::new();
        if !matches!(parser.peek(), TokenKind::RParen) {
            formals.push(parse_formal(parser)?);
            while parser.eat(&TokenKind::Comma) {
                formals.push(parse_formal(parser)?);
            }
        }
        parser.expect(&TokenKind::RParen, "')'");
        parser.expect(&TokenKind::Colon, "':'");
        let return_type = expect_type_id(parser)?;
        parser.expect(&TokenKind::LBrace, "'{'");
        let body = expressions::parse_expr(parser);
        parser.expect(&TokenKind::RBrace, "'}'");
        Some(Feature::Method(crate::ast::Method { name, formals, return_type, body, line }))
    } else {
        parser.expect(&TokenKind::Colon, "':'");
        let declared_type = expect_type_id(parser)?;
        let init = if parser.eat(&TokenKind::Assign) {
            expressions::parse_expr(parser)
        } else {
            no_expr(parser, line)
        };
        Some(Feature::Attr(crate::ast::Attr { name, declared_type, init, line }))
    }
}

fn parse_formal(parser: &mut Parser) -> Option<crate::ast::Formal> {
    let line = parser.peek_line();
    let name = expect_object_id(parser)?;
    parser.expect(&TokenKind::Colon, "':'");
    let declared_type = expect_type_id(parser)?;
    Some(crate::ast::Formal { name, declared_type, line })
}

pub(crate) fn expect_type_id(parser: &mut Parser) -> Option<Symbol> {
    if let TokenKind::TypeId(sym) = parser.peek().clone() {
        parser.advance();
        Some(sym)
    } else {
        parser.error("syntax error: expected a type identifier");
        None
    }
}

pub(crate) fn expect_object_id(parser: &mut Parser) -> Option<Symbol> {
    if let TokenKind::ObjectId(sym) = parser.peek().clone() {
        parser.advance();
        Some(sym)
    } else {
        parser.error("syntax error: expected an identifier");
        None
    }
}

pub(crate) fn no_expr(parser: &mut Parser, line: u32) -> crate::ast::Expr {
    crate::ast::Expr::new(parser.next_id(), line, crate::ast::ExprKind::NoExpr)
}
