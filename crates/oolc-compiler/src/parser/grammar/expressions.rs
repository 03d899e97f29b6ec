//! Expression precedence climb, from lowest to highest: assignment (right-assoc) < `not` <
//! comparisons (`<`, `<=`, `=`, non-associative) < `+`/`-` < `*`/`/` < `isvoid` < `~` <
//! dispatch postfix (`.`/`@`).

use super::atoms::parse_atom;
use super::Parser;
use crate::ast::{Expr, ExprKind};
use crate::parser::lexer::TokenKind;

pub(crate) fn parse_expr(parser: &mut Parser) -> Expr {
    parse_assign(parser)
}

fn parse_assign(parser: &mut Parser) -> Expr {
    if let TokenKind::ObjectId(name) = parser.peek().clone() {
        // lookahead: ID '<-' only if the token after is Assign
        if matches!(peek_second(parser), TokenKind::Assign) {
            let line = parser.peek_line();
            parser.advance(); // id
            parser.advance(); // <-
            let rhs = parse_assign(parser);
            return Expr::new(parser.next_id(), line, ExprKind::Assign { name, expr: Box::new(rhs) });
        }
    }
    parse_not(parser)
}

fn peek_second(parser: &Parser) -> TokenKind {
    parser.tokens.get(parser.pos + 1).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof)
}

fn parse_not(parser: &mut Parser) -> Expr {
    if matches!(parser.peek(), TokenKind::Not) {
        let line = parser.peek_line();
        parser.advance();
        let e = parse_not(parser);
        return Expr::new(parser.next_id(), line, ExprKind::Comp(Box::new(e)));
    }
    parse_comp(parser)
}

fn parse_comp(parser: &mut Parser) -> Expr {
    let lhs = parse_add(parser);
    let (line, kind) = match parser.peek() {
        TokenKind::Lt => (parser.peek_line(), Some(0)),
        TokenKind::Le => (parser.peek_line(), Some(1)),
        TokenKind::Eq => (parser.peek_line(), Some(2)),
        _ => return lhs,
    };
    parser.advance();
    let rhs = parse_add(parser);
    let kind = match kind.unwrap() {
        0 => ExprKind::Lt(Box::new(lhs), Box::new(rhs)),
        1 => ExprKind::Leq(Box::new(lhs), Box::new(rhs)),
        _ => ExprKind::Eq(Box::new(lhs), Box::new(rhs)),
    };
    Expr::new(parser.next_id(), line, kind)
}

fn parse_add(parser: &mut Parser) -> Expr {
    let mut lhs = parse_mul(parser);
    loop {
        let (line, plus) = match parser.peek() {
            TokenKind::Plus => (parser.peek_line(), true),
            TokenKind::Minus => (parser.peek_line(), false),
            _ => return lhs,
        };
        parser.advance();
        let rhs = parse_mul(parser);
        let kind = if plus { ExprKind::Plus(Box::new(lhs), Box::new(rhs)) } else { ExprKind::Sub(Box::new(lhs), Box::new(rhs)) };
        lhs = Expr::new(parser.next_id(), line, kind);
    }
}

fn parse_mul(parser: &mut Parser) -> Expr {
    let mut lhs = parse_isvoid(parser);
    loop {
        let (line, star) = match parser.peek() {
            TokenKind::Star => (parser.peek_line(), true),
            TokenKind::Slash => (parser.peek_line(), false),
            _ => return lhs,
        };
        parser.advance();
        let rhs = parse_isvoid(parser);
        let kind = if star { ExprKind::Mul(Box::new(lhs), Box::new(rhs)) } else { ExprKind::Divide(Box::new(lhs), Box::new(rhs)) };
        lhs = Expr::new(parser.next_id(), line, kind);
    }
}

fn parse_isvoid(parser: &mut Parser) -> Expr {
    if matches!(parser.peek(), TokenKind::IsVoid) {
        let line = parser.peek_line();
        parser.advance();
        let e = parse_isvoid(parser);
        return Expr::new(parser.next_id(), line, ExprKind::IsVoid(Box::new(e)));
    }
    parse_neg(parser)
}

fn parse_neg(parser: &mut Parser) -> Expr {
    if matches!(parser.peek(), TokenKind::Tilde) {
        let line = parser.peek_line();
        parser.advance();
        let e = parse_neg(parser);
        return Expr::new(parser.next_id(), line, ExprKind::Neg(Box::new(e)));
    }
    parse_dispatch(parser)
}

/// Handles the left-associative postfix chain of `.method(args)` and `@Type.method(args)`
/// applied to an atom.
fn parse_dispatch(parser: &mut Parser) -> Expr {
    let mut receiver = parse_atom(parser);
    loop {
        match parser.peek() {
            TokenKind::Dot => {
                let line = parser.peek_line();
                parser.advance();
                let method = match super::expect_object_id(parser) {
                    Some(m) => m,
                    None => return receiver,
                };
                let args = parse_args(parser);
                receiver = Expr::new(
                    parser.next_id(),
                    line,
                    ExprKind::Dispatch { receiver: Box::new(receiver), method, args },
                );
            }
            TokenKind::At => {
                let line = parser.peek_line();
                parser.advance();
                let target_class = match super::expect_type_id(parser) {
                    Some(t) => t,
                    None => return receiver,
                };
                parser.expect(&TokenKind::Dot, "'.'");
                let method = match super::expect_object_id(parser) {
                    Some(m) => m,
                    None => return receiver,
                };
                let args = parse_args(parser);
                receiver = Expr::new(
                    parser.next_id(),
                    line,
                    ExprKind::StaticDispatch { receiver: Box::new(receiver), target_class, method, args },
                );
            }
            _ => return receiver,
        }
    }
}

fn parse_args(parser: &mut Parser) -> Vec<Expr> {
    parser.expect(&TokenKind::LParen, "'('");
    let mut args = Vec::new();
    if !matches!(parser.peek(), TokenKind::RParen) {
        args.push(parse_expr(parser));
        while parser.eat(&TokenKind::Comma) {
            args.push(parse_expr(parser));
        }
    }
    parser.expect(&TokenKind::RParen, "')'");
    args
}
