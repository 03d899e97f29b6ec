//! Atoms: literals, identifiers (plain reference or implicit self-dispatch), `new`, parenthesized
//! expressions, blocks, `let`, `case`/`esac`, `if`/`fi`, and `while`/`pool`.

use super::expressions::parse_expr;
use super::Parser;
use crate::ast::{Case, Expr, ExprKind};
use crate::parser::lexer::TokenKind;

pub(crate) fn parse_atom(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    match parser.peek().clone() {
        TokenKind::IntLiteral(sym) => {
            parser.advance();
            Expr::new(parser.next_id(), line, ExprKind::IntConst(sym))
        }
        TokenKind::StringLiteral(sym) => {
            parser.advance();
            Expr::new(parser.next_id(), line, ExprKind::StringConst(sym))
        }
        TokenKind::True => {
            parser.advance();
            Expr::new(parser.next_id(), line, ExprKind::BoolConst(true))
        }
        TokenKind::False => {
            parser.advance();
            Expr::new(parser.next_id(), line, ExprKind::BoolConst(false))
        }
        TokenKind::New => {
            parser.advance();
            let type_name = match super::expect_type_id(parser) {
                Some(t) => t,
                None => return error_expr(parser, line),
            };
            Expr::new(parser.next_id(), line, ExprKind::New(type_name))
        }
        TokenKind::LParen => {
            parser.advance();
            let inner = parse_expr(parser);
            parser.expect(&TokenKind::RParen, "')'");
            inner
        }
        TokenKind::LBrace => parse_block(parser),
        TokenKind::Let => parse_let(parser),
        TokenKind::Case => parse_case(parser),
        TokenKind::If => parse_if(parser),
        TokenKind::While => parse_while(parser),
        TokenKind::ObjectId(name) => {
            parser.advance();
            if matches!(parser.peek(), TokenKind::LParen) {
                let args = parse_call_args(parser);
                let receiver = Expr::new(parser.next_id(), line, ExprKind::ObjectRef(parser.intern("self")));
                Expr::new(parser.next_id(), line, ExprKind::Dispatch { receiver: Box::new(receiver), method: name, args })
            } else {
                Expr::new(parser.next_id(), line, ExprKind::ObjectRef(name))
            }
        }
        _ => {
            parser.error("syntax error: expected an expression");
            parser.advance();
            error_expr(parser, line)
        }
    }
}

fn error_expr(parser: &mut Parser, line: u32) -> Expr {
    Expr::new(parser.next_id(), line, ExprKind::NoExpr)
}

fn parse_call_args(parser: &mut Parser) -> Vec<Expr> {
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

/// `{ expr; [expr;]* }` — at least one expression is required.
fn parse_block(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    parser.expect(&TokenKind::LBrace, "'{'");
    let mut exprs = Vec::new();
    while !matches!(parser.peek(), TokenKind::RBrace | TokenKind::Eof) {
        exprs.push(parse_expr(parser));
        parser.expect(&TokenKind::Semi, "';'");
    }
    parser.expect(&TokenKind::RBrace, "'}'");
    if exprs.is_empty() {
        parser.error("syntax error: empty block");
    }
    Expr::new(parser.next_id(), line, ExprKind::Block { exprs })
}

/// `let id:T [<- init] [, id:T [<- init]]* in body`, desugared right-to-left into nested
/// `Let` nodes — the rightmost binding is the innermost.
fn parse_let(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    parser.expect(&TokenKind::Let, "'let'");

    let mut bindings = Vec::new();
    loop {
        let binding_line = parser.peek_line();
        let name = match super::expect_object_id(parser) {
            Some(n) => n,
            None => break,
        };
        parser.expect(&TokenKind::Colon, "':'");
        let declared_type = match super::expect_type_id(parser) {
            Some(t) => t,
            None => break,
        };
        let init = if parser.eat(&TokenKind::Assign) { parse_expr(parser) } else { super::no_expr(parser, binding_line) };
        bindings.push((binding_line, name, declared_type, init));
        if !parser.eat(&TokenKind::Comma) {
            break;
        }
    }

    parser.expect(&TokenKind::In, "'in'");
    let body = parse_expr(parser);

    let mut result = body;
    for (binding_line, name, declared_type, init) in bindings.into_iter().rev() {
        result = Expr::new(
            parser.next_id(),
            binding_line,
            ExprKind::Let { name, declared_type, init: Box::new(init), body: Box::new(result) },
        );
    }
    // Preserve the outermost Let's source line as the `let` keyword's line.
    if let ExprKind::Let { name, declared_type, init, body } = result.kind {
        Expr::new(result.id, line, ExprKind::Let { name, declared_type, init, body })
    } else {
        result
    }
}

/// `case expr of id:T => expr; [id:T => expr;]* esac`
fn parse_case(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    parser.expect(&TokenKind::Case, "'case'");
    let scrutinee = parse_expr(parser);
    parser.expect(&TokenKind::Of, "'of'");

    let mut branches = Vec::new();
    while !matches!(parser.peek(), TokenKind::Esac | TokenKind::Eof) {
        let branch_line = parser.peek_line();
        let name = match super::expect_object_id(parser) {
            Some(n) => n,
            None => {
                parser.recover_to_semi();
                continue;
            }
        };
        parser.expect(&TokenKind::Colon, "':'");
        let declared_type = match super::expect_type_id(parser) {
            Some(t) => t,
            None => {
                parser.recover_to_semi();
                continue;
            }
        };
        parser.expect(&TokenKind::Darrow, "'=>'");
        let body = parse_expr(parser);
        parser.expect(&TokenKind::Semi, "';'");
        branches.push(Case { name, declared_type, body: Box::new(body), line: branch_line });
    }
    parser.expect(&TokenKind::Esac, "'esac'");

    if branches.is_empty() {
        parser.error("syntax error: case with no branches");
    }

    Expr::new(parser.next_id(), line, ExprKind::TypeCase { scrutinee: Box::new(scrutinee), branches })
}

fn parse_if(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    parser.expect(&TokenKind::If, "'if'");
    let predicate = parse_expr(parser);
    parser.expect(&TokenKind::Then, "'then'");
    let then_branch = parse_expr(parser);
    parser.expect(&TokenKind::Else, "'else'");
    let else_branch = parse_expr(parser);
    parser.expect(&TokenKind::Fi, "'fi'");
    Expr::new(
        parser.next_id(),
        line,
        ExprKind::Cond { predicate: Box::new(predicate), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) },
    )
}

fn parse_while(parser: &mut Parser) -> Expr {
    let line = parser.peek_line();
    parser.expect(&TokenKind::While, "'while'");
    let predicate = parse_expr(parser);
    parser.expect(&TokenKind::Loop, "'loop'");
    let body = parse_expr(parser);
    parser.expect(&TokenKind::Pool, "'pool'");
    Expr::new(parser.next_id(), line, ExprKind::Loop { predicate: Box::new(predicate), body: Box::new(body) })
}

#[cfg(test)]
mod atom_tests {
    use crate::parser::grammar::parse_classes;
    use crate::parser::lexer::lex;
    use crate::session::CompileSession;

    fn parse_ok(src: &str) -> usize {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        assert!(!session.diagnostics.has_errors(), "{:?}", session.diagnostics.iter().collect::<Vec<_>>());
        classes.len()
    }

    #[test]
    fn parses_let_chain_and_case_and_loop() {
        assert_eq!(
            parse_ok(
                "class Main { main() : Object { let x:Int <- 1, y:Int <- 2 in case x of a:Int => a; b:Object => b; esac }; };"
            ),
            1
        );
    }

    #[test]
    fn parses_implicit_self_dispatch() {
        assert_eq!(parse_ok("class Main { f():Int { 1 }; main() : Int { f() }; };"), 1);
    }

    #[test]
    fn parses_while_and_if() {
        assert_eq!(
            parse_ok("class Main { main() : Object { while true loop if true then 1 else 2 fi pool }; };"),
            1
        );
    }
}
