//! Tokenizer built on `logos`. Tracks line numbers and handles the escape/length rules for
//! string literals.

use crate::session::CompileSession;
use logos::Logos;
use oolc_core::Symbol;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f\v]+")]
#[logos(skip r"--[^\n]*")]
pub enum RawToken {
    #[regex(r"\(\*([^*]|\*[^)])*\*\)")]
    BlockComment,

    #[token("\n")]
    Newline,

    #[token("class", ignore(case))]
    Class,
    #[token("inherits", ignore(case))]
    Inherits,
    #[token("if", ignore(case))]
    If,
    #[token("then", ignore(case))]
    Then,
    #[token("else", ignore(case))]
    Else,
    #[token("fi", ignore(case))]
    Fi,
    #[token("while", ignore(case))]
    While,
    #[token("loop", ignore(case))]
    Loop,
    #[token("pool", ignore(case))]
    Pool,
    #[token("let", ignore(case))]
    Let,
    #[token("in", ignore(case))]
    In,
    #[token("case", ignore(case))]
    Case,
    #[token("of", ignore(case))]
    Of,
    #[token("esac", ignore(case))]
    Esac,
    #[token("new", ignore(case))]
    New,
    #[token("isvoid", ignore(case))]
    IsVoid,
    #[token("not", ignore(case))]
    Not,

    #[regex(r"t[rR][uU][eE]")]
    True,
    #[regex(r"f[aA][lL][sS][eE]")]
    False,

    #[token("<-")]
    Assign,
    #[token("=>")]
    Darrow,
    #[token("<=")]
    Le,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("~")]
    Tilde,
    #[token("<")]
    Lt,
    #[token("=")]
    Eq,

    #[regex(r"[0-9]+", |lex| lex.slice().to_owned())]
    IntLiteral(String),

    #[regex(r"[A-Z][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    TypeId(String),
    #[regex(r"[a-z][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    ObjectId(String),

    #[token("\"")]
    StringStart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Class,
    Inherits,
    If,
    Then,
    Else,
    Fi,
    While,
    Loop,
    Pool,
    Let,
    In,
    Case,
    Of,
    Esac,
    New,
    IsVoid,
    Not,
    True,
    False,
    Assign,
    Darrow,
    Le,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Semi,
    Comma,
    Dot,
    At,
    Plus,
    Minus,
    Star,
    Slash,
    Tilde,
    Lt,
    Eq,
    IntLiteral(Symbol),
    TypeId(Symbol),
    ObjectId(Symbol),
    StringLiteral(Symbol),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

/// Tokenizes `text`, recording lexical errors (unterminated/too-long/NUL-containing strings)
/// into the session diagnostics under `filename`, and returns the token stream with a
/// trailing `Eof`.
pub fn lex(text: &str, filename: &str, session: &mut CompileSession) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut lexer = RawToken::lexer(text);

    while let Some(result) = lexer.next() {
        match result {
            Ok(RawToken::Newline) => line += 1,
            Ok(RawToken::BlockComment) => {
                line += lexer.slice().matches('\n').count() as u32;
            }
            Ok(RawToken::StringStart) => {
                let start_line = line;
                let (consumed_lines, kind) = lex_string(&mut lexer, filename, line, session);
                tokens.push(Token { kind, line: start_line });
                line += consumed_lines;
            }
            Ok(tok) => {
                let kind = match tok {
                    RawToken::Class => TokenKind::Class,
                    RawToken::Inherits => TokenKind::Inherits,
                    RawToken::If => TokenKind::If,
                    RawToken::Then => TokenKind::Then,
                    RawToken::Else => TokenKind::Else,
                    RawToken::Fi => TokenKind::Fi,
                    RawToken::While => TokenKind::While,
                    RawToken::Loop => TokenKind::Loop,
                    RawToken::Pool => TokenKind::Pool,
                    RawToken::Let => TokenKind::Let,
                    RawToken::In => TokenKind::In,
                    RawToken::Case => TokenKind::Case,
                    RawToken::Of => TokenKind::Of,
                    RawToken::Esac => TokenKind::Esac,
                    RawToken::New => TokenKind::New,
                    RawToken::IsVoid => TokenKind::IsVoid,
                    RawToken::Not => TokenKind::Not,
                    RawToken::True => TokenKind::True,
                    RawToken::False => TokenKind::False,
                    RawToken::Assign => TokenKind::Assign,
                    RawToken::Darrow => TokenKind::Darrow,
                    RawToken::Le => TokenKind::Le,
                    RawToken::LParen => TokenKind::LParen,
                    RawToken::RParen => TokenKind::RParen,
                    RawToken::LBrace => TokenKind::LBrace,
                    RawToken::RBrace => TokenKind::RBrace,
                    RawToken::Colon => TokenKind::Colon,
                    RawToken::Semi => TokenKind::Semi,
                    RawToken::Comma => TokenKind::Comma,
                    RawToken::Dot => TokenKind::Dot,
                    RawToken::At => TokenKind::At,
                    RawToken::Plus => TokenKind::Plus,
                    RawToken::Minus => TokenKind::Minus,
                    RawToken::Star => TokenKind::Star,
                    RawToken::Slash => TokenKind::Slash,
                    RawToken::Tilde => TokenKind::Tilde,
                    RawToken::Lt => TokenKind::Lt,
                    RawToken::Eq => TokenKind::Eq,
                    RawToken::IntLiteral(s) => TokenKind::IntLiteral(session.intern(&s)),
                    RawToken::TypeId(s) => TokenKind::TypeId(session.intern(&s)),
                    RawToken::ObjectId(s) => TokenKind::ObjectId(session.intern(&s)),
                    RawToken::Newline | RawToken::BlockComment | RawToken::StringStart => {
                        unreachable!("handled above")
                    }
                };
                tokens.push(Token { kind, line });
            }
            Err(()) => {
                session.diagnostics.error(filename, line, format!("invalid character '{}'", lexer.slice()));
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, line });
    tokens
}

/// Consumes a string literal body after the opening quote has already been lexed. Returns the
/// number of embedded newlines consumed and the resulting token kind.
fn lex_string(
    lexer: &mut logos::Lexer<RawToken>,
    filename: &str,
    start_line: u32,
    session: &mut CompileSession,
) -> (u32, TokenKind) {
    let remainder = lexer.remainder();
    let mut out = String::new();
    let mut newlines = 0u32;
    let mut chars = remainder.char_indices().peekable();
    let mut consumed = 0usize;
    let mut terminated = false;
    let mut had_null = false;
    let mut unescaped_newline = false;

    while let Some((i, c)) = chars.next() {
        consumed = i + c.len_utf8();
        match c {
            '"' => {
                terminated = true;
                break;
            }
            '\0' => {
                had_null = true;
            }
            '\n' => {
                unescaped_newline = true;
                newlines += 1;
                out.push('\n');
            }
            '\\' => {
                if let Some((j, esc)) = chars.next() {
                    consumed = j + esc.len_utf8();
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '\n' => newlines += 1,
                        '\0' => had_null = true,
                        other => out.push(other),
                    }
                } else {
                    break;
                }
            }
            other => out.push(other),
        }
    }

    lexer.bump(consumed);

    if had_null {
        session.diagnostics.error(filename, start_line, "String contains null character.");
        return (newlines, TokenKind::StringLiteral(session.intern("")));
    }
    if !terminated || unescaped_newline {
        session.diagnostics.error(filename, start_line, "Unterminated string constant");
        return (newlines, TokenKind::StringLiteral(session.intern("")));
    }
    if out.len() > 1024 {
        session.diagnostics.error(filename, start_line, "String constant too long");
        return (newlines, TokenKind::StringLiteral(session.intern("")));
    }

    (newlines, TokenKind::StringLiteral(session.intern(&out)))
}

#[cfg(test)]
mod lexer_tests {
    use super::*;

    #[test]
    fn lexes_a_minimal_class() {
        let mut session = CompileSession::default();
        let tokens = lex("class Main { main() : Int { 42 }; };", "a.cl", &mut session);
        assert!(!session.diagnostics.has_errors());
        assert_eq!(tokens.first().unwrap().kind, TokenKind::Class);
        assert!(matches!(tokens.last().unwrap().kind, TokenKind::Eof));
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let mut session = CompileSession::default();
        let tokens = lex("class\nMain {\n};", "a.cl", &mut session);
        let main_tok = tokens.iter().find(|t| matches!(t.kind, TokenKind::TypeId(_))).unwrap();
        assert_eq!(main_tok.line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut session = CompileSession::default();
        lex("\"abc", "a.cl", &mut session);
        assert!(session.diagnostics.has_errors());
    }

    #[test]
    fn string_escapes_decode() {
        let mut session = CompileSession::default();
        let tokens = lex("\"a\\nb\"", "a.cl", &mut session);
        if let TokenKind::StringLiteral(sym) = &tokens[0].kind {
            assert_eq!(session.resolve(*sym), "a\nb");
        } else {
            panic!("expected string literal");
        }
    }
}
