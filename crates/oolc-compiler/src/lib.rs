//! Compiler for the oolc language: parser, semantic analyzer, and assembly code generator.
//!
//! - `ast` - the typed AST and the out-of-band inferred-type map
//! - `parser` - lexer and recursive-descent parser producing the AST
//! - `semant` - class table, environment propagation, and type checking
//! - `codegen` - class-tag/layout computation and assembly emission
//! - `diagnostics` - exact-string and rich diagnostic rendering
//! - `session` - the mutable context threaded through every stage

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod parser;
pub mod semant;
pub mod session;

pub use diagnostics::Diagnostics;
pub use session::{CompileSession, GcMode, GcTestMode};

/// Errors that can occur at the host boundary (never source-level: those go through
/// [`Diagnostics`] instead).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("parsing failed with {0} errors")]
    ParseFailed(usize),

    #[error("semantic analysis failed with {0} errors")]
    SemantFailed(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Compiles a set of already-read source files to assembly text.
///
/// Mirrors the driver pipeline: lex+parse every file, build the class table and
/// environments, type-check, and — only if no semantic error was recorded — generate code.
pub fn compile(
    sources: &[(String, String)],
    session: &mut CompileSession,
) -> Result<Option<String>> {
    let mut program_classes = Vec::new();
    for (filename, text) in sources {
        let tokens = parser::lexer::lex(text, filename, session);
        let classes = parser::grammar::parse_classes(&tokens, filename, session);
        program_classes.extend(classes);
    }

    if session.diagnostics.has_errors() {
        return Err(Error::ParseFailed(session.diagnostics.error_count()));
    }

    let program = ast::Program { classes: program_classes };

    let class_table = match semant::class_table::ClassTable::build(&program, session) {
        Some(ct) => ct,
        None => return Err(Error::SemantFailed(session.diagnostics.error_count())),
    };

    let envs = semant::environment::propagate(&class_table, session);

    let mut type_map = ast::TypeMap::new();
    semant::type_check::check_program(&program, &class_table, &envs, session, &mut type_map);

    if session.diagnostics.has_errors() {
        return Err(Error::SemantFailed(session.diagnostics.error_count()));
    }

    let layout = codegen::layout::Layout::build(&class_table, session);
    let asm = codegen::emit::emit_program(&program, &class_table, &layout, &type_map, session);
    Ok(Some(asm))
}

#[cfg(test)]
mod compile_tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn well_typed_program_emits_assembly_for_every_class() {
        let src = indoc! {r#"
            class Greeter inherits IO {
                greeting : String <- "hello";
                greet() : SELF_TYPE { out_string(greeting) };
            };
            class Main inherits Greeter {
                main() : Object { greet() };
            };
        "#};
        let mut session = CompileSession::default();
        let asm = compile(&[("a.cl".to_string(), src.to_string())], &mut session)
            .expect("well-typed program should compile")
            .expect("compile should produce assembly");
        assert!(asm.contains("Greeter_protObj"));
        assert!(asm.contains("Main.main"));
        assert!(asm.contains("Greeter.greet"));
    }

    #[test]
    fn ill_typed_program_reports_exact_diagnostic_text() {
        let src = indoc! {r#"
            class Main {
                x : Int <- "not an int";
                main() : Object { 0 };
            };
        "#};
        let mut session = CompileSession::default();
        let err = compile(&[("a.cl".to_string(), src.to_string())], &mut session)
            .expect_err("assigning a String to an Int attribute should fail to type-check");
        assert!(matches!(err, Error::SemantFailed(n) if n > 0));
        let rendered = diagnostics::render_plain(&session.diagnostics);
        assert_eq!(
            rendered,
            "\"a.cl\":2: Inferred type String of initialization of attribute x does not conform to declared type Int.\nCompilation halted due to static semantic errors.\n"
        );
    }

    #[test]
    fn first_diagnostic_line_matches_the_exact_string_contract() {
        let src = indoc! {r#"
            class Main {
                x : Int <- "not an int";
                main() : Object { 0 };
            };
        "#};
        let mut session = CompileSession::default();
        compile(&[("a.cl".to_string(), src.to_string())], &mut session).unwrap_err();
        let rendered = diagnostics::render_plain(&session.diagnostics);
        let first_line = rendered.lines().next().unwrap();
        insta::assert_snapshot!(first_line, @r#""a.cl":2: Inferred type String of initialization of attribute x does not conform to declared type Int."#);
    }

    #[test]
    fn inheriting_from_an_undefined_class_halts_before_codegen() {
        let src = indoc! {r#"
            class Main inherits Ghost {
                main() : Object { 0 };
            };
        "#};
        let mut session = CompileSession::default();
        let result = compile(&[("a.cl".to_string(), src.to_string())], &mut session);
        assert!(matches!(result, Err(Error::SemantFailed(n)) if n > 0));
    }
}
