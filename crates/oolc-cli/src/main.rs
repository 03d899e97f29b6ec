mod cli;

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::Parser;
use cli::Cli;
use oolc_compiler::{ast, CompileSession, Error};

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let sources = read_sources(&cli.inputs)?;
    let mut session = CompileSession::new(cli.gc.into(), if cli.gc_test { oolc_compiler::GcTestMode::On } else { oolc_compiler::GcTestMode::Off });

    log_stage(cli.verbose, &format!("lexing and parsing {} file(s)", sources.len()));
    let program = lex_and_parse(&sources, &mut session)?;

    log_stage(cli.verbose, &format!("building class table for {} class(es)", program.classes.len()));
    let class_table = match oolc_compiler::semant::class_table::ClassTable::build(&program, &mut session) {
        Some(ct) => ct,
        None => return emit_diagnostics_and_fail(&session),
    };

    log_stage(cli.verbose, "propagating attribute/method environments");
    let envs = oolc_compiler::semant::environment::propagate(&class_table, &mut session);

    log_stage(cli.verbose, "checking types");
    let mut types = ast::TypeMap::new();
    oolc_compiler::semant::type_check::check_program(&program, &class_table, &envs, &mut session, &mut types);
    if session.diagnostics.has_errors() {
        return emit_diagnostics_and_fail(&session);
    }

    if cli.emit_ast {
        print_json(&program);
        return Ok(());
    }
    if cli.emit_types {
        print_json(&type_dump(&types, &session));
        return Ok(());
    }

    log_stage(cli.verbose, "generating code");
    let started = Instant::now();
    let layout = oolc_compiler::codegen::layout::Layout::build(&class_table, &mut session);
    let asm = oolc_compiler::codegen::emit::emit_program(&program, &class_table, &layout, &types, &mut session);
    log_stage(cli.verbose, &format!("generated {} bytes of assembly in {:?}", asm.len(), started.elapsed()));

    match &cli.output {
        Some(path) => fs::write(path, asm).map_err(|source| Error::Io { path: path.display().to_string(), source })?,
        None => print!("{asm}"),
    }
    Ok(())
}

fn read_sources(inputs: &[std::path::PathBuf]) -> Result<Vec<(String, String)>, Error> {
    let mut sources = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = fs::read_to_string(path).map_err(|source| Error::Io { path: path.display().to_string(), source })?;
        sources.push((filename_of(path), text));
    }
    Ok(sources)
}

fn filename_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn lex_and_parse(sources: &[(String, String)], session: &mut CompileSession) -> Result<ast::Program, Error> {
    let mut classes = Vec::new();
    for (filename, text) in sources {
        let tokens = oolc_compiler::parser::lexer::lex(text, filename, session);
        classes.extend(oolc_compiler::parser::grammar::parse_classes(&tokens, filename, session));
    }
    if session.diagnostics.has_errors() {
        return Err(Error::ParseFailed(session.diagnostics.error_count()));
    }
    Ok(ast::Program { classes })
}

fn emit_diagnostics_and_fail(session: &CompileSession) -> Result<(), Error> {
    eprint!("{}", oolc_compiler::diagnostics::render_plain(&session.diagnostics));
    Err(Error::SemantFailed(session.diagnostics.error_count()))
}

fn log_stage(verbose: bool, message: &str) {
    if verbose {
        eprintln!("oolc: {message}");
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize: {e}"),
    }
}

#[derive(serde::Serialize)]
struct TypeEntry {
    node: u32,
    ty: String,
}

fn type_dump(types: &ast::TypeMap, session: &CompileSession) -> Vec<TypeEntry> {
    types
        .entries()
        .into_iter()
        .map(|(id, ty)| TypeEntry { node: id.0, ty: session.resolve(ty).to_string() })
        .collect()
}

#[cfg(test)]
mod main_tests {
    use super::*;
    use std::path::PathBuf;

    fn write_fixture(dir: &tempfile::TempDir, name: &str, src: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, src).unwrap();
        path
    }

    fn base_cli(inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Cli {
        Cli {
            inputs,
            gc: cli::GcModeArg::Generational,
            gc_test: false,
            emit_ast: false,
            emit_types: false,
            output,
            verbose: false,
        }
    }

    #[test]
    fn well_formed_program_writes_assembly_containing_main_main() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_fixture(&dir, "a.cl", "class Main { main():Int { 42 }; };");
        let out = dir.path().join("a.s");
        let cli = base_cli(vec![src], Some(out.clone()));
        run(&cli).expect("well-formed program should compile");
        let asm = fs::read_to_string(&out).unwrap();
        assert!(asm.contains("Main.main"));
        assert!(asm.contains("Main_protObj"));
    }

    #[test]
    fn ill_typed_program_fails_without_writing_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_fixture(&dir, "a.cl", "class Main { x : Int <- \"hi\"; main():Object { 0 }; };");
        let out = dir.path().join("a.s");
        let cli = base_cli(vec![src], Some(out.clone()));
        let err = run(&cli).expect_err("ill-typed program should fail to compile");
        assert!(matches!(err, Error::SemantFailed(n) if n > 0));
        assert!(!out.exists());
    }

    #[test]
    fn missing_input_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.cl");
        let cli = base_cli(vec![missing], None);
        assert!(matches!(run(&cli), Err(Error::Io { .. })));
    }

    #[test]
    fn compiles_two_files_sharing_one_class_table() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fixture(&dir, "a.cl", "class Greeter { greet():String { \"hi\" }; };");
        let b = write_fixture(&dir, "b.cl", "class Main inherits Greeter { main():String { greet() }; };");
        let out = dir.path().join("out.s");
        let cli = base_cli(vec![a, b], Some(out.clone()));
        run(&cli).expect("two well-formed files should link into one program");
        let asm = fs::read_to_string(&out).unwrap();
        assert!(asm.contains("Greeter.greet"));
    }

    #[test]
    fn type_dump_serializes_node_id_and_resolved_type_name() {
        let mut session = CompileSession::default();
        let tokens = oolc_compiler::parser::lexer::lex("class Main { main():Int { 42 }; };", "a.cl", &mut session);
        let classes = oolc_compiler::parser::grammar::parse_classes(&tokens, "a.cl", &mut session);
        let program = ast::Program { classes };
        let table = oolc_compiler::semant::class_table::ClassTable::build(&program, &mut session).unwrap();
        let envs = oolc_compiler::semant::environment::propagate(&table, &mut session);
        let mut types = ast::TypeMap::new();
        oolc_compiler::semant::type_check::check_program(&program, &table, &envs, &mut session, &mut types);

        let dump = type_dump(&types, &session);
        let entry = dump.iter().find(|e| e.ty == "Int").expect("the IntConst(42) node should carry type Int");
        insta::assert_snapshot!(entry.ty, @"Int");
    }
}
