use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum GcModeArg {
    None,
    #[default]
    Generational,
    Scanning,
}

impl From<GcModeArg> for oolc_compiler::GcMode {
    fn from(value: GcModeArg) -> Self {
        match value {
            GcModeArg::None => oolc_compiler::GcMode::None,
            GcModeArg::Generational => oolc_compiler::GcMode::Generational,
            GcModeArg::Scanning => oolc_compiler::GcMode::Scanning,
        }
    }
}

#[derive(Parser)]
#[command(name = "oolc", bin_name = "oolc")]
#[command(about = "Compiler for a small statically-typed object-oriented language")]
pub struct Cli {
    /// Source files to compile
    #[arg(required = true, value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Garbage collector whose init/collect labels codegen references
    #[arg(long, value_enum, default_value_t = GcModeArg::Generational)]
    pub gc: GcModeArg,

    /// Emit the collector-stress test constant
    #[arg(long = "gc-test")]
    pub gc_test: bool,

    /// Dump the parsed AST as JSON instead of generating code
    #[arg(long = "emit-ast")]
    pub emit_ast: bool,

    /// Dump the inferred-type map as JSON instead of generating code
    #[arg(long = "emit-types")]
    pub emit_types: bool,

    /// Write assembly to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Log each pipeline stage (lexing, parsing, class table, type check, codegen) to stderr
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn defaults_to_generational_gc_and_no_flags() {
        let cli = Cli::parse_from(["oolc", "a.cl"]);
        assert!(matches!(cli.gc, GcModeArg::Generational));
        assert!(!cli.gc_test);
        assert!(!cli.emit_ast);
        assert!(!cli.emit_types);
        assert!(cli.output.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn accepts_multiple_input_files() {
        let cli = Cli::parse_from(["oolc", "a.cl", "b.cl"]);
        assert_eq!(cli.inputs.len(), 2);
    }

    #[test]
    fn parses_gc_scanning_and_gc_test() {
        let cli = Cli::parse_from(["oolc", "--gc", "scanning", "--gc-test", "a.cl"]);
        assert!(matches!(cli.gc, GcModeArg::Scanning));
        assert!(cli.gc_test);
    }

    #[test]
    fn parses_output_flag_short_and_long() {
        let cli = Cli::parse_from(["oolc", "-o", "out.s", "a.cl"]);
        assert_eq!(cli.output.as_deref(), Some(std::path::Path::new("out.s")));
        let cli = Cli::parse_from(["oolc", "--output", "out.s", "a.cl"]);
        assert_eq!(cli.output.as_deref(), Some(std::path::Path::new("out.s")));
    }

    #[test]
    fn requires_at_least_one_input() {
        assert!(Cli::try_parse_from(["oolc"]).is_err());
    }
}
