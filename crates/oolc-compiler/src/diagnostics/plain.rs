//! The exact-string renderer: `"<filename>":<line>: <message>`, one per line, in insertion
//! order, followed by the fatal summary line when the barrier fires.

use super::Diagnostics;
use std::fmt::Write as _;

pub const FATAL_SUMMARY: &str = "Compilation halted due to static semantic errors.";

/// Renders every recorded diagnostic plus, if any are errors, the fatal summary line.
pub fn render_plain(diagnostics: &Diagnostics) -> String {
    let mut out = String::new();
    for d in diagnostics.iter() {
        let _ = writeln!(out, "\"{}\":{}: {}", d.filename, d.line, d.message);
    }
    if diagnostics.has_errors() {
        let _ = writeln!(out, "{FATAL_SUMMARY}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_reference_contract() {
        let mut d = Diagnostics::new();
        d.error("a.cl", 1, "Class A cannot inherit class Int.");
        let rendered = render_plain(&d);
        assert_eq!(
            rendered,
            "\"a.cl\":1: Class A cannot inherit class Int.\nCompilation halted due to static semantic errors.\n"
        );
    }

    #[test]
    fn no_summary_line_without_errors() {
        let d = Diagnostics::new();
        assert_eq!(render_plain(&d), "");
    }
}
