//! Optional rich rendering built on `annotate-snippets`, underlining the offending line when
//! the caller has the original source text available. Used by the CLI's interactive default
//! output mode; never consulted by anything that needs the exact-string contract (tests,
//! tooling that diffs against a reference compiler).

use super::Diagnostics;
use annotate_snippets::{Level, Renderer, Snippet};

/// Renders diagnostics with source-line context, given a map from filename to full source
/// text. Falls back to a bare message (no snippet) for a filename whose source isn't
/// available, which is always true for the synthesized `<basic class>` filename.
pub fn render_snippet(diagnostics: &Diagnostics, sources: &dyn Fn(&str) -> Option<String>) -> String {
    let renderer = Renderer::styled();
    let mut out = String::new();
    for d in diagnostics.iter() {
        let message = Level::Error.title(&d.message);
        let rendered = match sources(&d.filename) {
            Some(src) => {
                let line_start = line_byte_offset(&src, d.line);
                let line_end = line_end_offset(&src, d.line);
                let snippet = Snippet::source(&src)
                    .line_start(1)
                    .origin(&d.filename)
                    .annotation(Level::Error.span(line_start..line_end));
                message.snippet(snippet)
            }
            None => message,
        };
        out.push_str(&format!("{}", renderer.render(rendered)));
        out.push('\n');
    }
    out
}

fn line_byte_offset(src: &str, line: u32) -> usize {
    src.split_inclusive('\n')
        .take(line.saturating_sub(1) as usize)
        .map(str::len)
        .sum()
}

fn line_end_offset(src: &str, line: u32) -> usize {
    let start = line_byte_offset(src, line);
    let rest = &src[start..];
    start + rest.find('\n').unwrap_or(rest.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_bare_message_without_source() {
        let mut d = Diagnostics::new();
        d.error("<basic class>", 0, "Redefinition of basic class Int.");
        let rendered = render_snippet(&d, &|_| None);
        assert!(rendered.contains("Redefinition of basic class Int."));
    }
}
