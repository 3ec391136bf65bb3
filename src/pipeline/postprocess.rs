//! Post-processing: deterministic cleanup of Markdown assembled from text
//! that pdfium extracted page by page.
//!
//! Raw PDF text carries layout artefacts: hyphenated line ends, CRLF or bare
//! CR line endings, zero-width characters, trailing spaces from justified
//! columns and long runs of empty lines where whitespace-only text objects
//! sat. Each rule here is a pure `&str → String` pass, independently tested.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule can split on `\n`.
//! De-hyphenation runs before trimming so a hyphen followed by trailing
//! spaces is still recognised as a line-end hyphen.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Re-join words hyphenated across a line break
/// 4. Trim trailing whitespace per line
/// 5. Escape lines that would otherwise render as Markdown structure
/// 6. Collapse 3+ consecutive blank lines down to 2
/// 7. Ensure the text ends with exactly one newline
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = join_hyphenated_words(&s);
    let s = trim_trailing_whitespace(&s);
    let s = escape_accidental_markup(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{0002}',
        ],
        "",
    )
}

// ── Rule 3: Re-join hyphenated words ─────────────────────────────────────────

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Ll})-[ \t]*\n[ \t]*(\p{Ll})").unwrap());

fn join_hyphenated_words(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Escape accidental Markdown ──────────────────────────────────────
//
// Extracted text is prose, not Markdown. A line that happens to start with
// `#`, `>` or a bullet would otherwise change structure when rendered, and
// `---` under a line would turn it into a heading.

static RE_LEADING_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(#|>|[+*]\s|-\s|=+\s*$|-{3,}\s*$)").unwrap());

fn escape_accidental_markup(input: &str) -> String {
    input
        .lines()
        .map(|line| match RE_LEADING_MARKUP.captures(line) {
            Some(caps) => {
                let indent = caps[1].len();
                format!("{}\\{}", &line[..indent], line[indent..].trim_start())
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 7: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_join_hyphenated() {
        assert_eq!(join_hyphenated_words("conver-\nsion rate"), "conversion rate");
        assert_eq!(join_hyphenated_words("conver-  \n  sion"), "conversion");
    }

    #[test]
    fn test_keep_real_hyphens() {
        // Capitalised continuation is a compound or a list, not a split word.
        assert_eq!(join_hyphenated_words("Rust-\nBased"), "Rust-\nBased");
        assert_eq!(join_hyphenated_words("well-known"), "well-known");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_escape_heading_like_lines() {
        assert_eq!(escape_accidental_markup("#1 priority"), "\\#1 priority");
        assert_eq!(escape_accidental_markup("- item"), "\\- item");
        assert_eq!(escape_accidental_markup("---"), "\\---");
        assert_eq!(escape_accidental_markup("plain text"), "plain text");
    }

    #[test]
    fn test_collapse_blank_lines() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(collapse_blank_lines(input), "a\n\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_clean_page_text_full_pipeline() {
        let input = "Quarterly re-\r\nport   \r\n\r\n\r\n\r\n\r\n# of units\u{200B}";
        let result = clean_page_text(input);
        assert!(result.starts_with("Quarterly report\n"));
        assert!(result.contains("\\# of units"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(result.ends_with("units\n"));
    }
}
