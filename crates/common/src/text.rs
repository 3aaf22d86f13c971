//! Cleanup of captured terminal output.

use std::sync::LazyLock;

use regex::Regex;

/// ANSI escape sequences (colors, cursor movement) found in compose output.
static ANSI_ESCAPES: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(\x9B|\x1B\[)[0-?]*[ -/]*[@-~]").expect("static regex compiles")
});

/// Strip all ANSI escape codes from captured output before it is written to
/// the diagnostics directory.
pub fn strip_ansi(content: &str) -> String {
    ANSI_ESCAPES.replace_all(content, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let colored = "\x1b[31merror\x1b[0m plain";
        assert_eq!(strip_ansi(colored), "error plain");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(strip_ansi("ns-1 | listening on 53"), "ns-1 | listening on 53");
    }
}
