//! Terminal output sanitization
//!
//! Remote shells emit colour codes, cursor movement, title updates and
//! carriage returns. [`sanitize`] turns a block of such text into something
//! a chat surface can render; [`OutputSanitizer`] does the same for a byte
//! stream that arrives in arbitrary chunks.

use regex::Regex;
use std::sync::LazyLock;

/// Marker of the SSH login banner's last line
pub const LOGIN_BANNER_MARKER: &str = "Last login:";

/// Longest escape sequence carried over between chunks before it is dropped
const MAX_ESCAPE_CARRY: usize = 256;

/// CSI, string sequences (OSC, DCS, SOS, PM, APC) ended by BEL or ST,
/// nF sequences such as `ESC ( B`, and two-byte escapes
static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\x1b(?:",
        r"\[[\x20-\x3f]*[\x40-\x7e]",
        r"|[\]PX^_][^\x07\x1b]*(?:\x07|\x1b\\?)",
        r"|[\x20-\x2f]+[\x30-\x7e]",
        r"|[\x30-\x7e])",
    ))
    .expect("ESCAPE_RE is a compile-time constant")
});

/// An escape sequence cut off by the end of the input
static UNTERMINATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[\x20-\x3f]*|[\]PX^_][^\x07\x1b]*\x1b?|[\x20-\x2f]*)\z")
        .expect("UNTERMINATED_RE is a compile-time constant")
});

/// C0 and C1 controls other than `\t` and `\n`; takes `\r` and stray ESC too
static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B-\x1F\x7F-\x9F]").expect("CONTROL_RE is a compile-time constant")
});

/// Three or more line breaks separated only by horizontal whitespace
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n(?:[^\S\n]*\n){2,}").expect("BLANK_RUN_RE is a compile-time constant")
});

/// Sanitize a block of terminal output for display.
///
/// Strips control sequences, collapses runs of three or more line breaks
/// to a single blank line, and trims leading/trailing whitespace.
/// `sanitize(sanitize(x)) == sanitize(x)` for every input.
pub fn sanitize(input: &str) -> String {
    let stripped = strip_control_sequences(input);
    collapse_blank_lines(&stripped).trim().to_string()
}

/// Remove escape sequences and control characters, keeping `\n` and `\t`.
///
/// An escape sequence left unterminated at the end of the input is dropped.
pub fn strip_control_sequences(input: &str) -> String {
    let (complete, _) = split_unterminated(input);
    strip_complete(complete)
}

/// Replace every whitespace run containing three or more `\n` with `\n\n`.
pub fn collapse_blank_lines(input: &str) -> String {
    BLANK_RUN_RE.replace_all(input, "\n\n").into_owned()
}

/// Return the text following the last login-banner line, if one is present.
pub fn strip_login_banner(text: &str) -> Option<&str> {
    let marker = text.rfind(LOGIN_BANNER_MARKER)?;
    let rest = &text[marker..];
    Some(match rest.find('\n') {
        Some(end) => &rest[end + 1..],
        None => "",
    })
}

/// Split off a trailing unterminated escape sequence
fn split_unterminated(input: &str) -> (&str, &str) {
    match UNTERMINATED_RE.find(input) {
        Some(m) => input.split_at(m.start()),
        None => (input, ""),
    }
}

fn strip_complete(input: &str) -> String {
    let without_escapes = ESCAPE_RE.replace_all(input, "");
    CONTROL_RE.replace_all(&without_escapes, "").into_owned()
}

/// Incremental sanitizer for a chunked byte stream.
///
/// Carries incomplete UTF-8 sequences and unterminated escape sequences into
/// the next [`feed`](Self::feed), and removes the login banner from the first
/// chunk that produces visible text. Invalid UTF-8 is dropped.
#[derive(Debug)]
pub struct OutputSanitizer {
    utf8_carry: Vec<u8>,
    escape_carry: String,
    banner_pending: bool,
}

impl OutputSanitizer {
    /// Create a sanitizer that strips the login banner
    #[must_use]
    pub fn new() -> Self {
        Self {
            utf8_carry: Vec::new(),
            escape_carry: String::new(),
            banner_pending: true,
        }
    }

    /// Create a sanitizer that passes the first visible chunk through untouched
    #[must_use]
    pub fn without_banner() -> Self {
        Self {
            banner_pending: false,
            ..Self::new()
        }
    }

    /// Feed raw bytes, returning the cleaned text they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        let decoded = self.decode(bytes);

        let mut text = std::mem::take(&mut self.escape_carry);
        text.push_str(&decoded);

        let (complete, tail) = split_unterminated(&text);
        let mut out = strip_complete(complete);
        if tail.len() <= MAX_ESCAPE_CARRY {
            self.escape_carry = tail.to_string();
        }

        if self.banner_pending && !out.trim().is_empty() {
            self.banner_pending = false;
            if let Some(rest) = strip_login_banner(&out) {
                out = rest.to_string();
            }
        }
        out
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.utf8_carry);
        data.extend_from_slice(bytes);

        let mut out = String::with_capacity(data.len());
        let mut rest = data.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => rest = &after[len..],
                        None => {
                            self.utf8_carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_colour_codes() {
        let input = "\x1b[32mHello\x1b[0m World\r\n";
        assert_eq!(strip_control_sequences(input), "Hello World\n");
    }

    #[test]
    fn test_strip_osc_title_and_charset() {
        let input = "\x1b]0;user@web1: ~\x07prompt\x1b(B$ \x1b[?2004h";
        assert_eq!(strip_control_sequences(input), "prompt$ ");
    }

    #[test]
    fn test_strip_keeps_tabs_and_drops_bells() {
        let input = "a\tb\x07c\x08";
        assert_eq!(strip_control_sequences(input), "a\tbc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n \n\t\n b"), "a\n\n b");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize("\r\n\x1b[1m  total 0 \x1b[0m\r\n\r\n"), "total 0");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "\x1b[31mred\x1b[0m\r\n\r\n\r\n\r\nnext  \n",
            "  \n\n\n  a \n \n \n \n b\t\n",
            "\x1b]2;title\x1b\\body\x1b[",
            "plain",
            "\u{9b}31mweird\n\n\n",
            "",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "input: {:?}", sample);
        }
    }

    #[test]
    fn test_login_banner() {
        let text = "Welcome to Ubuntu\nLast login: Mon Oct 19 from 10.0.0.1\n$ ls\n";
        assert_eq!(strip_login_banner(text), Some("$ ls\n"));
        assert_eq!(strip_login_banner("no banner"), None);
    }

    #[test]
    fn test_stream_carries_split_escape() {
        let mut sanitizer = OutputSanitizer::without_banner();
        assert_eq!(sanitizer.feed(b"ok\x1b[3"), "ok");
        assert_eq!(sanitizer.feed(b"2mgreen\x1b[0m\r\n"), "green\n");
    }

    #[test]
    fn test_stream_carries_split_title_sequence() {
        let mut sanitizer = OutputSanitizer::without_banner();
        assert_eq!(sanitizer.feed(b"$ \x1b]0;deploy@web1"), "$ ");
        assert_eq!(sanitizer.feed(b": ~\x1b"), "");
        assert_eq!(sanitizer.feed(b"\\ls\r\n"), "ls\n");
    }

    #[test]
    fn test_unterminated_sequence_dropped_from_block() {
        assert_eq!(strip_control_sequences("done\x1b]0;half a title"), "done");
        assert_eq!(strip_control_sequences("done\x1b"), "done");
        assert_eq!(strip_control_sequences("a\x1b[2Kb"), "ab");
    }

    #[test]
    fn test_stream_carries_split_utf8() {
        let mut sanitizer = OutputSanitizer::without_banner();
        let bytes = "héllo".as_bytes();
        assert_eq!(sanitizer.feed(&bytes[..2]), "h");
        assert_eq!(sanitizer.feed(&bytes[2..]), "éllo");
    }

    #[test]
    fn test_stream_drops_invalid_utf8() {
        let mut sanitizer = OutputSanitizer::without_banner();
        assert_eq!(sanitizer.feed(b"a\xffb"), "ab");
    }

    #[test]
    fn test_stream_strips_banner_once() {
        let mut sanitizer = OutputSanitizer::new();
        assert_eq!(sanitizer.feed(b"\r\n"), "\n");
        assert_eq!(
            sanitizer.feed(b"motd\r\nLast login: yesterday\r\nhi\r\n"),
            "hi\n"
        );
        assert_eq!(
            sanitizer.feed(b"Last login: again\r\n"),
            "Last login: again\n"
        );
    }
}
