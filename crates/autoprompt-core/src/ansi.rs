//! ANSI escape sequence stripping and line splitting.
//!
//! Matching always runs on plain text. Both the serialized screen (which is
//! already plain) and raw PTY chunks (which are not) go through
//! [`strip_ansi`] so the matcher never sees escape bytes.

/// Strip ANSI escape sequences and stray control characters from text.
///
/// Handles:
/// - CSI sequences: `ESC [ ... <final byte>`
/// - OSC/DCS/PM/APC strings: `ESC ] ... ST` (ST is `ESC \` or BEL)
/// - Two-byte escapes: `ESC <byte>`
/// - 8-bit CSI (`U+009B`)
///
/// Newlines and tabs are kept. Carriage returns are dropped so that `\r\n`
/// line endings collapse to `\n`.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.next() {
                Some('[') => skip_csi(&mut chars),
                Some(']') | Some('P') | Some('^') | Some('_') => skip_string(&mut chars),
                // Charset designators take one more byte: ESC ( B
                Some('(') | Some(')') | Some('*') | Some('+') => {
                    chars.next();
                }
                Some(_) | None => {}
            },
            '\u{9b}' => skip_csi(&mut chars),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

/// Skip parameter/intermediate bytes and the final byte of a CSI sequence.
fn skip_csi(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(&c) = chars.peek() {
        if ('\x20'..='\x3f').contains(&c) {
            chars.next();
        } else {
            // Final byte; anything else means a malformed sequence and is left for the caller.
            if ('\x40'..='\x7e').contains(&c) {
                chars.next();
            }
            break;
        }
    }
}

/// Skip a string-type sequence until BEL or `ESC \`.
fn skip_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(c) = chars.next() {
        match c {
            '\x07' => break,
            '\x1b' => {
                if chars.peek() == Some(&'\\') {
                    chars.next();
                }
                break;
            }
            _ => {}
        }
    }
}

/// Strip ANSI sequences from raw bytes, replacing invalid UTF-8.
pub fn strip_ansi_bytes(input: &[u8]) -> String {
    strip_ansi(&String::from_utf8_lossy(input))
}

/// Strip ANSI sequences and split into lines.
///
/// A trailing newline does not produce an extra empty line.
pub fn to_lines(input: &str) -> Vec<String> {
    strip_ansi(input).lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(strip_ansi("hello world"), "hello world");
    }

    #[test]
    fn test_strips_sgr() {
        assert_eq!(strip_ansi("\x1b[1mEdit file\x1b[0m"), "Edit file");
        assert_eq!(strip_ansi("\x1b[38;5;214mwarn\x1b[39m"), "warn");
    }

    #[test]
    fn test_strips_cursor_movement() {
        assert_eq!(strip_ansi("\x1b[2A\x1b[2Khello"), "hello");
        assert_eq!(strip_ansi("\x1b[?25lhidden\x1b[?25h"), "hidden");
    }

    #[test]
    fn test_strips_osc_with_bel_and_st() {
        assert_eq!(strip_ansi("\x1b]0;title\x07rest"), "rest");
        assert_eq!(strip_ansi("\x1b]0;title\x1b\\rest"), "rest");
    }

    #[test]
    fn test_strips_charset_designator() {
        assert_eq!(strip_ansi("\x1b(Bplain"), "plain");
    }

    #[test]
    fn test_drops_carriage_returns_and_bells() {
        assert_eq!(strip_ansi("line\r\nnext\x07"), "line\nnext");
    }

    #[test]
    fn test_keeps_unicode() {
        assert_eq!(strip_ansi("\x1b[36m❯ 1. Yes\x1b[0m"), "❯ 1. Yes");
    }

    #[test]
    fn test_bytes_with_invalid_utf8() {
        let out = strip_ansi_bytes(b"ok\xff\x1b[0m!");
        assert!(out.starts_with("ok"));
        assert!(out.ends_with('!'));
    }

    #[test]
    fn test_to_lines_splits_and_strips() {
        let lines = to_lines("\x1b[1mEdit file\x1b[0m\r\nDo you want?\n❯ 1. Yes\n");
        assert_eq!(lines, vec!["Edit file", "Do you want?", "❯ 1. Yes"]);
    }
}
