//! Response framing rules.
//!
//! SMTP replies end at the first line whose code is followed by a space
//! (`250-...` continues, `250 ...` terminates). IMAP responses end at the
//! line that starts with the command's tag followed by a space; untagged
//! `*` lines before it are intermediate.

use crate::reply::Completion;

/// How many lines make up one response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Framing {
    /// Exactly one line.
    #[default]
    Line,
    /// SMTP multi-line reply.
    Multiline,
    /// IMAP tagged response for the given tag.
    Tagged(String),
}

impl Framing {
    /// Returns true if `line` ends a response under this framing.
    #[must_use]
    pub fn is_terminal(&self, line: &[u8]) -> bool {
        match self {
            Self::Line => true,
            Self::Multiline => is_final_reply_line(line),
            Self::Tagged(tag) => is_tagged_completion(line, tag),
        }
    }
}

/// Returns true if an SMTP reply line is the last one of its reply.
#[must_use]
pub fn is_final_reply_line(line: &[u8]) -> bool {
    line.len() >= 4 && line[3] == b' '
}

/// Returns true if `line` is the tagged completion for `tag`.
#[must_use]
pub fn is_tagged_completion(line: &[u8], tag: &str) -> bool {
    line.strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}

/// Extracts the completion result from a tagged line.
#[must_use]
pub fn tagged_completion(line: &[u8], tag: &str) -> Option<Completion> {
    let rest = line.strip_prefix(tag.as_bytes())?.strip_prefix(b" ")?;
    std::str::from_utf8(first_word(rest)).ok()?.parse().ok()
}

/// Extracts the leading status token of a response line.
///
/// Under tagged framing this is the completion word after the tag. Otherwise
/// it is the three-digit reply code when present, or the first word.
#[must_use]
pub fn status_token<'a>(line: &'a [u8], framing: &Framing) -> &'a [u8] {
    if let Framing::Tagged(tag) = framing
        && let Some(rest) = line
            .strip_prefix(tag.as_bytes())
            .and_then(|r| r.strip_prefix(b" "))
    {
        return first_word(rest);
    }

    match line {
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            &line[..3]
        }
        _ => first_word(line),
    }
}

fn first_word(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|&b| matches!(b, b' ' | b'\r' | b'\n'))
        .unwrap_or(bytes.len());
    &bytes[..end]
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_final_reply_line() {
        assert!(is_final_reply_line(b"250 OK\r\n"));
        assert!(is_final_reply_line(b"250 Third\r\n"));
        assert!(!is_final_reply_line(b"250-First\r\n"));
        assert!(!is_final_reply_line(b"250\r\n"));
        assert!(!is_final_reply_line(b"250"));
        assert!(!is_final_reply_line(b""));
    }

    #[test]
    fn test_multiline_sequence_terminates_after_third() {
        let lines: [&[u8]; 3] = [b"250-First\r\n", b"250-Second\r\n", b"250 Third\r\n"];
        let framing = Framing::Multiline;
        let terminal: Vec<bool> = lines.iter().map(|l| framing.is_terminal(l)).collect();
        assert_eq!(terminal, [false, false, true]);
    }

    #[test]
    fn test_tagged_completion() {
        assert!(is_tagged_completion(b"A0001 OK LOGIN done\r\n", "A0001"));
        assert!(!is_tagged_completion(b"* 3 EXISTS\r\n", "A0001"));
        assert!(!is_tagged_completion(b"A00010 OK\r\n", "A0001"));
        assert!(!is_tagged_completion(b"A0001\r\n", "A0001"));

        assert_eq!(
            tagged_completion(b"A0002 NO [AUTHENTICATIONFAILED] nope\r\n", "A0002"),
            Some(Completion::No)
        );
        assert_eq!(
            tagged_completion(b"A0002 BAD\r\n", "A0002"),
            Some(Completion::Bad)
        );
        assert_eq!(tagged_completion(b"* OK hi\r\n", "A0002"), None);
    }

    #[test]
    fn test_line_framing_is_always_terminal() {
        assert!(Framing::Line.is_terminal(b"250-continues\r\n"));
        assert!(Framing::Line.is_terminal(b""));
    }

    #[test]
    fn test_status_token() {
        let smtp = Framing::Multiline;
        let tagged = Framing::Tagged("A0003".into());
        assert_eq!(status_token(b"250-PIPELINING\r\n", &smtp), b"250");
        assert_eq!(status_token(b"220 localhost\r\n", &Framing::Line), b"220");
        assert_eq!(status_token(b"* OK ready\r\n", &Framing::Line), b"*");
        assert_eq!(status_token(b"A0003 OK SEARCH done\r\n", &tagged), b"OK");
        assert_eq!(status_token(b"A0003 NO\r\n", &tagged), b"NO");
        assert_eq!(status_token(b"", &Framing::Line), b"");
    }

    proptest! {
        #[test]
        fn prop_space_terminates(code in 100u16..600, text in "[ -~]{0,60}") {
            let line = format!("{code} {text}\r\n");
            prop_assert!(is_final_reply_line(line.as_bytes()));
        }

        #[test]
        fn prop_hyphen_continues(code in 100u16..600, text in "[ -~]{0,60}") {
            let line = format!("{code}-{text}\r\n");
            prop_assert!(!is_final_reply_line(line.as_bytes()));
        }

        #[test]
        fn prop_tag_must_be_followed_by_space(n in 0u32..10_000, suffix in "[0-9A-Z]{1,3}") {
            let tag = format!("A{n:04}");
            let other = format!("{tag}{suffix} OK done\r\n");
            let own = format!("{tag} OK done\r\n");
            prop_assert!(!is_tagged_completion(other.as_bytes(), &tag));
            prop_assert!(is_tagged_completion(own.as_bytes(), &tag));
        }
    }
}
