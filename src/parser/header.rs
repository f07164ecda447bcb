//! RFC 5322 header parsing: line-ending recovery, continuation-aware
//! tokenizing, encoded-words (RFC 2047), and date parsing.
//!
//! The tokenizer is fail-open: lines that are neither header starts nor
//! recognizable continuations are silently skipped.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::parser::encoding::{decode_charset, decode_word_payload};

/// Recover CR-stripped input: when the blob contains no `\r` at all,
/// every `\n` is promoted to `\r\n`. Input that already carries carriage
/// returns is passed through untouched.
pub fn normalize_line_endings(raw: &[u8]) -> Cow<'_, [u8]> {
    if raw.contains(&b'\r') {
        return Cow::Borrowed(raw);
    }
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 16);
    for &b in raw {
        if b == b'\n' {
            out.extend_from_slice(b"\r\n");
        } else {
            out.push(b);
        }
    }
    Cow::Owned(out)
}

/// Split a block at its first `\r\n\r\n`.
///
/// Returns the head and, when the delimiter was present, the remainder.
pub fn split_at_blank_line(data: &[u8]) -> (&[u8], Option<&[u8]>) {
    match find_subslice(data, b"\r\n\r\n") {
        Some(pos) => (&data[..pos], Some(&data[pos + 4..])),
        None => (data, None),
    }
}

/// First position of `needle` within `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// How a folded continuation line is appended to the previous header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FoldPolicy {
    /// Append the trimmed line with no separator (addresses, subject, …).
    Concat,
    /// Append `"\r\n"` plus the trimmed line (trace headers).
    JoinCrlf,
    /// Single-line header: continuations are dropped.
    Ignore,
}

fn fold_policy(name: &str) -> FoldPolicy {
    match name {
        "bcc" | "cc" | "content-type" | "delivered-to" | "from" | "message-id" | "reply-to"
        | "subject" | "to" | "list-unsubscribe" | "thread-topic" | "x-report-abuse" => {
            FoldPolicy::Concat
        }
        "received" | "x-received" | "authentication-results" | "dkim-signature"
        | "domainkey-signature" | "x-google-dkim-signature" | "received-spf" | "references"
        | "resent-from" => FoldPolicy::JoinCrlf,
        _ => FoldPolicy::Ignore,
    }
}

/// Tokenize a header block into ordered `(name_lowercased, value)` pairs.
///
/// Lines are split on `\r\n`. A line is a header start iff it carries a
/// colon that is neither its first nor its last character; the value
/// starts one position past the colon's trailing space. A line opening
/// with space or tab that is not itself a header start continues the most
/// recent header, with an append policy that depends on that header's
/// name. Values may therefore contain embedded `\r\n`.
pub fn tokenize_headers(block: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in block.split("\r\n") {
        if let Some((name, value)) = split_header_line(line) {
            result.push((name.to_lowercase(), value.to_string()));
        } else if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((name, existing)) = result.last_mut() {
                match fold_policy(name) {
                    FoldPolicy::Concat => existing.push_str(line.trim()),
                    FoldPolicy::JoinCrlf => {
                        existing.push_str("\r\n");
                        existing.push_str(line.trim());
                    }
                    FoldPolicy::Ignore => {}
                }
            }
        }
        // Anything else is silently skipped.
    }

    result
}

/// Split `"Name: value"` into name and value, or `None` when the line is
/// not a header start.
fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    if colon == 0 || colon + 1 >= line.len() {
        return None;
    }
    // The byte after the colon is conventionally a space and is consumed
    // together with the colon.
    let value = line
        .get(colon + 2..)
        .or_else(|| line.get(colon + 1..))
        .unwrap_or("");
    Some((&line[..colon], value))
}

/// Strip leading `<` and trailing `>` from a Message-ID-like value.
pub fn strip_angle_brackets(s: &str) -> String {
    let t = s.trim();
    let t = t.strip_prefix('<').unwrap_or(t);
    let t = t.strip_suffix('>').unwrap_or(t);
    t.to_string()
}

// ── RFC 2047 encoded-words ──────────────────────────────────────────

/// A header value, split into literal runs and decoded encoded-words.
enum Run<'a> {
    Literal(&'a str),
    Decoded(String),
}

/// Decode RFC 2047 encoded-words (`=?charset?B|Q?payload?=`) wherever
/// they occur in a header value.
///
/// The value is first split into runs, then reassembled: tokens that
/// fail to decode stay in the output verbatim, and whitespace that does
/// nothing but separate two decoded words is dropped (RFC 2047 §6.2).
pub fn decode_encoded_words(input: &str) -> String {
    let mut runs: Vec<Run> = Vec::new();
    let mut rest = input;

    while let Some(at) = rest.find("=?") {
        if at > 0 {
            runs.push(Run::Literal(&rest[..at]));
        }
        match decode_one_word(&rest[at..]) {
            Some((text, token_len)) => {
                runs.push(Run::Decoded(text));
                rest = &rest[at + token_len..];
            }
            None => {
                runs.push(Run::Literal("=?"));
                rest = &rest[at + 2..];
            }
        }
    }
    if !rest.is_empty() {
        runs.push(Run::Literal(rest));
    }

    let mut out = String::with_capacity(input.len());
    for index in 0..runs.len() {
        match &runs[index] {
            Run::Decoded(text) => out.push_str(text),
            Run::Literal(text) => {
                let separates_words = text.trim().is_empty()
                    && index > 0
                    && matches!(runs[index - 1], Run::Decoded(_))
                    && matches!(runs.get(index + 1), Some(Run::Decoded(_)));
                if !separates_words {
                    out.push_str(text);
                }
            }
        }
    }
    out
}

/// Decode the encoded-word at the head of `s` (which starts with
/// `"=?"`). Returns the decoded text and the token's total byte length.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let close = inner.find("?=")?;

    let mut fields = inner[..close].splitn(3, '?');
    let charset = fields.next()?;
    let scheme = fields.next()?;
    let payload = fields.next()?;

    let bytes = decode_word_payload(scheme, payload)?;
    Some((decode_charset(charset, &bytes), 2 + close + 2))
}

// ── Date parsing ────────────────────────────────────────────────────

/// Fallback layouts for producers that ignore RFC 5322. Offset-bearing
/// layouts run through `parse_from_str`, the rest parse naive and are
/// taken as UTC.
const DATE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S%.f %z",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S%.f",
    "%d %b %Y %H:%M %z",
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
];

/// Numeric offsets for the timezone abbreviations that actually occur
/// in mail traffic. Anything not listed here is dropped rather than
/// guessed at.
const TZ_OFFSETS: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("BST", "+0100"),
    ("IST", "+0530"),
    ("JST", "+0900"),
];

/// Parse an email date string in various common formats.
///
/// A trailing `"(comment)"` is removed first; RFC 2822 and RFC 3339 are
/// tried on the cleaned string, then the fallback layouts run against
/// progressively repaired candidates (weekday dropped, trailing
/// timezone word resolved to an offset or removed). `mail-parser` gets
/// the last word.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_trailing_comment(date_str.trim());
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    let bare = strip_leading_weekday(cleaned);
    let mut candidates: Vec<Cow<'_, str>> = vec![Cow::Borrowed(cleaned)];
    if bare != cleaned {
        candidates.push(Cow::Borrowed(bare));
    }
    if let Some(resolved) = resolve_trailing_tz(bare) {
        candidates.push(Cow::Owned(resolved));
    }

    for candidate in &candidates {
        for layout in DATE_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, layout) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, layout) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
    }

    let fallback = date_via_mail_parser(cleaned);
    if fallback.is_none() {
        warn!(date = cleaned, "Could not parse date");
    }
    fallback
}

/// Hand the string to `mail-parser` as a synthetic Date header; its
/// parser accepts some shapes ours does not.
fn date_via_mail_parser(input: &str) -> Option<DateTime<Utc>> {
    let synthetic = format!("Date: {input}\r\n\r\n");
    let message = mail_parser::MessageParser::default().parse(synthetic.as_bytes())?;
    let stamp = message.date()?.to_timestamp();
    Utc.timestamp_opt(stamp, 0).single()
}

/// Drop a trailing `"(comment)"`, e.g. `"… +0200 (CEST)"`.
fn strip_trailing_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

/// Drop a leading day-of-week token ("Thu, 04 …", sometimes without the
/// comma). Any short alphabetic lead-in counts, which also covers
/// non-English day names.
fn strip_leading_weekday(s: &str) -> &str {
    if let Some(end) = s.find(|c: char| c == ',' || c == ' ') {
        let token = &s[..end];
        if (2..=3).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic()) {
            return s[end + 1..].trim_start();
        }
    }
    s
}

/// Rewrite a trailing timezone word: a known abbreviation becomes its
/// numeric offset, an unknown one is removed. `None` when the string
/// does not end in a timezone-shaped word.
fn resolve_trailing_tz(s: &str) -> Option<String> {
    let (head, tail) = s.rsplit_once(' ')?;
    if !(2..=5).contains(&tail.len()) || !tail.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let head = head.trim_end();
    match TZ_OFFSETS
        .iter()
        .find(|(name, _)| tail.eq_ignore_ascii_case(name))
    {
        Some((_, offset)) => Some(format!("{head} {offset}")),
        None => Some(head.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lf_only() {
        let out = normalize_line_endings(b"A: 1\nB: 2\n\nbody\n");
        assert_eq!(out.as_ref(), b"A: 1\r\nB: 2\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_normalize_keeps_crlf() {
        let input = b"A: 1\r\nB: 2\r\n\r\nbody".as_slice();
        assert!(matches!(normalize_line_endings(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_split_at_blank_line() {
        let (head, rest) = split_at_blank_line(b"A: 1\r\n\r\nbody");
        assert_eq!(head, b"A: 1");
        assert_eq!(rest, Some(b"body".as_slice()));
    }

    #[test]
    fn test_split_without_delimiter() {
        let (head, rest) = split_at_blank_line(b"A: 1\r\nB: 2");
        assert_eq!(head, b"A: 1\r\nB: 2");
        assert_eq!(rest, None);
    }

    #[test]
    fn test_tokenize_basic() {
        let headers = tokenize_headers("From: a@x\r\nTo: b@y");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0], ("from".to_string(), "a@x".to_string()));
        assert_eq!(headers[1], ("to".to_string(), "b@y".to_string()));
    }

    #[test]
    fn test_tokenize_continuation_concat() {
        let headers = tokenize_headers("Subject: AAA\r\n BBB");
        assert_eq!(headers[0].1, "AAABBB");
    }

    #[test]
    fn test_tokenize_continuation_crlf_join() {
        let headers = tokenize_headers("Received: from a\r\n by b");
        assert_eq!(headers[0].1, "from a\r\nby b");
    }

    #[test]
    fn test_tokenize_continuation_ignored_for_single_line() {
        let headers = tokenize_headers("X-Custom: one\r\n two");
        assert_eq!(headers[0].1, "one");
    }

    #[test]
    fn test_tokenize_skips_garbage_lines() {
        let headers = tokenize_headers("not a header\r\nFrom: a@x\r\n:bad\r\ntrailing:");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "from");
    }

    #[test]
    fn test_tokenize_consumes_char_after_colon() {
        // The character right after the colon is consumed together with
        // it, whether or not it is a space.
        let headers = tokenize_headers("From:xa@x");
        assert_eq!(headers[0].1, "a@x");
    }

    #[test]
    fn test_strip_angle_brackets() {
        assert_eq!(strip_angle_brackets(" <abc@d> "), "abc@d");
        assert_eq!(strip_angle_brackets("abc@d"), "abc@d");
    }

    #[test]
    fn test_encoded_word_base64() {
        assert_eq!(decode_encoded_words("=?utf-8?B?bWFpbHNpZnQ=?="), "mailsift");
    }

    #[test]
    fn test_encoded_word_q_lowercase_scheme() {
        // Scheme letter and charset label are case-insensitive.
        assert_eq!(decode_encoded_words("=?iso-8859-1?q?na=EFve?="), "naïve");
    }

    #[test]
    fn test_adjacent_words_whitespace_folded() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?B?Zm9v?= =?UTF-8?B?YmFy?="),
            "foobar"
        );
    }

    #[test]
    fn test_literal_text_around_words_kept() {
        assert_eq!(
            decode_encoded_words("pre =?UTF-8?B?bWlk?= post"),
            "pre mid post"
        );
    }

    #[test]
    fn test_encoded_word_multibyte() {
        // こんにちは
        assert_eq!(
            decode_encoded_words("=?UTF-8?B?44GT44KT44Gr44Gh44Gv?="),
            "こんにちは"
        );
    }

    #[test]
    fn test_unterminated_word_kept_verbatim() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?B?dHJ1bmNhdGVk"),
            "=?UTF-8?B?dHJ1bmNhdGVk"
        );
    }

    #[test]
    fn test_unknown_scheme_kept_verbatim() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-04 10:00");
    }

    #[test]
    fn test_date_no_weekday() {
        assert!(parse_date("04 Jan 2024 10:00:00 +0000").is_some());
    }

    #[test]
    fn test_date_named_zone_resolved() {
        let with_offset = parse_date("04 Jan 2024 10:00:00 -0500").unwrap();
        let with_name = parse_date("Thu, 04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(with_name, with_offset);
    }

    #[test]
    fn test_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_date_parenthetical_comment() {
        let dt = parse_date("Sun, 02 Oct 2016 07:06:22 -0700 (PDT)").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2016-10-02");
    }

    #[test]
    fn test_date_unknown_zone_dropped() {
        // ACST is not in the offset table; the token is removed and the
        // rest parses as naive UTC.
        let dt = parse_date("04 Jan 2024 10:00:00 ACST").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn test_date_rejects_garbage() {
        assert!(parse_date("yesterday-ish").is_none());
        assert!(parse_date("").is_none());
    }
}
