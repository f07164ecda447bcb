//! Tolerant parsing of RFC 5322 address headers.
//!
//! Real mail deviates from the grammar constantly, so nothing here ever
//! fails: display names may be unquoted, `(comments)` may appear
//! anywhere, and input that carries no recognizable addr-spec is kept
//! verbatim rather than discarded.

/// One mailbox taken from an address header.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EmailAddress {
    /// Display name with quoting and comments resolved; empty when the
    /// header carried none.
    pub display_name: String,
    /// The addr-spec (`local@domain`), without angle brackets.
    pub address: String,
}

impl EmailAddress {
    /// Parse one mailbox.
    ///
    /// The value is scanned once: `(comments)` are dropped (nesting and
    /// backslash escapes honored), quoted strings contribute to the
    /// display name with their escapes resolved, and the last
    /// `<angle-addr>` provides the address. Without an angle-addr the
    /// remaining text itself is taken as the address.
    pub fn parse(raw: &str) -> Self {
        let mut name_text = String::new();
        let mut angle: Option<String> = None;
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '(' => {
                    let mut depth = 1usize;
                    while depth > 0 {
                        match chars.next() {
                            Some('\\') => {
                                chars.next();
                            }
                            Some('(') => depth += 1,
                            Some(')') => depth -= 1,
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
                '"' => loop {
                    match chars.next() {
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                name_text.push(escaped);
                            }
                        }
                        Some('"') | None => break,
                        Some(other) => name_text.push(other),
                    }
                },
                '<' => {
                    let mut spec = String::new();
                    loop {
                        match chars.next() {
                            Some('>') | None => break,
                            Some(other) => spec.push(other),
                        }
                    }
                    angle = Some(spec.trim().to_string());
                }
                // Group punctuation, never address text.
                ';' => {}
                other => name_text.push(other),
            }
        }

        let name_text = collapse_whitespace(&name_text);

        match angle {
            Some(address) => Self {
                display_name: name_text,
                address,
            },
            None => Self {
                display_name: String::new(),
                address: name_text,
            },
        }
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas (`"Last, First" <a@b.com>, other@c.com`) and
    /// RFC 5322 group syntax: `Team:a@b.com,c@d.com;` yields the group
    /// members, the group name itself is dropped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();

        for segment in split_address_list(raw) {
            let segment = segment.trim();

            // Group syntax: "name: member, member ;" — the colon must come
            // before any '<' or '@' to avoid eating "Name <a@b>" or IPv6-ish
            // address text.
            if let Some(colon) = segment.find(':') {
                let before = &segment[..colon];
                if !before.contains('<') && !before.contains('@') && !before.contains('"') {
                    let members = segment[colon + 1..].trim_end_matches(';');
                    for member in split_address_list(members) {
                        let addr = Self::parse(&member);
                        if !addr.address.is_empty() {
                            results.push(addr);
                        }
                    }
                    continue;
                }
            }

            let addr = Self::parse(segment);
            if !addr.address.is_empty() {
                results.push(addr);
            }
        }

        results
    }
}

/// Split a header value on commas, respecting double quotes and angle
/// brackets. Empty segments are dropped.
fn split_address_list(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                if !current.trim().is_empty() {
                    segments.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() {
        segments.push(current);
    }

    segments
}

/// Collapse interior whitespace runs to single spaces and trim the ends.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl std::fmt::Display for EmailAddress {
    /// Format as `Name <address>`, re-quoting a display name that
    /// carries list punctuation so the output could be parsed back.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            return f.write_str(&self.address);
        }
        let needs_quotes = self
            .display_name
            .contains(&[',', ';', ':', '<', '>', '"', '@'][..]);
        if needs_quotes {
            write!(
                f,
                "\"{}\" <{}>",
                self.display_name.replace('"', "\\\""),
                self.address
            )
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_addr_spec() {
        let addr = EmailAddress::parse("mara@example.net");
        assert_eq!(addr.address, "mara@example.net");
        assert!(addr.display_name.is_empty());
    }

    #[test]
    fn test_angle_addr_without_name() {
        let addr = EmailAddress::parse("  <mara@example.net>  ");
        assert_eq!(addr.address, "mara@example.net");
        assert!(addr.display_name.is_empty());
    }

    #[test]
    fn test_unquoted_display_name() {
        let addr = EmailAddress::parse("Mara Lindqvist <mara@example.net>");
        assert_eq!(addr.display_name, "Mara Lindqvist");
        assert_eq!(addr.address, "mara@example.net");
    }

    #[test]
    fn test_quoted_name_keeps_comma() {
        let addr = EmailAddress::parse("\"Lindqvist, Mara\" <mara@example.net>");
        assert_eq!(addr.display_name, "Lindqvist, Mara");
        assert_eq!(addr.address, "mara@example.net");
    }

    #[test]
    fn test_escaped_quotes_resolved_in_name() {
        let addr = EmailAddress::parse("\"Mara \\\"ops\\\" Lindqvist\" <mara@example.net>");
        assert_eq!(addr.display_name, "Mara \"ops\" Lindqvist");
    }

    #[test]
    fn test_comment_is_dropped() {
        let addr = EmailAddress::parse("mara@example.net (on leave (until May))");
        assert_eq!(addr.address, "mara@example.net");
        assert!(addr.display_name.is_empty());

        let addr = EmailAddress::parse("Mara (she) <mara@example.net>");
        assert_eq!(addr.display_name, "Mara");
    }

    #[test]
    fn test_name_whitespace_collapsed() {
        let addr = EmailAddress::parse("Mara   J.\tLindqvist <mara@example.net>");
        assert_eq!(addr.display_name, "Mara J. Lindqvist");
    }

    #[test]
    fn test_unparseable_text_preserved() {
        let addr = EmailAddress::parse("not really an address");
        assert_eq!(addr.address, "not really an address");
    }

    #[test]
    fn test_empty_input() {
        let addr = EmailAddress::parse("   ");
        assert!(addr.address.is_empty());
        assert!(addr.display_name.is_empty());
    }

    #[test]
    fn test_list_with_mixed_forms() {
        let list = EmailAddress::parse_list(
            "Ops <ops@example.net>, (watch) mara@example.net, \"Q, A\" <qa@example.net>",
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].display_name, "Ops");
        assert_eq!(list[1].address, "mara@example.net");
        assert_eq!(list[2].display_name, "Q, A");
        assert_eq!(list[2].address, "qa@example.net");
    }

    #[test]
    fn test_group_is_flattened() {
        let list =
            EmailAddress::parse_list("leads:ana@example.net,\"B, C\" <bc@example.net>;");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].address, "ana@example.net");
        assert_eq!(list[1].display_name, "B, C");
        assert_eq!(list[1].address, "bc@example.net");
    }

    #[test]
    fn test_empty_group_yields_nothing() {
        assert!(EmailAddress::parse_list("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_display_requotes_punctuated_name() {
        let addr = EmailAddress {
            display_name: "Lindqvist, Mara".to_string(),
            address: "mara@example.net".to_string(),
        };
        assert_eq!(addr.to_string(), "\"Lindqvist, Mara\" <mara@example.net>");

        let plain = EmailAddress {
            display_name: "Mara".to_string(),
            address: "mara@example.net".to_string(),
        };
        assert_eq!(plain.to_string(), "Mara <mara@example.net>");

        let bare = EmailAddress {
            display_name: String::new(),
            address: "mara@example.net".to_string(),
        };
        assert_eq!(bare.to_string(), "mara@example.net");
    }
}
