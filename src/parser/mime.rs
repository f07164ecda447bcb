//! MIME structure: sub-part header parsing, the recursive multipart
//! walker, S/MIME envelope/signature handling, and HTML-to-text
//! conversion.

use tracing::warn;

use crate::model::flags::ProcessingFlags;
use crate::parser::encoding::{decode_transfer_encoding, BASE64_RFC2045};
use crate::parser::header::{
    find_subslice, split_at_blank_line, strip_angle_brackets, tokenize_headers,
};
use crate::parser::smime::CmsProvider;
use crate::parser::tnef::TnefDecoder;

/// One leaf of the MIME tree, with its transfer encoding removed.
#[derive(Debug, Clone, Default)]
pub struct MimePart {
    /// Filename, when the part declared one.
    pub name: String,
    /// Content type without parameters.
    pub content_type: String,
    /// Declared character set (may be empty).
    pub charset: String,
    /// Content-ID without the surrounding angle brackets.
    pub content_id: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
    /// The part was covered by a verified detached signature.
    pub smime_signed: bool,
    /// The part came out of a decrypted CMS envelope.
    pub smime_encrypted_envelope: bool,
    /// Signed, encrypted, and signed again.
    pub smime_triple_wrapped: bool,
}

/// Content metadata scraped from one sub-part's header block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartHeaders {
    /// Content-Type with its parameters still attached.
    pub content_type: String,
    /// Charset from the Content-Type's `charset=` parameter.
    pub charset: String,
    pub content_transfer_encoding: String,
    pub content_disposition: String,
    /// Filename from Content-Disposition's or Content-Type's `name=`.
    pub file_name: String,
    /// Content-ID without angle brackets.
    pub content_id: String,
}

impl PartHeaders {
    /// Parse a sub-part header block. Uses the same folding rules as the
    /// message-level tokenizer; absent headers leave empty fields.
    pub fn parse(block: &str) -> Self {
        let mut out = Self::default();

        for (name, value) in tokenize_headers(block) {
            match name.as_str() {
                "content-type" => {
                    if out.content_type.is_empty() {
                        out.content_type = value;
                    }
                }
                "content-transfer-encoding" => {
                    out.content_transfer_encoding = value.trim().to_string();
                }
                "content-disposition" => out.content_disposition = value,
                "content-id" => out.content_id = strip_angle_brackets(&value),
                _ => {}
            }
        }

        if let Some(charset) = scan_parameter(&out.content_type, "charset=") {
            out.charset = charset;
        }
        // "name=" also matches "filename="; the disposition wins.
        if let Some(name) = scan_parameter(&out.content_disposition, "name=") {
            out.file_name = name;
        } else if let Some(name) = scan_parameter(&out.content_type, "name=") {
            out.file_name = name;
        }

        out
    }
}

/// Scan a header value for `key` and return the parameter value that
/// follows it: a quoted string, or everything up to the next `;`.
pub fn scan_parameter(value: &str, key: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let start = lower.find(&key.to_ascii_lowercase())? + key.len();
    let rest = value[start..].trim_start();

    let found = if let Some(quoted) = rest.strip_prefix('"') {
        match quoted.find('"') {
            Some(end) => &quoted[..end],
            None => quoted,
        }
    } else {
        match rest.find(';') {
            Some(end) => &rest[..end],
            None => rest,
        }
    };

    let found = found.trim();
    if found.is_empty() {
        None
    } else {
        Some(found.to_string())
    }
}

/// Drop `";…"` parameters from a content type.
pub fn strip_parameters(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

fn is_pkcs7_signature(content_type: &str) -> bool {
    content_type.starts_with("application/pkcs7-signature")
        || content_type.starts_with("application/x-pkcs7-signature")
}

fn is_pkcs7_mime(content_type: &str) -> bool {
    content_type.starts_with("application/pkcs7-mime")
        || content_type.starts_with("application/x-pkcs7-mime")
}

fn is_tnef(content_type: &str, file_name: &str) -> bool {
    content_type.starts_with("application/ms-tnef") || file_name.eq_ignore_ascii_case("winmail.dat")
}

/// Decode the wire form of a cryptographic or TNEF payload: the declared
/// transfer encoding when there is one, otherwise the conventional
/// base64 (falling back to the raw bytes).
fn wire_decode(transfer_encoding: &str, body: &[u8]) -> Vec<u8> {
    let encoding = transfer_encoding.trim();
    if encoding.is_empty() || encoding.eq_ignore_ascii_case("7bit")
        || encoding.eq_ignore_ascii_case("8bit")
    {
        match BASE64_RFC2045.decode(body) {
            Ok(bytes) => bytes,
            Err(_) => body.to_vec(),
        }
    } else {
        decode_transfer_encoding(encoding, body)
    }
}

/// Recursive MIME walker.
///
/// Walks one body according to its content type and flattens the tree
/// into an ordered list of leaf [`MimePart`]s, delegating cryptography
/// and TNEF decoding to the injected capabilities.
pub struct MimeWalker<'a> {
    pub cms: &'a dyn CmsProvider,
    pub tnef: &'a dyn TnefDecoder,
    pub flags: ProcessingFlags,
}

impl MimeWalker<'_> {
    /// Split a body into its leaf parts.
    ///
    /// `content_type` may still carry parameters (the multipart boundary
    /// lives there). Unknown structures degrade to a single leaf part.
    pub fn extract_parts(
        &self,
        content_type: &str,
        transfer_encoding: &str,
        body: &[u8],
    ) -> Vec<MimePart> {
        let mut parts = Vec::new();

        if content_type.starts_with("multipart/") {
            self.walk_multipart(content_type, body, &mut parts);
        } else if content_type.starts_with("application/ms-tnef") {
            let bundle = wire_decode(transfer_encoding, body);
            self.expand_tnef(&bundle, &mut parts);
        } else if is_pkcs7_mime(content_type) {
            let envelope = wire_decode(transfer_encoding, body);
            if self
                .flags
                .contains(ProcessingFlags::INCLUDE_SMIME_ENCRYPTED_ENVELOPE_DATA)
            {
                parts.push(MimePart {
                    name: "smime.p7m".to_string(),
                    content_type: strip_parameters(content_type),
                    bytes: envelope.clone(),
                    ..Default::default()
                });
            }
            self.expand_envelope(&envelope, &mut parts);
        } else {
            parts.push(self.single_part(content_type, transfer_encoding, body));
        }

        parts
    }

    /// A block that is not structured: it may still open with its own
    /// MIME headers (Content-Type, filename, …), which are honored when
    /// present.
    fn single_part(&self, content_type: &str, transfer_encoding: &str, body: &[u8]) -> MimePart {
        if let (head, Some(rest)) = split_at_blank_line(body) {
            let inner = PartHeaders::parse(&String::from_utf8_lossy(head));
            if !inner.content_type.is_empty()
                || !inner.file_name.is_empty()
                || !inner.content_id.is_empty()
            {
                let ct = if inner.content_type.is_empty() {
                    content_type
                } else {
                    inner.content_type.as_str()
                };
                let cte = if inner.content_transfer_encoding.is_empty() {
                    transfer_encoding
                } else {
                    inner.content_transfer_encoding.as_str()
                };
                return leaf(ct, cte, &inner, rest);
            }
        }

        let mut headers = PartHeaders::default();
        if let Some(charset) = scan_parameter(content_type, "charset=") {
            headers.charset = charset;
        }
        leaf(content_type, transfer_encoding, &headers, body)
    }

    fn walk_multipart(&self, content_type: &str, body: &[u8], parts: &mut Vec<MimePart>) {
        let boundary = match scan_parameter(content_type, "boundary=") {
            Some(b) => b,
            None => {
                warn!(content_type, "multipart without a boundary");
                return;
            }
        };
        let delimiter = format!("--{boundary}");

        // Positions of every "--boundary" occurrence; the span between
        // two consecutive occurrences is one sub-part.
        let mut positions = Vec::new();
        let mut at = 0;
        while let Some(found) = find_subslice(&body[at..], delimiter.as_bytes()) {
            positions.push(at + found);
            at += found + delimiter.len();
        }
        if positions.len() < 2 {
            return;
        }

        let mut local: Vec<MimePart> = Vec::new();
        let mut mime_blocks: Vec<Vec<u8>> = Vec::new();
        let mut signature_block: Option<usize> = None;
        let mut signature_count = 0usize;

        for pair in positions.windows(2) {
            let span = &body[pair[0] + delimiter.len()..pair[1]];
            let (sub_headers, sub_body): (&[u8], &[u8]) = match split_at_blank_line(span) {
                (head, Some(rest)) => (head, rest),
                (_, None) => (&[], span),
            };
            let headers = PartHeaders::parse(&String::from_utf8_lossy(sub_headers));
            let content_type = headers.content_type.clone();

            mime_blocks.push(sub_body.to_vec());
            let block_index = mime_blocks.len() - 1;

            if content_type.starts_with("multipart/") {
                let nested = self.extract_parts(
                    &content_type,
                    &headers.content_transfer_encoding,
                    sub_body,
                );
                local.extend(nested);
            } else if is_pkcs7_signature(&content_type) {
                signature_count += 1;
                signature_block = Some(block_index);
                if self.flags.contains(ProcessingFlags::INCLUDE_SMIME_SIGNED_DATA) {
                    let name = if headers.file_name.is_empty() {
                        "smime.p7s".to_string()
                    } else {
                        headers.file_name.clone()
                    };
                    local.push(MimePart {
                        name,
                        content_type: strip_parameters(&content_type),
                        content_id: headers.content_id.clone(),
                        bytes: wire_decode(&headers.content_transfer_encoding, sub_body),
                        ..Default::default()
                    });
                }
            } else if is_pkcs7_mime(&content_type) {
                let envelope = wire_decode(&headers.content_transfer_encoding, sub_body);
                if self
                    .flags
                    .contains(ProcessingFlags::INCLUDE_SMIME_ENCRYPTED_ENVELOPE_DATA)
                {
                    local.push(MimePart {
                        name: "smime.p7m".to_string(),
                        content_type: strip_parameters(&content_type),
                        bytes: envelope.clone(),
                        ..Default::default()
                    });
                }
                self.expand_envelope(&envelope, &mut local);
            } else if is_tnef(&content_type, &headers.file_name) {
                let bundle = wire_decode(&headers.content_transfer_encoding, sub_body);
                self.expand_tnef(&bundle, &mut local);
            } else {
                // The CRLF immediately before the next delimiter belongs
                // to the delimiter line, not to this part.
                let content = sub_body.strip_suffix(b"\r\n").unwrap_or(sub_body);
                local.push(leaf(
                    &content_type,
                    &headers.content_transfer_encoding,
                    &headers,
                    content,
                ));
            }
        }

        // Detached-signature attestation: exactly one signature sibling
        // next to exactly one content block.
        if signature_count == 1 && mime_blocks.len() == 2 {
            let sig_index = signature_block.unwrap_or_default();
            let mut signature = mime_blocks[sig_index].clone();
            if signature.ends_with(b"\r\n\r\n") {
                signature.truncate(signature.len() - 4);
            }
            let content = &mime_blocks[1 - sig_index];
            if self.cms.verify_signature(&signature, content) {
                for part in local.iter_mut() {
                    part.smime_signed = true;
                    if part.smime_encrypted_envelope {
                        part.smime_triple_wrapped = true;
                    }
                }
            }
        }

        parts.append(&mut local);
    }

    /// Decrypt a CMS envelope and walk the plaintext as a full MIME
    /// message. Failure drops the envelope's content silently.
    fn expand_envelope(&self, envelope: &[u8], parts: &mut Vec<MimePart>) {
        let plaintext = match self.cms.decrypt_envelope(envelope) {
            Some(p) => p,
            None => {
                warn!("CMS envelope could not be decrypted, dropping its content");
                return;
            }
        };

        let (head, rest) = split_at_blank_line(&plaintext);
        let (header_block, body): (&[u8], &[u8]) = match rest {
            Some(body) => (head, body),
            None => (plaintext.as_slice(), &[]),
        };
        let headers = PartHeaders::parse(&String::from_utf8_lossy(header_block));

        for mut part in self.extract_parts(
            &headers.content_type,
            &headers.content_transfer_encoding,
            body,
        ) {
            part.smime_encrypted_envelope = true;
            parts.push(part);
        }
    }

    /// Decode a TNEF bundle and flatten it into the part list.
    fn expand_tnef(&self, bundle: &[u8], parts: &mut Vec<MimePart>) {
        let content = match self.tnef.decode(bundle) {
            Some(c) => c,
            None => {
                warn!("TNEF bundle could not be decoded, dropping it");
                return;
            }
        };

        if self.flags.contains(ProcessingFlags::INCLUDE_WINMAIL_DATA) {
            if let Some(body) = &content.body {
                if !body.is_empty() {
                    parts.push(MimePart {
                        name: "winmail.dat".to_string(),
                        content_type: content.content_type.clone(),
                        bytes: body.clone().into_bytes(),
                        ..Default::default()
                    });
                }
            }
        }

        for attachment in content.attachments {
            parts.push(MimePart {
                name: attachment.name,
                content_type: attachment.content_type,
                bytes: attachment.bytes,
                ..Default::default()
            });
        }
    }
}

/// A part whose content-type begins with one of the PKCS#7 prefixes is
/// cryptographic plumbing, not message content.
pub fn is_cryptographic(content_type: &str) -> bool {
    content_type.starts_with("application/pkcs7-signature")
        || content_type.starts_with("application/x-pkcs7-signature")
        || content_type.starts_with("application/pkcs7-mime")
}

fn leaf(content_type: &str, transfer_encoding: &str, headers: &PartHeaders, body: &[u8]) -> MimePart {
    MimePart {
        name: headers.file_name.clone(),
        content_type: strip_parameters(content_type),
        charset: headers.charset.clone(),
        content_id: headers.content_id.clone(),
        bytes: decode_transfer_encoding(transfer_encoding, body),
        ..Default::default()
    }
}

// ── HTML to text ────────────────────────────────────────────────────

/// Entities worth resolving in mail bodies. Anything else is left
/// untouched rather than half-decoded.
const HTML_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("#39", "'"),
    ("nbsp", " "),
    ("#160", " "),
];

/// Render an HTML body as plain text.
///
/// This backs [`crate::model::message::ParsedMessage::plain_text_body`]
/// and is a display aid, not an HTML parser: the input is scanned once,
/// tags are dropped, block-level tags break lines, `script`/`style`
/// content is skipped entirely, and common entities are resolved.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        push_with_entities(&mut out, &rest[..open]);
        let after = &rest[open + 1..];
        let close = match after.find('>') {
            Some(c) => c,
            // Unterminated tag: nothing renderable follows.
            None => {
                rest = "";
                break;
            }
        };
        let name = tag_name(&after[..close]);
        rest = &after[close + 1..];

        if name == "script" || name == "style" {
            rest = match skip_past_close_tag(rest, &name) {
                Some(remainder) => remainder,
                None => "",
            };
        } else if is_block_tag(&name) {
            out.push('\n');
        }
    }
    push_with_entities(&mut out, rest);

    condense_lines(&out)
}

/// Element name of a tag body like `"p"`, `"/div"`, or `"br/"`,
/// lowercased, attributes ignored.
fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "br" | "p"
            | "div"
            | "tr"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "blockquote"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

/// Position just past `</name …>`, case-insensitive.
fn skip_past_close_tag<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("</{name}");
    let at = html.to_ascii_lowercase().find(&marker)?;
    let end = html[at..].find('>')?;
    Some(&html[at + end + 1..])
}

/// Append `text` with [`HTML_ENTITIES`] resolved. Unknown or
/// unterminated entities pass through as-is.
fn push_with_entities(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let resolved = tail
            .find(';')
            .filter(|&end| end <= 6)
            .and_then(|end| {
                HTML_ENTITIES
                    .iter()
                    .find(|(name, _)| *name == &tail[..end])
                    .map(|(_, replacement)| (end, *replacement))
            });
        match resolved {
            Some((end, replacement)) => {
                out.push_str(replacement);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
}

/// Trim every line and squeeze runs of blank lines down to one.
fn condense_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = true; // swallows leading blanks
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !blank_run {
                out.push('\n');
            }
            blank_run = true;
        } else {
            out.push_str(line);
            out.push('\n');
            blank_run = false;
        }
    }
    out.trim_end().to_string()
}
