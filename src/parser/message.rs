//! The top-level message parser: envelope headers, body selection, and
//! S/MIME attribute aggregation.

use crate::model::address::EmailAddress;
use crate::model::attachment::Attachment;
use crate::model::flags::ProcessingFlags;
use crate::model::message::{ExtendedHeaders, ParsedMessage, Priority};
use crate::parser::encoding::decode_charset;
use crate::parser::header::{
    decode_encoded_words, normalize_line_endings, parse_date, split_at_blank_line,
    strip_angle_brackets, tokenize_headers,
};
use crate::parser::mime::{self, MimePart, MimeWalker};
use crate::parser::smime::{CmsProvider, NoCms};
use crate::parser::tnef::{NoTnef, TnefDecoder};

/// Parse a raw message with default options: no raw retention, no
/// extended headers, no CMS or TNEF capability.
pub fn parse(raw: &[u8]) -> ParsedMessage {
    MessageParser::new().parse(raw)
}

/// Configurable message parser.
///
/// Parsing is fail-open: whatever the input looks like, a
/// [`ParsedMessage`] comes back. A parser can be reused for any number
/// of messages.
///
/// ```
/// use mailsift::parser::message::MessageParser;
///
/// let msg = MessageParser::new().parse(b"Subject: hi\r\n\r\nhello");
/// assert_eq!(msg.subject, "hi");
/// assert_eq!(msg.body_text, "hello");
/// ```
pub struct MessageParser {
    flags: ProcessingFlags,
    parse_extended: bool,
    cms: Box<dyn CmsProvider>,
    tnef: Box<dyn TnefDecoder>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        Self {
            flags: ProcessingFlags::empty(),
            parse_extended: false,
            cms: Box::new(NoCms),
            tnef: Box::new(NoTnef),
        }
    }

    /// Set the processing flags.
    pub fn with_flags(mut self, flags: ProcessingFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Also capture the extended header set.
    pub fn with_extended_headers(mut self, enabled: bool) -> Self {
        self.parse_extended = enabled;
        self
    }

    /// Supply the CMS capability used for S/MIME envelopes and
    /// signatures.
    pub fn with_cms(mut self, cms: impl CmsProvider + 'static) -> Self {
        self.cms = Box::new(cms);
        self
    }

    /// Supply the TNEF decoder used for `winmail.dat` bundles.
    pub fn with_tnef(mut self, tnef: impl TnefDecoder + 'static) -> Self {
        self.tnef = Box::new(tnef);
        self
    }

    /// Parse a full raw message (headers, blank line, body).
    pub fn parse(&self, raw: &[u8]) -> ParsedMessage {
        let mut msg = ParsedMessage {
            size: raw.len() as u64,
            ..Default::default()
        };

        let data = normalize_line_endings(raw);
        let (header_block, body) = split_at_blank_line(&data);
        let body = body.unwrap_or(b"");

        if self.flags.contains(ProcessingFlags::INCLUDE_RAW_HEADERS) {
            msg.raw_headers = Some(String::from_utf8_lossy(header_block).into_owned());
        }
        if self.flags.contains(ProcessingFlags::INCLUDE_RAW_BODY) {
            msg.raw_body = Some(String::from_utf8_lossy(body).into_owned());
        }

        if self.parse_extended {
            msg.extended = Some(ExtendedHeaders::default());
        }

        let header_text = String::from_utf8_lossy(header_block);
        for (name, value) in tokenize_headers(&header_text) {
            assign_header(&mut msg, &name, &value);
        }

        // Robustness deviation: the top-level Content-Type may declare a
        // charset too, not just MIME sub-parts.
        if msg.charset.is_empty() {
            if let Some(charset) = mime::scan_parameter(&msg.content_type, "charset=") {
                msg.charset = charset;
            }
        }

        let top_content_type = msg.content_type.clone();
        let walker = MimeWalker {
            cms: self.cms.as_ref(),
            tnef: self.tnef.as_ref(),
            flags: self.flags,
        };
        let parts = walker.extract_parts(
            &top_content_type,
            &msg.content_transfer_encoding,
            body,
        );

        aggregate_smime(&mut msg, &parts);
        select_body(&mut msg, parts);

        // A multipart whose boundary never matched yields nothing; fall
        // back to the undecoded body.
        if msg.body_text.is_empty()
            && top_content_type.starts_with("multipart/")
            && msg.attachments.is_empty()
        {
            msg.body_text = String::from_utf8_lossy(body).into_owned();
        }

        extract_inline_subject(&mut msg);

        msg
    }

    /// Construct from a separate header block and body, equivalent to
    /// parsing `headers + "\r\n\r\n" + body`.
    pub fn parse_parts(&self, headers: &[u8], body: &[u8]) -> ParsedMessage {
        let mut raw = Vec::with_capacity(headers.len() + 4 + body.len());
        raw.extend_from_slice(headers);
        raw.extend_from_slice(b"\r\n\r\n");
        raw.extend_from_slice(body);
        self.parse(&raw)
    }
}

/// Assign one tokenized header to its message field.
///
/// Single-valued headers are overwritten by later occurrences, except
/// Content-Type where the first wins; the Received chain accumulates.
fn assign_header(msg: &mut ParsedMessage, name: &str, value: &str) {
    match name {
        "from" => {
            msg.from = EmailAddress::parse_list(&decode_encoded_words(value))
                .into_iter()
                .next();
        }
        "to" => msg.to = EmailAddress::parse_list(&decode_encoded_words(value)),
        "cc" => msg.cc = EmailAddress::parse_list(&decode_encoded_words(value)),
        "bcc" => msg.bcc = EmailAddress::parse_list(&decode_encoded_words(value)),
        "reply-to" | "replyto" => {
            msg.reply_to = EmailAddress::parse_list(&decode_encoded_words(value));
        }
        "sender" | "x-sender" => {
            msg.sender = EmailAddress::parse_list(&decode_encoded_words(value))
                .into_iter()
                .next();
        }
        "subject" => {
            let decoded = decode_encoded_words(value);
            msg.subject = decoded.replace('\r', "").replace('\n', "");
        }
        "date" | "resent-date" | "x-original-arrival-time" => msg.date = parse_date(value),
        "message-id" => msg.message_id = strip_angle_brackets(value),
        "in-reply-to" => msg.in_reply_to = strip_angle_brackets(value),
        "return-path" => msg.return_path = strip_angle_brackets(value),
        "content-type" => {
            if msg.content_type.is_empty() {
                msg.content_type = value.trim().to_string();
            }
        }
        "content-transfer-encoding" => {
            msg.content_transfer_encoding = value.trim().to_string();
        }
        "content-language" => msg.content_language = value.trim().to_string(),
        "delivered-to" => msg.delivered_to = value.trim().to_string(),
        "importance" => msg.importance = value.trim().to_string(),
        "received" | "x-received" => msg.received_chain.push(value.to_string()),
        "x-priority" => msg.priority = Priority::parse(value),
        "x-subject-encryption" => {
            msg.subject_encryption = value.trim().eq_ignore_ascii_case("true");
        }
        _ => {
            if let Some(extended) = msg.extended.as_mut() {
                assign_extended(extended, name, value);
            }
        }
    }
}

fn assign_extended(extended: &mut ExtendedHeaders, name: &str, value: &str) {
    let trimmed = value.trim();
    match name {
        "authentication-results" => {
            extended.authentication_results = value.to_string();
        }
        "x-auto-response-suppress" => {
            extended.auto_response_suppress = trimmed.to_string();
        }
        "bounces-to" | "x-bounces-to" => extended.bounces_to = trimmed.to_string(),
        "x-campaign" | "x-campaign-id" | "x-campaignid" | "x-mc-campaign" => {
            extended.campaign_id = trimmed.to_string();
        }
        "x-delivery-context" => extended.delivery_context = trimmed.to_string(),
        "disposition-notification-to" => {
            extended.disposition_notification_to = trimmed.to_string();
        }
        "dkim-signature" | "domainkey-signature" | "x-google-dkim-signature" => {
            extended.dkim_signature = value.to_string();
        }
        "errors-to" => extended.errors_to = trimmed.to_string(),
        "list-unsubscribe" => extended.list_unsubscribe = trimmed.to_string(),
        "mail-list-id" | "x-mail-list-id" | "x-mailing-list" => {
            extended.mail_list_id = trimmed.to_string();
        }
        "mailer" | "x-mailer" => extended.mailer = trimmed.to_string(),
        "x-msmail-priority" => extended.msmail_priority = trimmed.to_string(),
        "organization" | "organisation" | "x-organization" => {
            extended.organization = trimmed.to_string();
        }
        "original-message-id" | "x-original-message-id" => {
            extended.original_message_id = strip_angle_brackets(value);
        }
        "originating-email" | "x-originating-email" => {
            extended.originating_email = trimmed.to_string();
        }
        "originating-ip" | "x-originating-ip" => {
            extended.originating_ip = trimmed.to_string();
        }
        "precedence" => extended.precedence = trimmed.to_string(),
        "rcpt-to" | "x-rcpt-to" => {
            // The value arrives wrapped (usually in angle brackets):
            // drop one character from each end.
            let mut chars = trimmed.chars();
            chars.next();
            chars.next_back();
            extended.rcpt_to = chars.as_str().to_string();
        }
        "received-spf" => extended.received_spf = value.to_string(),
        "references" => extended.references = value.to_string(),
        "report-abuse" | "x-report-abuse" | "x-report-abuse-to" => {
            extended.report_abuse = trimmed.to_string();
        }
        "resent-from" => extended.resent_from = value.to_string(),
        "resent-message-id" => extended.resent_message_id = strip_angle_brackets(value),
        "x-spam-score" => extended.spam_score = trimmed.to_string(),
        "thread-index" => extended.thread_index = trimmed.to_string(),
        "thread-topic" => extended.thread_topic = trimmed.to_string(),
        "user-agent" => extended.user_agent = trimmed.to_string(),
        _ => {}
    }
}

/// Fold the per-part S/MIME bits into the message-level booleans: the
/// AND over every part that is message content rather than cryptographic
/// plumbing. With no content parts at all the attributes hold vacuously.
fn aggregate_smime(msg: &mut ParsedMessage, parts: &[MimePart]) {
    // Nothing survived the walk (failed decrypt, undecodable TNEF):
    // the attributes stay unset.
    if parts.is_empty() {
        return;
    }

    let mut signed = true;
    let mut encrypted = true;
    let mut triple_wrapped = true;

    for part in parts {
        if mime::is_cryptographic(&part.content_type) {
            continue;
        }
        signed &= part.smime_signed;
        encrypted &= part.smime_encrypted_envelope;
        triple_wrapped &= part.smime_triple_wrapped;
    }

    msg.smime_signed = signed;
    msg.smime_encrypted_envelope = encrypted;
    msg.smime_triple_wrapped = triple_wrapped;
}

/// Pick the canonical body and file everything else as attachments.
///
/// The first `text/*` (or untyped) part becomes the body; a later
/// `text/html` part replaces a non-HTML pick, and the displaced part is
/// discarded rather than attached. Non-text parts always become
/// attachments.
fn select_body(msg: &mut ParsedMessage, parts: Vec<MimePart>) {
    let mut have_body = false;

    for part in parts {
        let is_text = part.content_type.is_empty() || part.content_type.starts_with("text/");

        if is_text {
            if !have_body {
                have_body = true;
                set_body(msg, part);
            } else if !msg.is_body_html && part.content_type.starts_with("text/html") {
                set_body(msg, part);
            }
            // Remaining alternative renderings are dropped.
        } else {
            msg.attachments.push(Attachment {
                name: part.name,
                content_type: part.content_type,
                content_id: part.content_id,
                bytes: part.bytes,
            });
        }
    }
}

fn set_body(msg: &mut ParsedMessage, part: MimePart) {
    msg.is_body_html = part.content_type.starts_with("text/html");
    msg.body_text = decode_charset(&part.charset, &part.bytes);
    msg.content_type = part.content_type;
    if !part.charset.is_empty() {
        msg.charset = part.charset;
    }
}

/// The `X-Subject-Encryption` extension: the real subject rides on the
/// first line of the body as `"Subject: …"`.
fn extract_inline_subject(msg: &mut ParsedMessage) {
    if !msg.subject_encryption {
        return;
    }
    let Some(rest) = msg.body_text.strip_prefix("Subject: ") else {
        return;
    };
    match rest.find("\r\n") {
        Some(eol) => {
            msg.subject = rest[..eol].to_string();
            msg.body_text = rest[eol + 2..].to_string();
        }
        None => {
            msg.subject = rest.to_string();
            msg.body_text = String::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::flags::ProcessingFlags;

    #[test]
    fn test_minimal_message() {
        let msg = parse(b"From: a@x\r\nTo: b@y\r\nSubject: hi\r\n\r\nhello");
        assert_eq!(msg.from.as_ref().unwrap().address, "a@x");
        assert_eq!(msg.to.len(), 1);
        assert_eq!(msg.to[0].address, "b@y");
        assert_eq!(msg.subject, "hi");
        assert_eq!(msg.body_text, "hello");
        assert!(!msg.is_body_html);
        assert!(!msg.smime_signed);
    }

    #[test]
    fn test_lf_only_message() {
        let msg = parse(b"Subject: lax\n\nstill works");
        assert_eq!(msg.subject, "lax");
        assert_eq!(msg.body_text, "still works");
    }

    #[test]
    fn test_headers_only_message() {
        let msg = parse(b"Subject: all headers\r\nX-More: yes");
        assert_eq!(msg.subject, "all headers");
        assert_eq!(msg.body_text, "");
    }

    #[test]
    fn test_content_type_first_wins() {
        let msg = parse(b"Content-Type: text/plain\r\nContent-Type: text/html\r\n\r\nx");
        assert_eq!(msg.content_type, "text/plain");
    }

    #[test]
    fn test_delivered_to_last_wins() {
        let msg = parse(b"Delivered-To: one@x\r\nDelivered-To: two@x\r\n\r\n");
        assert_eq!(msg.delivered_to, "two@x");
    }

    #[test]
    fn test_extended_headers_disabled_by_default() {
        let msg = parse(b"User-Agent: muttish\r\n\r\n");
        assert!(msg.extended.is_none());
    }

    #[test]
    fn test_extended_headers_accumulate() {
        let raw = concat!(
            "User-Agent: muttish\r\n",
            "X-Mailer: quill 2.0\r\n",
            "X-Originating-IP: [10.0.0.1]\r\n",
            "RCPT-To: <box@example.com>\r\n",
            "\r\n",
        );
        let msg = MessageParser::new()
            .with_extended_headers(true)
            .parse(raw.as_bytes());
        let extended = msg.extended.unwrap();
        assert_eq!(extended.user_agent, "muttish");
        assert_eq!(extended.mailer, "quill 2.0");
        assert_eq!(extended.originating_ip, "[10.0.0.1]");
        assert_eq!(extended.rcpt_to, "box@example.com");
    }

    #[test]
    fn test_raw_retention_reconstructs_input() {
        let raw = b"From: a@x\r\nSubject: raw\r\n\r\nbody text";
        let msg = MessageParser::new()
            .with_flags(ProcessingFlags::INCLUDE_RAW_HEADERS | ProcessingFlags::INCLUDE_RAW_BODY)
            .parse(raw);
        let rebuilt = format!(
            "{}\r\n\r\n{}",
            msg.raw_headers.unwrap(),
            msg.raw_body.unwrap()
        );
        assert_eq!(rebuilt.as_bytes(), raw.as_slice());
    }

    #[test]
    fn test_size_is_input_length() {
        let raw = b"Subject: s\r\n\r\nbody";
        assert_eq!(parse(raw).size, raw.len() as u64);
    }

    #[test]
    fn test_subject_encryption_extraction() {
        let raw = concat!(
            "X-Subject-Encryption: true\r\n",
            "Subject: placeholder\r\n",
            "\r\n",
            "Subject: the real one\r\nactual body",
        );
        let msg = parse(raw.as_bytes());
        assert_eq!(msg.subject, "the real one");
        assert_eq!(msg.body_text, "actual body");
    }

    #[test]
    fn test_subject_encryption_not_triggered_without_header() {
        let msg = parse(b"Subject: s\r\n\r\nSubject: not extracted\r\nbody");
        assert_eq!(msg.subject, "s");
        assert!(msg.body_text.starts_with("Subject: not extracted"));
    }

    #[test]
    fn test_multipart_missing_boundary_falls_back() {
        let msg = parse(b"Content-Type: multipart/mixed\r\n\r\nopaque stuff");
        assert_eq!(msg.body_text, "opaque stuff");
    }

    #[test]
    fn test_vacuous_smime_attributes() {
        // Only cryptographic parts remain (a retained envelope that could
        // not be decrypted): the attributes hold vacuously.
        let raw = b"Content-Type: application/pkcs7-mime\r\n\r\nZW52ZWxvcGU=";
        let msg = MessageParser::new()
            .with_flags(ProcessingFlags::INCLUDE_SMIME_ENCRYPTED_ENVELOPE_DATA)
            .parse(raw);
        assert!(msg.body_text.is_empty());
        assert!(msg.smime_signed);
        assert!(msg.smime_encrypted_envelope);
        assert!(msg.smime_triple_wrapped);
    }

    #[test]
    fn test_failed_decrypt_leaves_attributes_unset() {
        let msg = parse(b"Content-Type: application/pkcs7-mime\r\n\r\nZW52ZWxvcGU=");
        assert!(msg.body_text.is_empty());
        assert!(!msg.smime_signed);
        assert!(!msg.smime_encrypted_envelope);
        assert!(!msg.smime_triple_wrapped);
    }

    #[test]
    fn test_parse_parts_equivalent() {
        let joined = parse(b"Subject: two\r\n\r\nbody");
        let split = MessageParser::new().parse_parts(b"Subject: two", b"body");
        assert_eq!(joined.subject, split.subject);
        assert_eq!(joined.body_text, split.body_text);
    }
}
