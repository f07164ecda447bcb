//! The parsed message type and its auxiliary records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::address::EmailAddress;
use super::attachment::Attachment;
use super::flags::MessageFlags;

/// Message priority derived from the `X-Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Parse `"low"` / `"normal"` / `"high"` (case-insensitive).
    /// Anything else maps to `Normal`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// The product of parsing one raw message.
///
/// Constructed in one shot by [`crate::parser::message::MessageParser`]
/// and read-only afterwards. Every field is best-effort: a malformed
/// message yields defaults rather than an error.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ParsedMessage {
    // ── Envelope ────────────────────────────────────────────────────
    /// Sender from the `From:` header (first address).
    pub from: Option<EmailAddress>,
    /// Primary recipients.
    pub to: Vec<EmailAddress>,
    /// Carbon-copy recipients.
    pub cc: Vec<EmailAddress>,
    /// Blind-carbon-copy recipients.
    pub bcc: Vec<EmailAddress>,
    /// Reply-To addresses.
    pub reply_to: Vec<EmailAddress>,
    /// The `Sender:` (or `X-Sender:`) header, if present.
    pub sender: Option<EmailAddress>,
    /// Decoded subject (RFC 2047 encoded-words resolved, line breaks stripped).
    pub subject: String,
    /// Parsed `Date:` header; `None` when unparseable.
    pub date: Option<DateTime<Utc>>,

    // ── Routing ─────────────────────────────────────────────────────
    /// `Message-ID` without the surrounding angle brackets.
    pub message_id: String,
    /// `In-Reply-To` without the surrounding angle brackets.
    pub in_reply_to: String,
    /// The `Delivered-To:` header.
    pub delivered_to: String,
    /// `Return-Path` without the surrounding angle brackets.
    pub return_path: String,
    /// Raw `Received:` / `X-Received:` values in header order.
    pub received_chain: Vec<String>,

    // ── Content metadata ────────────────────────────────────────────
    /// Content type of the selected body part (or the top-level header).
    pub content_type: String,
    /// Top-level `Content-Transfer-Encoding:`.
    pub content_transfer_encoding: String,
    /// The `Content-Language:` header.
    pub content_language: String,
    /// Character set of the selected body part.
    pub charset: String,
    /// The `Importance:` header.
    pub importance: String,
    /// Priority from the `X-Priority:` header.
    pub priority: Priority,

    // ── Body ────────────────────────────────────────────────────────
    /// Decoded canonical body text.
    pub body_text: String,
    /// `true` when `body_text` came from a `text/html` part.
    pub is_body_html: bool,

    /// Attachments in the order they appeared.
    pub attachments: Vec<Attachment>,

    // ── Raw retention ───────────────────────────────────────────────
    /// Raw header block (with `ProcessingFlags::INCLUDE_RAW_HEADERS`).
    pub raw_headers: Option<String>,
    /// Raw body (with `ProcessingFlags::INCLUDE_RAW_BODY`).
    pub raw_body: Option<String>,
    /// Octet count of the input.
    pub size: u64,

    // ── S/MIME attributes ───────────────────────────────────────────
    /// Every content part was covered by a verified detached signature.
    pub smime_signed: bool,
    /// Every content part came out of a decrypted CMS envelope.
    pub smime_encrypted_envelope: bool,
    /// Signed and encrypted and signed again.
    pub smime_triple_wrapped: bool,

    /// Extended headers, populated when extended parsing is enabled.
    pub extended: Option<ExtendedHeaders>,

    // ── Mailstore side-channel ──────────────────────────────────────
    /// Mailbox the message was fetched from (set by the caller).
    pub mailbox: String,
    /// IMAP UID (set by the caller).
    pub imap_uid: u32,
    /// POP3 UIDL (set by the caller).
    pub pop3_uidl: String,
    /// Position within the mailbox (set by the caller).
    pub index: u64,
    /// IMAP system flags.
    pub flags: MessageFlags,
    /// Every flag token as received, original case.
    pub raw_flags: HashSet<String>,

    /// The `X-Subject-Encryption` extension: the real subject travels on
    /// the first line of the (usually encrypted) body.
    pub subject_encryption: bool,
}

impl ParsedMessage {
    /// Ingest an IMAP flag string such as `"\Seen \Answered $Custom"`.
    ///
    /// Recognized system flags are ORed into [`ParsedMessage::flags`];
    /// every token is also recorded verbatim in
    /// [`ParsedMessage::raw_flags`]. Returns the token count.
    pub fn parse_flags(&mut self, raw: &str) -> usize {
        let mut count = 0;
        for token in raw.split(' ') {
            count += 1;
            if token.is_empty() {
                continue;
            }
            self.flags |= MessageFlags::from_token(token);
            self.raw_flags.insert(token.to_string());
        }
        count
    }

    /// The body as plain text: `body_text` itself, or a text rendering of
    /// it when the selected body was HTML.
    pub fn plain_text_body(&self) -> String {
        if self.is_body_html {
            crate::parser::mime::html_to_text(&self.body_text)
        } else {
            self.body_text.clone()
        }
    }
}

/// Less common headers, captured only when extended parsing is enabled.
///
/// Values are stored as received (after continuation unfolding); empty
/// string means the header was absent.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExtendedHeaders {
    /// The `Authentication-Results:` header.
    pub authentication_results: String,
    /// `X-Auto-Response-Suppress`.
    pub auto_response_suppress: String,
    /// `Bounces-To` / `X-Bounces-To`.
    pub bounces_to: String,
    /// Campaign identifier (`X-Campaign-ID` and friends).
    pub campaign_id: String,
    /// `X-Delivery-Context`.
    pub delivery_context: String,
    /// `Disposition-Notification-To`.
    pub disposition_notification_to: String,
    /// DKIM or DomainKey signature (aliases merged, last wins).
    pub dkim_signature: String,
    /// `Errors-To`.
    pub errors_to: String,
    /// `List-Unsubscribe`.
    pub list_unsubscribe: String,
    /// Mailing-list identifier (`Mail-List-Id` / `X-Mail-List-Id`).
    pub mail_list_id: String,
    /// `X-Mailer` / `Mailer`.
    pub mailer: String,
    /// `X-MSMail-Priority`.
    pub msmail_priority: String,
    /// `Organization` (several aliases).
    pub organization: String,
    /// `X-Original-Message-ID`.
    pub original_message_id: String,
    /// `X-Originating-Email`.
    pub originating_email: String,
    /// `X-Originating-IP`.
    pub originating_ip: String,
    /// `Precedence`.
    pub precedence: String,
    /// `RCPT-To` (one character stripped from each end).
    pub rcpt_to: String,
    /// `Received-SPF`.
    pub received_spf: String,
    /// `References`.
    pub references: String,
    /// Abuse-report address (`X-Report-Abuse` and friends).
    pub report_abuse: String,
    /// `Resent-From`.
    pub resent_from: String,
    /// `Resent-Message-ID`.
    pub resent_message_id: String,
    /// Spam score (`X-Spam-Score`).
    pub spam_score: String,
    /// `Thread-Index`.
    pub thread_index: String,
    /// `Thread-Topic`.
    pub thread_topic: String,
    /// `User-Agent`.
    pub user_agent: String,
}
