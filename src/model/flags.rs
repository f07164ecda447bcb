//! Flag bitsets: parse options and IMAP system flags.

bitflags::bitflags! {
    /// Options controlling how much raw and cryptographic material the
    /// parser retains on the produced message.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
    pub struct ProcessingFlags: u8 {
        /// Retain the raw header block on the message.
        const INCLUDE_RAW_HEADERS = 0b0000_0001;
        /// Retain the raw body on the message.
        const INCLUDE_RAW_BODY = 0b0000_0010;
        /// Keep `application/pkcs7-signature` blocks as attachments.
        const INCLUDE_SMIME_SIGNED_DATA = 0b0000_0100;
        /// Keep `application/pkcs7-mime` envelopes as attachments.
        const INCLUDE_SMIME_ENCRYPTED_ENVELOPE_DATA = 0b0000_1000;
        /// Keep the TNEF `winmail.dat` bundle as an attachment.
        const INCLUDE_WINMAIL_DATA = 0b0001_0000;
    }
}

bitflags::bitflags! {
    /// IMAP system flags (RFC 3501 §2.3.2).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
    pub struct MessageFlags: u8 {
        const ANSWERED = 0b0000_0001;
        const DELETED = 0b0000_0010;
        const DRAFT = 0b0000_0100;
        const FLAGGED = 0b0000_1000;
        const RECENT = 0b0001_0000;
        const SEEN = 0b0010_0000;
    }
}

impl MessageFlags {
    /// Map a single flag token (e.g. `"\Seen"`) to its bit.
    /// Unknown tokens map to the empty set.
    pub fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "\\answered" => Self::ANSWERED,
            "\\deleted" => Self::DELETED,
            "\\draft" => Self::DRAFT,
            "\\flagged" => Self::FLAGGED,
            "\\recent" => Self::RECENT,
            "\\seen" => Self::SEEN,
            _ => Self::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_token_case_insensitive() {
        assert_eq!(MessageFlags::from_token("\\Seen"), MessageFlags::SEEN);
        assert_eq!(MessageFlags::from_token("\\SEEN"), MessageFlags::SEEN);
        assert_eq!(MessageFlags::from_token("\\seen"), MessageFlags::SEEN);
    }

    #[test]
    fn test_from_token_unknown() {
        assert_eq!(MessageFlags::from_token("$Junk"), MessageFlags::empty());
    }

    #[test]
    fn test_processing_flags_compose() {
        let flags = ProcessingFlags::INCLUDE_RAW_HEADERS | ProcessingFlags::INCLUDE_RAW_BODY;
        assert!(flags.contains(ProcessingFlags::INCLUDE_RAW_HEADERS));
        assert!(!flags.contains(ProcessingFlags::INCLUDE_WINMAIL_DATA));
    }
}
