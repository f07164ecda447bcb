//! Loading and saving `.eml` files (bare RFC 5322 messages).

use std::path::Path;

use crate::error::{MailError, Result};
use crate::model::message::ParsedMessage;
use crate::parser::message::MessageParser;

/// Read a single `.eml` file and parse it with default options.
pub fn load_file(path: impl AsRef<Path>) -> Result<ParsedMessage> {
    load_file_with(path, &MessageParser::new())
}

/// Read a single `.eml` file and parse it with the supplied parser.
pub fn load_file_with(path: impl AsRef<Path>, parser: &MessageParser) -> Result<ParsedMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailError::FileNotFound(path.to_path_buf())
        } else {
            MailError::io(path, e)
        }
    })?;
    Ok(parser.parse(&data))
}

/// Write a message back out as `raw_headers + "\r\n\r\n" + raw_body`.
///
/// Requires the message to have been parsed with both raw-retention
/// flags set.
pub fn save_file(path: impl AsRef<Path>, msg: &ParsedMessage) -> Result<()> {
    let path = path.as_ref();
    let headers = msg.raw_headers.as_ref().ok_or_else(|| {
        MailError::Export("raw headers were not retained at parse time".to_string())
    })?;
    let body = msg
        .raw_body
        .as_ref()
        .ok_or_else(|| MailError::Export("raw body was not retained at parse time".to_string()))?;

    let mut out = Vec::with_capacity(headers.len() + 4 + body.len());
    out.extend_from_slice(headers.as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
    out.extend_from_slice(body.as_bytes());
    std::fs::write(path, out).map_err(|e| MailError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::flags::ProcessingFlags;

    #[test]
    fn test_load_missing_file() {
        let err = load_file("/no/such/message.eml").unwrap_err();
        assert!(matches!(err, MailError::FileNotFound(_)));
    }

    #[test]
    fn test_save_requires_raw_retention() {
        let msg = crate::parser::message::parse(b"Subject: s\r\n\r\nbody");
        let tmp = tempfile::tempdir().unwrap();
        let err = save_file(tmp.path().join("out.eml"), &msg).unwrap_err();
        assert!(matches!(err, MailError::Export(_)));
    }

    #[test]
    fn test_load_save_round_trip() {
        let raw = b"From: a@x\r\nSubject: keep\r\n\r\nthe body";
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("msg.eml");
        std::fs::write(&path, raw).unwrap();

        let parser = MessageParser::new().with_flags(
            ProcessingFlags::INCLUDE_RAW_HEADERS | ProcessingFlags::INCLUDE_RAW_BODY,
        );
        let msg = load_file_with(&path, &parser).unwrap();
        assert_eq!(msg.subject, "keep");

        let out = tmp.path().join("copy.eml");
        save_file(&out, &msg).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), raw);
    }
}
