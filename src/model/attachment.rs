//! Attachment data.

/// A decoded email attachment.
///
/// Transfer encoding has already been removed; `bytes` is the payload as
/// it would be written to disk.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    /// Filename of the attachment. May be empty if the headers carried none.
    pub name: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`),
    /// without parameters.
    pub content_type: String,

    /// Content-ID for inline attachments referenced from HTML,
    /// without the surrounding angle brackets.
    pub content_id: String,

    /// Decoded payload.
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}
