//! The TNEF (winmail.dat) decoding capability.
//!
//! TNEF internals are out of scope: the host injects a decoder and the
//! MIME walker flattens whatever it returns into the part list.

/// Result of decoding a TNEF bundle.
#[derive(Debug, Clone, Default)]
pub struct TnefContent {
    /// Message body carried inside the bundle, if any.
    pub body: Option<String>,
    /// Content type of that body (e.g. `"text/html"`).
    pub content_type: String,
    /// Attachments carried inside the bundle, in order.
    pub attachments: Vec<TnefAttachment>,
}

/// One attachment extracted from a TNEF bundle.
#[derive(Debug, Clone)]
pub struct TnefAttachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Decoder for Transport-Neutral Encapsulation Format bundles.
pub trait TnefDecoder {
    /// Decode raw TNEF bytes. `None` means the data was not decodable;
    /// the bundle is then dropped from the message.
    fn decode(&self, data: &[u8]) -> Option<TnefContent>;
}

/// Default decoder: drops every TNEF bundle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTnef;

impl TnefDecoder for NoTnef {
    fn decode(&self, _data: &[u8]) -> Option<TnefContent> {
        None
    }
}
