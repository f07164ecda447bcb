//! The CMS capability the parser delegates S/MIME cryptography to.
//!
//! The parser never touches a certificate or a cipher itself: the host
//! supplies an implementation of [`CmsProvider`] (typically backed by a
//! platform CMS/PKCS#7 library) and the MIME walker calls it at most
//! twice per multipart. Both operations are fail-open from the parser's
//! point of view.

/// Cryptographic Message Syntax operations supplied by the host.
///
/// Implementations are expected to behave as pure functions of their
/// inputs; the parser performs no synchronization around them.
pub trait CmsProvider {
    /// Decrypt a CMS enveloped-data blob, returning the plaintext MIME
    /// content, or `None` when decryption is not possible (no matching
    /// key, corrupt envelope, …).
    fn decrypt_envelope(&self, envelope: &[u8]) -> Option<Vec<u8>>;

    /// Verify a detached signature over `content`.
    fn verify_signature(&self, signature: &[u8], content: &[u8]) -> bool;
}

/// Default provider: decrypts nothing, verifies nothing.
///
/// With `NoCms`, encrypted envelopes yield no inner parts and detached
/// signatures never mark parts as signed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCms;

impl CmsProvider for NoCms {
    fn decrypt_envelope(&self, _envelope: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn verify_signature(&self, _signature: &[u8], _content: &[u8]) -> bool {
        false
    }
}
