//! Content-Transfer-Encoding codec (RFC 2045) and charset decoding.

use tracing::warn;

/// RFC 2045-tolerant base64: the standard alphabet, but whitespace
/// embedded in the payload is skipped rather than rejected.
pub const BASE64_RFC2045: data_encoding::Encoding = data_encoding_macro::new_encoding! {
    symbols: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/",
    padding: '=',
    ignore: " \r\n\t",
    wrap_width: 76,
    wrap_separator: "\r\n",
};

/// Remove a transfer encoding from a body.
///
/// Recognized encodings (case-insensitive): `base64`, `quoted-printable`,
/// `7bit`, `8bit`, `binary`. Anything else — including an empty string —
/// is an identity pass-through. Decoding never fails: a payload that does
/// not decode is passed through unchanged.
pub fn decode_transfer_encoding(encoding: &str, body: &[u8]) -> Vec<u8> {
    match encoding.trim().to_lowercase().as_str() {
        "base64" => match BASE64_RFC2045.decode(body) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "invalid base64 body, passing through unchanged");
                body.to_vec()
            }
        },
        "quoted-printable" => {
            match quoted_printable::decode(body, quoted_printable::ParseMode::Robust) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, "invalid quoted-printable body, passing through unchanged");
                    body.to_vec()
                }
            }
        }
        // 7bit / 8bit / binary and anything unrecognized
        _ => body.to_vec(),
    }
}

/// Encode bytes as RFC 2045 base64 (wrapped at 76 columns).
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_RFC2045.encode(bytes)
}

/// Encode bytes as quoted-printable.
pub fn encode_quoted_printable(bytes: &[u8]) -> String {
    quoted_printable::encode_to_str(bytes)
}

/// Decode the payload of one RFC 2047 encoded-word.
///
/// Scheme `B` is base64; scheme `Q` is quoted-printable with `_`
/// standing in for space. Unknown schemes yield `None` so the caller
/// can leave the token untouched.
pub fn decode_word_payload(scheme: &str, payload: &str) -> Option<Vec<u8>> {
    if scheme.eq_ignore_ascii_case("b") {
        BASE64_RFC2045.decode(payload.as_bytes()).ok()
    } else if scheme.eq_ignore_ascii_case("q") {
        quoted_printable::decode(
            payload.replace('_', " "),
            quoted_printable::ParseMode::Robust,
        )
        .ok()
    } else {
        None
    }
}

/// Decode bytes using a named charset.
///
/// Tries UTF-8 directly, then looks the label up via `encoding_rs`.
/// Unknown charsets fall back to UTF-8 lossy.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_lowercase();
    match charset_lower.as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset_lower.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_transfer_encoding("base64", b"aGVsbG8="), b"hello");
    }

    #[test]
    fn test_decode_base64_ignores_whitespace() {
        assert_eq!(
            decode_transfer_encoding("BASE64", b"aGVs\r\nbG8="),
            b"hello"
        );
    }

    #[test]
    fn test_decode_quoted_printable() {
        assert_eq!(
            decode_transfer_encoding("quoted-printable", b"caf=C3=A9"),
            "café".as_bytes()
        );
    }

    #[test]
    fn test_decode_quoted_printable_soft_break() {
        assert_eq!(
            decode_transfer_encoding("Quoted-Printable", b"foo=\r\nbar"),
            b"foobar"
        );
    }

    #[test]
    fn test_identity_encodings() {
        for enc in ["7bit", "8bit", "binary", "", "x-unknown"] {
            assert_eq!(decode_transfer_encoding(enc, b"as-is"), b"as-is");
        }
    }

    #[test]
    fn test_invalid_base64_passes_through() {
        assert_eq!(
            decode_transfer_encoding("base64", b"!!not base64!!"),
            b"!!not base64!!"
        );
    }

    #[test]
    fn test_base64_round_trip() {
        let data: Vec<u8> = (0u8..=255).collect();
        let encoded = encode_base64(&data);
        assert_eq!(decode_transfer_encoding("base64", encoded.as_bytes()), data);
    }

    #[test]
    fn test_quoted_printable_round_trip() {
        let data = "tabs\tand accents: àéîõü, equals = sign".as_bytes();
        let encoded = encode_quoted_printable(data);
        assert_eq!(
            decode_transfer_encoding("quoted-printable", encoded.as_bytes()),
            data
        );
    }

    #[test]
    fn test_word_payload_schemes() {
        assert_eq!(decode_word_payload("B", "bWlk"), Some(b"mid".to_vec()));
        assert_eq!(decode_word_payload("q", "a_b=21"), Some(b"a b!".to_vec()));
        assert_eq!(decode_word_payload("x", "abc"), None);
    }

    #[test]
    fn test_decode_charset_latin1() {
        assert_eq!(decode_charset("ISO-8859-1", &[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_decode_charset_unknown_falls_back() {
        assert_eq!(decode_charset("x-no-such-charset", b"plain"), "plain");
    }
}
