//! `mailsift` — a read-only parser for Internet Mail messages.
//!
//! This crate turns a raw RFC 5322 octet blob (headers, blank-line
//! delimiter, body) into a structured [`model::message::ParsedMessage`]:
//! parsed envelope headers, a canonical text body, an ordered attachment
//! list, and S/MIME attributes describing whether the content was signed,
//! encrypted, or triple-wrapped.
//!
//! The parser is deliberately permissive: malformed input yields a
//! best-effort result rather than an error. Cryptography is never
//! performed here — S/MIME envelopes and signatures are handled through
//! the [`parser::smime::CmsProvider`] capability supplied by the caller,
//! and TNEF bundles through [`parser::tnef::TnefDecoder`].

pub mod error;
pub mod model;
pub mod parser;
