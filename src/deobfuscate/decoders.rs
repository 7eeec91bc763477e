// Obfuscation decoders.
//
// Each decoder reverses one encoding scheme, dispatched by the kind the
// pattern detector assigned. Decoders see the whole match plus its captured
// metadata and return the replacement source text.

use base64::Engine;

use super::PatternMatch;
use crate::error::Error;

/// The obfuscation schemes the registry knows how to reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Cloudflare,
    Base64,
    Rot13,
}

/// A registered decoder.
pub trait Decoder {
    fn kind(&self) -> DecoderKind;
    fn decode(&self, m: &PatternMatch) -> Result<String, Error>;
}

/// Kind-dispatched decoder collection.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    /// Decode a match with the registered decoder for its kind, if any.
    pub fn decode(&self, m: &PatternMatch) -> Option<Result<String, Error>> {
        self.decoders
            .iter()
            .find(|d| d.kind() == m.kind)
            .map(|d| d.decode(m))
    }
}

/// Registry with the built-in decoder set.
pub fn default_registry() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();
    registry.register(Box::new(CloudflareEmail));
    registry.register(Box::new(Base64Payload));
    registry.register(Box::new(Rot13));
    registry
}

fn decode_error(message: impl Into<String>) -> Error {
    Error::Conversion {
        phase: "deobfuscate",
        source_name: "document".into(),
        cause: Box::new(Error::Parse(message.into())),
    }
}

// ---------------------------------------------------------------------------
// Cloudflare email protection
// ---------------------------------------------------------------------------

/// Reverses the hex-XOR scheme in `data-cfemail` attributes: the first byte
/// is the key, every following byte is XORed with it.
struct CloudflareEmail;

impl Decoder for CloudflareEmail {
    fn kind(&self) -> DecoderKind {
        DecoderKind::Cloudflare
    }

    fn decode(&self, m: &PatternMatch) -> Result<String, Error> {
        let hex = m
            .metadata
            .get("hex")
            .ok_or_else(|| decode_error("cfemail match without hex payload"))?;
        let email = decode_cfemail(hex)?;
        let replacement = if m.metadata.get("tag").map(String::as_str) == Some("a") {
            format!(r#"<a href="mailto:{email}">{email}</a>"#)
        } else {
            email
        };
        Ok(replacement)
    }
}

fn decode_cfemail(hex: &str) -> Result<String, Error> {
    if hex.len() < 4 || hex.len() % 2 != 0 {
        return Err(decode_error("cfemail payload too short"));
    }
    let bytes: Result<Vec<u8>, _> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect();
    let bytes = bytes.map_err(|e| decode_error(format!("cfemail hex: {e}")))?;
    let key = bytes[0];
    let decoded: Vec<u8> = bytes[1..].iter().map(|b| b ^ key).collect();
    String::from_utf8(decoded).map_err(|e| decode_error(format!("cfemail utf-8: {e}")))
}

// ---------------------------------------------------------------------------
// Base64
// ---------------------------------------------------------------------------

/// Decodes base64 payloads found in data URLs and `data-base64` attributes.
/// Payloads that are not text stay encoded, so binary data keeps its data
/// URL form.
struct Base64Payload;

impl Decoder for Base64Payload {
    fn kind(&self) -> DecoderKind {
        DecoderKind::Base64
    }

    fn decode(&self, m: &PatternMatch) -> Result<String, Error> {
        let payload = m
            .metadata
            .get("payload")
            .ok_or_else(|| decode_error("base64 match without payload"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| decode_error(format!("base64: {e}")))?;

        match String::from_utf8(bytes) {
            Ok(text) => {
                if let Some(attr) = m.metadata.get("attribute") {
                    // Attribute-level payload: keep the attribute shape.
                    Ok(format!(r#"{attr}="{}""#, text.replace('"', "&quot;")))
                } else {
                    Ok(text)
                }
            }
            // Binary payload: leave the original data URL in place.
            Err(_) => Ok(m.content.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// ROT13
// ---------------------------------------------------------------------------

/// Reverses ASCII rot13; everything outside the ASCII alphabet is unchanged.
struct Rot13;

impl Decoder for Rot13 {
    fn kind(&self) -> DecoderKind {
        DecoderKind::Rot13
    }

    fn decode(&self, m: &PatternMatch) -> Result<String, Error> {
        let payload = m
            .metadata
            .get("payload")
            .ok_or_else(|| decode_error("rot13 match without payload"))?;
        let decoded = rot13(payload);
        if let Some(attr) = m.metadata.get("attribute") {
            return Ok(format!(r#"{attr}="{decoded}""#));
        }
        if let Some(tag) = m.metadata.get("tag") {
            return Ok(format!("<{tag}>{decoded}</{tag}>"));
        }
        Ok(decoded)
    }
}

fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a' + 13) % 26) + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A' + 13) % 26) + b'A') as char,
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rot13_is_its_own_inverse() {
        assert_eq!(rot13("uryyb"), "hello");
        assert_eq!(rot13(&rot13("Mixed Case 123!")), "Mixed Case 123!");
    }

    #[test]
    fn cfemail_decodes_known_vector() {
        // key 0x42, "ab" -> 42 23 20
        assert_eq!(decode_cfemail("422320").unwrap(), "ab");
    }

    #[test]
    fn cfemail_rejects_odd_length() {
        assert!(decode_cfemail("123").is_err());
    }

    #[test]
    fn registry_skips_unknown_kinds() {
        let registry = DecoderRegistry::new();
        let m = PatternMatch {
            kind: DecoderKind::Rot13,
            start: 0,
            end: 0,
            content: String::new(),
            metadata: Default::default(),
        };
        assert!(registry.decode(&m).is_none());
    }
}
