// HTML deobfuscation.
//
// Scans raw HTML for obfuscated payloads (Cloudflare email protection,
// base64 data, rot13 spans), then rewrites each match through the decoder
// registry. Matches are processed from the highest start offset down so
// earlier offsets stay valid, and one bad match never aborts the document.

pub(crate) mod decoders;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

pub use decoders::{default_registry, Decoder, DecoderKind, DecoderRegistry};

/// Deobfuscation configuration.
#[derive(Debug, Clone)]
pub struct DeobfuscateOptions {
    pub enabled: bool,
    /// Decoders allowed to run; detected matches of other kinds are skipped.
    pub decoders: Vec<DecoderKind>,
    /// Remove Cloudflare email-decoding script tags up front.
    pub clean_scripts: bool,
    /// Keep the original payload in an HTML comment before the decoded form.
    pub preserve_raw_links: bool,
}

impl Default for DeobfuscateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            decoders: vec![
                DecoderKind::Cloudflare,
                DecoderKind::Base64,
                DecoderKind::Rot13,
            ],
            clean_scripts: true,
            preserve_raw_links: false,
        }
    }
}

/// One detected obfuscation span in the HTML source.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub kind: DecoderKind,
    pub start: usize,
    pub end: usize,
    /// The matched source text.
    pub content: String,
    /// Decoder-specific captures (payload, attribute name, element tag).
    pub metadata: BTreeMap<String, String>,
}

static CFEMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<(?<tag>a|span)\b[^>]*data-cfemail="(?<hex>[0-9a-fA-F]+)"[^>]*>.*?</(a|span)>"#,
    )
    .unwrap()
});

static TEXT_DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:(?<mime>text/(?:html|plain))?;base64,(?<payload>[A-Za-z0-9+/=]{4,})")
        .unwrap()
});

static BASE64_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-base64="(?<payload>[A-Za-z0-9+/=]{4,})""#).unwrap()
});

static ROT13_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-rot13="(?<payload>[^"]+)""#).unwrap());

static ROT13_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(?<tag>\w+)\b[^>]*class="[^"]*\brot13\b[^"]*"[^>]*>(?<payload>[^<]*)</\w+>"#)
        .unwrap()
});

static CF_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script\b[^>]*(?:data-cfasync|/cdn-cgi/scripts/|email-decode)[^>]*>.*?</script>")
        .unwrap()
});

/// Scan the HTML for obfuscated payloads, sorted by start offset.
pub fn detect_patterns(html: &str) -> Vec<PatternMatch> {
    let mut matches = Vec::new();

    for caps in CFEMAIL.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("hex".into(), caps["hex"].to_string());
        metadata.insert("tag".into(), caps["tag"].to_string());
        matches.push(PatternMatch {
            kind: DecoderKind::Cloudflare,
            start: whole.start(),
            end: whole.end(),
            content: whole.as_str().to_string(),
            metadata,
        });
    }

    for caps in TEXT_DATA_URL.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("payload".into(), caps["payload"].to_string());
        if let Some(mime) = caps.name("mime") {
            metadata.insert("mime".into(), mime.as_str().to_string());
        }
        matches.push(PatternMatch {
            kind: DecoderKind::Base64,
            start: whole.start(),
            end: whole.end(),
            content: whole.as_str().to_string(),
            metadata,
        });
    }

    for caps in BASE64_ATTR.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("payload".into(), caps["payload"].to_string());
        metadata.insert("attribute".into(), "data-base64".into());
        matches.push(PatternMatch {
            kind: DecoderKind::Base64,
            start: whole.start(),
            end: whole.end(),
            content: whole.as_str().to_string(),
            metadata,
        });
    }

    for caps in ROT13_ATTR.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("payload".into(), caps["payload"].to_string());
        metadata.insert("attribute".into(), "data-rot13".into());
        matches.push(PatternMatch {
            kind: DecoderKind::Rot13,
            start: whole.start(),
            end: whole.end(),
            content: whole.as_str().to_string(),
            metadata,
        });
    }

    for caps in ROT13_SPAN.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("payload".into(), caps["payload"].to_string());
        metadata.insert("tag".into(), caps["tag"].to_string());
        matches.push(PatternMatch {
            kind: DecoderKind::Rot13,
            start: whole.start(),
            end: whole.end(),
            content: whole.as_str().to_string(),
            metadata,
        });
    }

    matches.sort_by_key(|m| m.start);
    matches
}

/// Decode every enabled obfuscation pattern in the document.
pub fn deobfuscate(html: &str, options: &DeobfuscateOptions) -> String {
    if !options.enabled {
        return html.to_string();
    }

    let mut html = if options.clean_scripts {
        CF_SCRIPT.replace_all(html, "").into_owned()
    } else {
        html.to_string()
    };

    let registry = default_registry();
    let matches = detect_patterns(&html);

    // Highest offset first, so replacements never shift pending indices.
    let mut floor = html.len();
    for m in matches.iter().rev() {
        if !options.decoders.contains(&m.kind) {
            continue;
        }
        if m.end > floor {
            // Overlaps a match that was already rewritten.
            continue;
        }
        match registry.decode(m) {
            Some(Ok(decoded)) => {
                // Attribute-level matches sit inside a tag, where a comment
                // would be malformed.
                let comment_ok = !m.metadata.contains_key("attribute");
                let replacement = if options.preserve_raw_links && comment_ok {
                    format!("<!-- {} -->{}", m.content, decoded)
                } else {
                    decoded
                };
                html.replace_range(m.start..m.end, &replacement);
                floor = m.start;
            }
            Some(Err(error)) => {
                tracing::warn!(kind = ?m.kind, %error, "decoder failed, match skipped");
            }
            None => {
                tracing::warn!(kind = ?m.kind, "no decoder registered, match skipped");
            }
        }
    }

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // "user@example.com" encoded with key 0x42 in the Cloudflare scheme.
    fn cfemail_hex(email: &str, key: u8) -> String {
        let mut hex = format!("{key:02x}");
        for b in email.bytes() {
            hex.push_str(&format!("{:02x}", b ^ key));
        }
        hex
    }

    #[test]
    fn cloudflare_email_is_decoded_to_mailto() {
        let hex = cfemail_hex("user@example.com", 0x42);
        let html = format!(
            r#"<p>mail: <a href="/cdn-cgi/l/email-protection" class="__cf_email__" data-cfemail="{hex}">[email&#160;protected]</a></p>"#
        );
        let out = deobfuscate(&html, &DeobfuscateOptions::default());
        assert!(out.contains("user@example.com"), "{out}");
        assert!(!out.contains("data-cfemail"), "{out}");
    }

    #[test]
    fn text_data_url_is_inlined() {
        use base64::Engine;
        let payload = base64::engine::general_purpose::STANDARD.encode("<b>hidden</b>");
        let html = format!(r#"<div>data:text/html;base64,{payload}</div>"#);
        let out = deobfuscate(&html, &DeobfuscateOptions::default());
        assert!(out.contains("<b>hidden</b>"), "{out}");
    }

    #[test]
    fn binary_data_url_is_preserved() {
        use base64::Engine;
        // PNG header bytes are not valid UTF-8 text.
        let payload =
            base64::engine::general_purpose::STANDARD.encode([0x89, 0x50, 0x4E, 0x47, 0xFF]);
        let html = format!(r#"<img src="data:;base64,{payload}">"#);
        let out = deobfuscate(&html, &DeobfuscateOptions::default());
        assert_eq!(out, html);
    }

    #[test]
    fn rot13_span_is_decoded() {
        let html = r#"<span class="rot13">uryyb jbeyq</span>"#;
        let out = deobfuscate(html, &DeobfuscateOptions::default());
        assert!(out.contains("hello world"), "{out}");
    }

    #[test]
    fn disabled_decoders_are_skipped() {
        let html = r#"<span class="rot13">uryyb</span>"#;
        let options = DeobfuscateOptions {
            decoders: vec![DecoderKind::Cloudflare],
            ..Default::default()
        };
        assert_eq!(deobfuscate(html, &options), html);
    }

    #[test]
    fn cfasync_scripts_are_removed() {
        let html = r#"<script data-cfasync="false" src="/cdn-cgi/scripts/email-decode.min.js"></script><p>x</p>"#;
        let out = deobfuscate(html, &DeobfuscateOptions::default());
        assert_eq!(out, "<p>x</p>");
    }

    #[test]
    fn preserve_raw_links_keeps_original_in_comment() {
        let html = r#"<span class="rot13">frperg</span>"#;
        let options = DeobfuscateOptions {
            preserve_raw_links: true,
            ..Default::default()
        };
        let out = deobfuscate(html, &options);
        assert!(out.contains("secret"), "{out}");
        assert!(out.contains("<!--"), "{out}");
        assert!(out.contains("frperg"), "{out}");
    }

    #[test]
    fn matches_are_reported_sorted_by_start() {
        let html = r#"<i data-rot13="nn"></i> ... <b data-rot13="oo"></b>"#;
        let matches = detect_patterns(html);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].start < matches[1].start);
    }

    #[test]
    fn clean_document_is_untouched() {
        let html = "<p>perfectly ordinary</p>";
        assert_eq!(deobfuscate(html, &DeobfuscateOptions::default()), html);
    }
}
