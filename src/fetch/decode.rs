// Response decoding: decompression chain and charset conversion.
//
// Content-Encoding drives decompression (gzip, deflate, brotli, zstd). For
// everything but zstd a cheap binary-looking heuristic guards against bodies
// that claim an encoding they don't carry; failures return the original
// bytes. Charset detection prefers the Content-Type parameter, then BOMs,
// then UTF-8 multi-byte sniffing.

use std::io::Read;

use super::FetchedResponse;

/// Decode a fetched response into text: decompress, detect charset, convert.
pub fn decode(response: &FetchedResponse) -> String {
    let body = decode_body(&response.body, response.content_encoding.as_deref());
    let charset = detect_charset(&body, response.content_type.as_deref());
    to_utf8(&body, &charset)
}

/// Undo the transfer compression, returning the input unchanged when the
/// encoding is unknown, the body does not look compressed, or decompression
/// fails.
pub fn decode_body(body: &[u8], content_encoding: Option<&str>) -> Vec<u8> {
    let Some(encoding) = content_encoding else {
        return body.to_vec();
    };
    let token = encoding
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match token.as_str() {
        "gzip" | "x-gzip" => guarded(body, "gzip", gunzip),
        "deflate" => guarded(body, "deflate", inflate),
        "br" => guarded(body, "brotli", unbrotli),
        // zstd skips the heuristic and attempts decompression directly.
        "zstd" => match zstd::stream::decode_all(body) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::warn!(%error, "zstd decompression failed, keeping original body");
                body.to_vec()
            }
        },
        "" | "identity" => body.to_vec(),
        other => {
            tracing::warn!(encoding = other, "unknown content encoding, keeping body");
            body.to_vec()
        }
    }
}

/// Run a decoder only when the body actually looks binary; a body that is
/// mostly printable text was not compressed, whatever the header claims.
fn guarded(body: &[u8], label: &str, decoder: fn(&[u8]) -> std::io::Result<Vec<u8>>) -> Vec<u8> {
    if !looks_binary(body) {
        tracing::warn!(label, "body is printable text, skipping decompression");
        return body.to_vec();
    }
    match decoder(body) {
        Ok(decoded) => decoded,
        Err(error) => {
            tracing::warn!(label, %error, "decompression failed, keeping original body");
            body.to_vec()
        }
    }
}

/// At least 10% non-printable bytes in the leading window.
fn looks_binary(body: &[u8]) -> bool {
    let window = &body[..body.len().min(256)];
    if window.is_empty() {
        return false;
    }
    let non_printable = window
        .iter()
        .filter(|&&b| !matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E) && b < 0x80)
        .count();
    non_printable * 10 >= window.len()
}

fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(body).read_to_end(&mut out)?;
    Ok(out)
}

fn inflate(body: &[u8]) -> std::io::Result<Vec<u8>> {
    // Servers disagree on whether "deflate" means zlib-wrapped or raw.
    let mut out = Vec::new();
    match flate2::read::ZlibDecoder::new(body).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(body).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

fn unbrotli(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(body, 4096).read_to_end(&mut out)?;
    Ok(out)
}

/// Detect the charset of a decompressed body.
pub fn detect_charset(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(charset) = content_type.and_then(charset_param) {
        return charset;
    }
    if body.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return "utf-8".into();
    }
    if body.starts_with(&[0xFE, 0xFF]) {
        return "utf-16be".into();
    }
    if body.starts_with(&[0xFF, 0xFE]) {
        return "utf-16le".into();
    }
    if has_multibyte_utf8(body) {
        return "utf-8".into();
    }
    "utf-8".into()
}

fn charset_param(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let rest = &content_type[start..];
    let value = rest.split(';').next().unwrap_or("").trim();
    let value = value.trim_matches(['"', '\'']);
    if value.is_empty() {
        None
    } else {
        Some(value.to_ascii_lowercase())
    }
}

/// A lead byte 0xC2..0xF4 followed by a continuation byte is a strong UTF-8
/// signal.
fn has_multibyte_utf8(body: &[u8]) -> bool {
    body.windows(2)
        .any(|w| (0xC2..=0xF4).contains(&w[0]) && (0x80..=0xBF).contains(&w[1]))
}

/// Convert to UTF-8. Only conversions encoding_rs knows are attempted;
/// unknown labels fall back to lossy UTF-8 with a warning.
fn to_utf8(body: &[u8], charset: &str) -> String {
    match charset {
        "utf-8" | "us-ascii" | "" => String::from_utf8_lossy(body).into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (text, _, had_errors) = encoding.decode(body);
                if had_errors {
                    tracing::warn!(charset = label, "lossy charset conversion");
                }
                text.into_owned()
            }
            None => {
                tracing::warn!(charset = label, "unsupported charset, assuming UTF-8");
                String::from_utf8_lossy(body).into_owned()
            }
        },
    }
}
