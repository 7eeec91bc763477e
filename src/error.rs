use std::time::Duration;

/// Errors raised by the conversion pipeline.
///
/// Each variant corresponds to one phase. `Conversion` is the outer wrapper
/// used by the end-to-end entry points; it names the failing phase and the
/// document source so a single message carries the whole causal chain.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// HTML parsing failed in strict mode, or the wrap-and-retry recovery
    /// also produced nothing.
    #[error("HTML parse error: {0}")]
    Parse(String),

    /// A tag rule failed while emitting. The walker logs this, substitutes
    /// an empty text node, and keeps walking; it is surfaced only through
    /// the walk report.
    #[error("tag rule `{tag_name}` failed: {cause}")]
    Rule { tag_name: String, cause: String },

    /// Relationship repair or an invariant check failed.
    #[error("normalization failed on `{node_type}` node: {message}")]
    Normalization { node_type: String, message: String },

    /// The serializer met a node it cannot render in its position.
    #[error("cannot render `{node_type}` node at {path}")]
    Render { node_type: String, path: String },

    /// Outer pipeline error naming the phase and the source document.
    #[error("{phase} failed for {source_name}: {cause}")]
    Conversion {
        phase: &'static str,
        source_name: String,
        #[source]
        cause: Box<Error>,
    },

    /// Content acquisition failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl Error {
    /// Wrap an error as the outer `Conversion` error for a phase and source.
    pub fn in_phase(self, phase: &'static str, source_name: impl Into<String>) -> Self {
        Error::Conversion {
            phase,
            source_name: source_name.into(),
            cause: Box::new(self),
        }
    }
}

/// Transport-level failures, mapped from the underlying HTTP client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("DNS resolution failed for {0}")]
    Dns(String),

    #[error("HTTP client error {0} from {1}")]
    HttpClient(u16, String),

    #[error("HTTP server error {0} from {1}")]
    HttpServer(u16, String),

    #[error("connection refused by {0}")]
    Refused(String),

    #[error("redirect limit of {0} exceeded")]
    RedirectLoop(usize),

    #[error("invalid URL `{0}`: {1}")]
    InvalidUrl(String, String),

    /// Transport failures with no more specific mapping.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_phase_and_source() {
        let err = Error::Parse("bad input".into()).in_phase("parse", "https://example.com/a");
        let msg = err.to_string();
        assert!(msg.contains("parse failed for https://example.com/a"));
        // The causal chain is reachable through std::error::Error::source.
        let source = std::error::Error::source(&err).expect("has cause");
        assert!(source.to_string().contains("bad input"));
    }

    #[test]
    fn fetch_error_kinds_render_distinctly() {
        let timeout = FetchError::Timeout(Duration::from_secs(30)).to_string();
        let dns = FetchError::Dns("nxdomain.example".into()).to_string();
        assert!(timeout.contains("timed out"));
        assert!(dns.contains("DNS"));
    }
}
