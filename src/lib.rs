// webmark — web pages and HTML documents to CommonMark/GFM Markdown and
// structured JSON.
//
// Architecture:
//   fetch → decompress → charset-decode → deobfuscate → HTML parse →
//   math extract (placeholders) → walk with tag-rule registry →
//   normalize → transform pipeline → serialize → math restore
//
// Every phase is also exposed on its own, so callers can compose partial
// pipelines (pre-parsed DOMs, custom rule registries, custom transform
// pipelines).

pub mod debug;
mod error;
pub mod deobfuscate;
pub mod fetch;
pub mod json;
pub mod math;
mod normalize;
pub mod parse;
pub mod serialize;
pub mod storage;
pub mod transform;
pub mod tree;
pub mod walk;

pub use error::{Error, FetchError};
pub use fetch::{decode, fetch, FetchedResponse, HttpOptions, ProxyConfig};
pub use deobfuscate::{deobfuscate, DeobfuscateOptions};
pub use math::{extract_math, restore_math, MathOptions, MathPlaceholders, RestoreOptions};
pub use normalize::normalize;
pub use parse::{parse, ParseOptions};
pub use serialize::{serialize, SerializeOptions};
pub use transform::{Operation, Pipeline};
pub use tree::Handle;
pub use walk::{default_registry, walk, Registry};

/// Conversion options covering every pipeline phase.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub parse: ParseOptions,
    pub serialize: SerializeOptions,
    pub math: MathOptions,
    pub deobfuscate: DeobfuscateOptions,
    pub restore: RestoreOptions,
    pub http: HttpOptions,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unordered list bullet character.
    pub fn with_bullet(mut self, bullet: char) -> Self {
        self.serialize.bullet = bullet;
        self
    }

    /// Set the emphasis marker character.
    pub fn with_emphasis(mut self, emphasis: char) -> Self {
        self.serialize.emphasis = emphasis;
        self
    }

    /// Surface HTML parse errors instead of recovering.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.parse.strict = strict;
        self
    }

    /// Retain HTML comments through the pipeline.
    pub fn with_preserve_comments(mut self, preserve: bool) -> Self {
        self.parse.preserve_comments = preserve;
        self
    }

    /// Toggle math extraction and restoration.
    pub fn with_math(mut self, enabled: bool) -> Self {
        self.math.enabled = enabled;
        self
    }

    /// Toggle deobfuscation of the raw HTML.
    pub fn with_deobfuscation(mut self, enabled: bool) -> Self {
        self.deobfuscate.enabled = enabled;
        self
    }

    /// Replace the HTTP options used by [`convert_url`].
    pub fn with_http(mut self, http: HttpOptions) -> Self {
        self.http = http;
        self
    }
}

/// Convert an HTML string to Markdown using default options.
///
/// # Examples
///
/// ```
/// let md = webmark::convert("<h1>Hello</h1><p>World</p>").unwrap();
/// assert!(md.contains("# Hello"));
/// ```
pub fn convert(html: &str) -> Result<String, Error> {
    convert_with(html, &Options::default())
}

/// Convert an HTML string to Markdown with custom options.
pub fn convert_with(html: &str, options: &Options) -> Result<String, Error> {
    convert_pipeline(html, options, None, "input")
}

/// Convert with a transformation pipeline applied to the DOM between math
/// extraction and the walk.
pub fn convert_with_pipeline(
    html: &str,
    options: &Options,
    pipeline: &Pipeline,
) -> Result<String, Error> {
    convert_pipeline(html, options, Some(pipeline), "input")
}

fn convert_pipeline(
    html: &str,
    options: &Options,
    pipeline: Option<&Pipeline>,
    source_name: &str,
) -> Result<String, Error> {
    let source = deobfuscate::deobfuscate(html, &options.deobfuscate);

    let dom = parse::parse(&source, &options.parse)
        .map_err(|e| e.in_phase("parse", source_name))?;

    let placeholders = math::extract_math(&dom, &options.math);

    if let Some(pipeline) = pipeline {
        pipeline
            .run(&dom)
            .map_err(|e| e.in_phase("transform", source_name))?;
    }

    let walked = walk::walk(&dom, &walk::default_registry());
    for warning in &walked.warnings {
        tracing::debug!(%warning, "degraded element in walk");
    }

    normalize::normalize(&walked.root).map_err(|e| e.in_phase("normalize", source_name))?;

    let markdown = serialize::serialize(&walked.root, &options.serialize)
        .map_err(|e| e.in_phase("serialize", source_name))?;

    Ok(math::restore_math(&markdown, &placeholders, &options.restore))
}

/// Parse HTML and produce the normalized Markdown tree (no math handling).
pub fn html_to_ast(html: &str, options: &Options) -> Result<Handle, Error> {
    let dom = parse::parse(html, &options.parse).map_err(|e| e.in_phase("parse", "input"))?;
    let walked = walk::walk(&dom, &walk::default_registry());
    normalize::normalize(&walked.root).map_err(|e| e.in_phase("normalize", "input"))?;
    Ok(walked.root)
}

/// Convert an HTML string to the structured JSON document form.
pub fn convert_to_json(html: &str, options: &Options) -> Result<json::Document, Error> {
    let dom = parse::parse(html, &options.parse).map_err(|e| e.in_phase("parse", "input"))?;
    let title = tree::elements_by_tag_name(&dom, "TITLE")
        .first()
        .map(|t| tree::text_content(t).trim().to_string())
        .filter(|t| !t.is_empty());
    let walked = walk::walk(&dom, &walk::default_registry());
    normalize::normalize(&walked.root).map_err(|e| e.in_phase("normalize", "input"))?;
    Ok(json::to_document(&walked.root, title))
}

/// Fetch a URL, decode the response, and convert it to Markdown.
pub async fn convert_url(url: &str, options: &Options) -> Result<String, Error> {
    let response = fetch::fetch(url, &options.http)
        .await
        .map_err(|e| Error::from(e).in_phase("fetch", url))?;
    let html = fetch::decode(&response);
    convert_pipeline(&html, options, None, url)
}
