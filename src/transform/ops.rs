// Built-in transformation operations.
//
// Each operation is a predicate/transform pair registered into a Pipeline.
// Operations that run over the HTML-side tree match on Element nodes; the
// URL and heading-id operations also understand the Markdown variants so
// they can run after the walk.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::{Action, Operation, Order, TransformContext};
use crate::error::Error;
use crate::tree::{AstData, AstNode, Attribute, Handle};

/// Node predicate used by the configurable operations.
pub type Predicate = Box<dyn Fn(&Handle) -> bool>;

// ---------------------------------------------------------------------------
// RemoveElements
// ---------------------------------------------------------------------------

/// Drop every element whose tag name is in the given set.
pub struct RemoveElements {
    tags: HashSet<String>,
}

impl RemoveElements {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(tags: I) -> Self {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }
}

impl Operation for RemoveElements {
    fn name(&self) -> &'static str {
        "remove-elements"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        node.tag_name().is_some_and(|t| self.tags.contains(&t))
    }

    fn apply(&self, _node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        Ok(Action::Remove)
    }
}

// ---------------------------------------------------------------------------
// RemoveComments
// ---------------------------------------------------------------------------

/// Drop comment nodes, both DOM comments and raw-HTML comments the walker
/// carried over.
pub struct RemoveComments;

impl Operation for RemoveComments {
    fn name(&self) -> &'static str {
        "remove-comments"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        match &*node.data.borrow() {
            AstData::Comment { .. } => true,
            AstData::Html { value } => value.starts_with("<!--"),
            _ => false,
        }
    }

    fn apply(&self, _node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        Ok(Action::Remove)
    }
}

// ---------------------------------------------------------------------------
// CollapseWhitespace
// ---------------------------------------------------------------------------

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\n\x0c]+").unwrap());

/// Collapse runs of whitespace in text nodes to a single space, preserving
/// content inside `<pre>`/`<code>` verbatim.
pub struct CollapseWhitespace;

impl Operation for CollapseWhitespace {
    fn name(&self) -> &'static str {
        "collapse-whitespace"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        if !matches!(&*node.data.borrow(), AstData::Text { .. }) {
            return false;
        }
        !in_preformatted(node)
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        if let AstData::Text { value } = &mut *node.data.borrow_mut() {
            let collapsed = WHITESPACE_RUN.replace_all(value, " ").into_owned();
            *value = collapsed;
        }
        Ok(Action::Keep)
    }
}

fn in_preformatted(node: &Handle) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element("PRE") || ancestor.is_element("CODE") {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

// ---------------------------------------------------------------------------
// SanitizeHtml
// ---------------------------------------------------------------------------

const DEFAULT_UNSAFE_ELEMENTS: &[&str] = &[
    "SCRIPT", "STYLE", "IFRAME", "OBJECT", "EMBED", "APPLET", "PARAM", "BASE", "FORM", "INPUT",
    "TEXTAREA", "SELECT", "OPTION", "BUTTON", "META",
];

const UNSAFE_URL_ATTRS: &[&str] = &["href", "src", "action"];

const UNSAFE_URL_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// Drop unsafe elements and strip unsafe attributes: event handlers and
/// URL attributes carrying scriptable schemes. Applying it twice equals
/// applying it once.
pub struct SanitizeHtml {
    unsafe_elements: HashSet<String>,
}

impl Default for SanitizeHtml {
    fn default() -> Self {
        Self::new()
    }
}

impl SanitizeHtml {
    pub fn new() -> Self {
        Self {
            unsafe_elements: DEFAULT_UNSAFE_ELEMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Override the unsafe element set.
    pub fn with_elements<I: IntoIterator<Item = S>, S: AsRef<str>>(tags: I) -> Self {
        Self {
            unsafe_elements: tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }
}

impl Operation for SanitizeHtml {
    fn name(&self) -> &'static str {
        "sanitize-html"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        matches!(&*node.data.borrow(), AstData::Element { .. })
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        if node
            .tag_name()
            .is_some_and(|t| self.unsafe_elements.contains(&t))
        {
            return Ok(Action::Remove);
        }
        if let AstData::Element { attrs, .. } = &mut *node.data.borrow_mut() {
            attrs.retain(|attr| {
                let name = attr.name.to_ascii_lowercase();
                if name.starts_with("on") {
                    return false;
                }
                if UNSAFE_URL_ATTRS.contains(&name.as_str()) {
                    let value = attr.value.trim().to_ascii_lowercase();
                    if UNSAFE_URL_SCHEMES.iter().any(|s| value.starts_with(s)) {
                        return false;
                    }
                }
                true
            });
        }
        Ok(Action::Keep)
    }
}

// ---------------------------------------------------------------------------
// SecureExternalLinks
// ---------------------------------------------------------------------------

/// Add `target="_blank" rel="noopener noreferrer"` to anchors pointing
/// outside the internal domain set.
pub struct SecureExternalLinks {
    internal_domains: Vec<String>,
}

impl SecureExternalLinks {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(internal_domains: I) -> Self {
        Self {
            internal_domains: internal_domains
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_internal(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.internal_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

impl Operation for SecureExternalLinks {
    fn name(&self) -> &'static str {
        "secure-external-links"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        node.is_element("A")
            && node.get_attribute("href").is_some_and(|href| {
                href.starts_with("http://") || href.starts_with("https://")
            })
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        let Some(href) = node.get_attribute("href") else {
            return Ok(Action::Keep);
        };
        let external = Url::parse(&href)
            .ok()
            .and_then(|u| u.host_str().map(|h| !self.is_internal(h)))
            .unwrap_or(false);
        if external {
            node.set_attribute("target", "_blank");
            node.set_attribute("rel", "noopener noreferrer");
        }
        Ok(Action::Keep)
    }
}

// ---------------------------------------------------------------------------
// AbsoluteUrls
// ---------------------------------------------------------------------------

const DEFAULT_URL_ATTRS: &[&str] = &["href", "src", "action", "data", "poster"];

/// Resolve relative URLs against a base. Already-absolute URLs and
/// mailto/tel/data/fragment references are left untouched. Understands both
/// element URL attributes and Markdown link/image nodes.
pub struct AbsoluteUrls {
    base_url: Url,
    url_attrs: Vec<String>,
}

impl AbsoluteUrls {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            url_attrs: DEFAULT_URL_ATTRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_attrs<I: IntoIterator<Item = S>, S: AsRef<str>>(base_url: Url, attrs: I) -> Self {
        Self {
            base_url,
            url_attrs: attrs
                .into_iter()
                .map(|a| a.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn resolve(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || has_skipped_scheme(trimmed)
            || Url::parse(trimmed).is_ok()
        {
            return None;
        }
        self.base_url.join(trimmed).ok().map(|u| u.to_string())
    }
}

fn has_skipped_scheme(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    ["mailto:", "tel:", "data:"]
        .iter()
        .any(|s| value.starts_with(s))
}

impl Operation for AbsoluteUrls {
    fn name(&self) -> &'static str {
        "absolute-urls"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        matches!(
            &*node.data.borrow(),
            AstData::Element { .. } | AstData::Link { .. } | AstData::Image { .. }
        )
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        match &mut *node.data.borrow_mut() {
            AstData::Element { attrs, .. } => {
                for attr in attrs.iter_mut() {
                    if self
                        .url_attrs
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&attr.name))
                    {
                        if let Some(resolved) = self.resolve(&attr.value) {
                            attr.value = resolved;
                        }
                    }
                }
            }
            AstData::Link { url, .. } | AstData::Image { url, .. } => {
                if let Some(resolved) = self.resolve(url) {
                    *url = resolved;
                }
            }
            _ => {}
        }
        Ok(Action::Keep)
    }
}

// ---------------------------------------------------------------------------
// AddClass
// ---------------------------------------------------------------------------

/// Union-append a class token on elements matching the predicate.
pub struct AddClass {
    class_name: String,
    predicate: Predicate,
}

impl AddClass {
    pub fn new(class_name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            class_name: class_name.into(),
            predicate,
        }
    }
}

impl Operation for AddClass {
    fn name(&self) -> &'static str {
        "add-class"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        matches!(&*node.data.borrow(), AstData::Element { .. }) && (self.predicate)(node)
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        if node.has_class(&self.class_name) {
            return Ok(Action::Keep);
        }
        let updated = match node.get_attribute("class") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {}", existing.trim(), self.class_name)
            }
            _ => self.class_name.clone(),
        };
        node.set_attribute("class", &updated);
        Ok(Action::Keep)
    }
}

// ---------------------------------------------------------------------------
// WrapElements
// ---------------------------------------------------------------------------

/// Wrap matching nodes in a new parent element, skipping nodes that are
/// already wrapped. Runs pre-order so the fresh wrapper is not revisited.
pub struct WrapElements {
    tag: String,
    attrs: Vec<(String, String)>,
    predicate: Predicate,
}

impl WrapElements {
    pub fn new(
        tag: impl Into<String>,
        attrs: Vec<(String, String)>,
        predicate: Predicate,
    ) -> Self {
        Self {
            tag: tag.into().to_ascii_uppercase(),
            attrs,
            predicate,
        }
    }

    fn is_wrapper(&self, node: &Handle) -> bool {
        node.is_element(&self.tag)
            && self
                .attrs
                .iter()
                .all(|(name, value)| node.get_attribute(name).as_deref() == Some(value.as_str()))
    }
}

impl Operation for WrapElements {
    fn name(&self) -> &'static str {
        "wrap-elements"
    }

    fn order(&self) -> Order {
        Order::Pre
    }

    fn should_apply(&self, node: &Handle) -> bool {
        if node.parent().is_none() {
            return false;
        }
        if !(self.predicate)(node) {
            return false;
        }
        // Skip nodes already sitting inside an identical wrapper.
        !node.parent().is_some_and(|p| self.is_wrapper(&p))
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        let wrapper = AstNode::new(AstData::Element {
            name: self.tag.clone(),
            attrs: self
                .attrs
                .iter()
                .map(|(name, value)| Attribute {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        });
        crate::tree::replace(node, wrapper.clone())?;
        crate::tree::append(&wrapper, node.clone());
        Ok(Action::Keep)
    }
}

// ---------------------------------------------------------------------------
// UnwrapElements
// ---------------------------------------------------------------------------

/// Replace matching nodes with all of their children, spliced into the
/// parent at the node's position.
pub struct UnwrapElements {
    predicate: Predicate,
}

impl UnwrapElements {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

impl Operation for UnwrapElements {
    fn name(&self) -> &'static str {
        "unwrap-elements"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        node.parent().is_some() && (self.predicate)(node)
    }

    fn apply(&self, node: &Handle, _cx: &TransformContext) -> Result<Action, Error> {
        Ok(Action::Splice(node.children_snapshot()))
    }
}

// ---------------------------------------------------------------------------
// AddHeadingIds
// ---------------------------------------------------------------------------

/// Give headings without an id a slug derived from their text content,
/// disambiguated with a numeric suffix. Understands both `H1..H6` elements
/// (id attribute) and Markdown heading nodes (meta bag).
pub struct AddHeadingIds {
    prefix: String,
    used: std::cell::RefCell<Option<HashSet<String>>>,
}

impl AddHeadingIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            used: std::cell::RefCell::new(None),
        }
    }

    fn claim(&self, cx: &TransformContext, slug: &str) -> String {
        let mut used = self.used.borrow_mut();
        let used = used.get_or_insert_with(|| existing_ids(&cx.root));
        let base = if self.prefix.is_empty() {
            slug.to_string()
        } else {
            format!("{}{}", self.prefix, slug)
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while !used.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        candidate
    }
}

fn existing_ids(root: &Handle) -> HashSet<String> {
    let mut ids = HashSet::new();
    collect_ids(root, &mut ids);
    ids
}

fn collect_ids(node: &Handle, ids: &mut HashSet<String>) {
    if let Some(id) = node.get_attribute("id") {
        ids.insert(id);
    }
    if let Some(id) = node.meta.borrow().get("id") {
        ids.insert(id.clone());
    }
    for child in node.children.borrow().iter() {
        collect_ids(child, ids);
    }
}

fn is_heading(node: &Handle) -> bool {
    match &*node.data.borrow() {
        AstData::Heading { .. } => true,
        AstData::Element { name, .. } => {
            matches!(name.as_str(), "H1" | "H2" | "H3" | "H4" | "H5" | "H6")
        }
        _ => false,
    }
}

/// Lowercase, alphanumeric-and-dash slug of a heading text.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

impl Operation for AddHeadingIds {
    fn name(&self) -> &'static str {
        "add-heading-ids"
    }

    fn should_apply(&self, node: &Handle) -> bool {
        if !is_heading(node) {
            return false;
        }
        let has_id =
            node.get_attribute("id").is_some() || node.meta.borrow().contains_key("id");
        !has_id
    }

    fn apply(&self, node: &Handle, cx: &TransformContext) -> Result<Action, Error> {
        let slug = slugify(&crate::tree::text_content(node));
        let id = self.claim(cx, &slug);
        if matches!(&*node.data.borrow(), AstData::Element { .. }) {
            node.set_attribute("id", &id);
        } else {
            node.meta.borrow_mut().insert("id".into(), id);
        }
        Ok(Action::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};
    use crate::transform::Pipeline;
    use crate::tree::{elements_by_tag_name, outer_html, text_content};
    use pretty_assertions::assert_eq;

    fn dom(html: &str) -> Handle {
        parse(html, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn remove_elements_drops_subtrees() {
        let doc = dom("<p>keep</p><nav><p>menu</p></nav>");
        Pipeline::new()
            .push(RemoveElements::new(["nav"]))
            .run(&doc)
            .unwrap();
        assert!(elements_by_tag_name(&doc, "NAV").is_empty());
        assert!(!elements_by_tag_name(&doc, "P").is_empty());
    }

    #[test]
    fn remove_comments_strips_preserved_comments() {
        let doc = parse(
            "<p>a</p><!-- secret -->",
            &ParseOptions {
                preserve_comments: true,
                ..Default::default()
            },
        )
        .unwrap();
        Pipeline::new().push(RemoveComments).run(&doc).unwrap();
        assert!(!outer_html(&doc).contains("secret"));
    }

    #[test]
    fn collapse_whitespace_preserves_pre() {
        let doc = parse(
            "<p>a   b\n\nc</p><pre>  x\n  y</pre>",
            &ParseOptions {
                normalize: false,
                ..Default::default()
            },
        )
        .unwrap();
        Pipeline::new().push(CollapseWhitespace).run(&doc).unwrap();
        let p = &elements_by_tag_name(&doc, "P")[0];
        assert_eq!(text_content(p), "a b c");
        let pre = &elements_by_tag_name(&doc, "PRE")[0];
        assert_eq!(text_content(pre), "  x\n  y");
    }

    #[test]
    fn sanitize_removes_script_and_event_handlers() {
        let doc = dom(r#"<p onclick="evil()">a</p><script>alert(1)</script>"#);
        Pipeline::new()
            .push(SanitizeHtml::new())
            .run(&doc)
            .unwrap();
        assert!(elements_by_tag_name(&doc, "SCRIPT").is_empty());
        assert!(!elements_by_tag_name(&doc, "P")[0].has_attribute("onclick"));
    }

    #[test]
    fn sanitize_rejects_scriptable_schemes() {
        let doc = dom(r#"<a href="JavaScript:alert(1)">x</a><a href="https://ok.example">y</a>"#);
        Pipeline::new()
            .push(SanitizeHtml::new())
            .run(&doc)
            .unwrap();
        let anchors = elements_by_tag_name(&doc, "A");
        assert!(!anchors[0].has_attribute("href"));
        assert_eq!(
            anchors[1].get_attribute("href").as_deref(),
            Some("https://ok.example")
        );
    }

    #[test]
    fn sanitize_is_idempotent() {
        let html = r#"<p onclick="x">a</p><form><input></form><a href="data:text/html,x">l</a>"#;
        let once = dom(html);
        Pipeline::new().push(SanitizeHtml::new()).run(&once).unwrap();
        let twice = dom(html);
        let pipeline = Pipeline::new().push(SanitizeHtml::new());
        pipeline.run(&twice).unwrap();
        pipeline.run(&twice).unwrap();
        assert_eq!(outer_html(&once), outer_html(&twice));
    }

    #[test]
    fn secure_external_links_spares_internal_domains() {
        let doc = dom(
            r#"<a href="https://external.example/x">x</a><a href="https://docs.mysite.com/y">y</a>"#,
        );
        Pipeline::new()
            .push(SecureExternalLinks::new(["mysite.com"]))
            .run(&doc)
            .unwrap();
        let anchors = elements_by_tag_name(&doc, "A");
        assert_eq!(anchors[0].get_attribute("target").as_deref(), Some("_blank"));
        assert_eq!(
            anchors[0].get_attribute("rel").as_deref(),
            Some("noopener noreferrer")
        );
        assert!(!anchors[1].has_attribute("target"));
    }

    #[test]
    fn absolute_urls_resolves_relative_only() {
        let base = Url::parse("https://example.com/docs/page.html").unwrap();
        let doc = dom(
            r#"<a href="../a">r</a><a href="https://other.example/x">abs</a>
               <a href="mailto:x@example.com">m</a><img src="pic.png">"#,
        );
        Pipeline::new()
            .push(AbsoluteUrls::new(base))
            .run(&doc)
            .unwrap();
        let anchors = elements_by_tag_name(&doc, "A");
        assert_eq!(
            anchors[0].get_attribute("href").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            anchors[1].get_attribute("href").as_deref(),
            Some("https://other.example/x")
        );
        assert_eq!(
            anchors[2].get_attribute("href").as_deref(),
            Some("mailto:x@example.com")
        );
        let img = &elements_by_tag_name(&doc, "IMG")[0];
        assert_eq!(
            img.get_attribute("src").as_deref(),
            Some("https://example.com/docs/pic.png")
        );
    }

    #[test]
    fn add_class_is_a_union_append() {
        let doc = dom(r#"<p class="lead">a</p><p>b</p>"#);
        let op = AddClass::new("styled", Box::new(|n: &Handle| n.is_element("P")));
        Pipeline::new().push(op).run(&doc).unwrap();
        let paragraphs = elements_by_tag_name(&doc, "P");
        assert_eq!(
            paragraphs[0].get_attribute("class").as_deref(),
            Some("lead styled")
        );
        assert_eq!(paragraphs[1].get_attribute("class").as_deref(), Some("styled"));
        // Running again must not duplicate the token.
        Pipeline::new()
            .push(AddClass::new("styled", Box::new(|n: &Handle| n.is_element("P"))))
            .run(&doc)
            .unwrap();
        assert_eq!(
            paragraphs[0].get_attribute("class").as_deref(),
            Some("lead styled")
        );
    }

    #[test]
    fn wrap_elements_skips_already_wrapped() {
        let doc = dom("<img src=\"a.png\"><figure class=\"media\"><img src=\"b.png\"></figure>");
        let wrap = WrapElements::new(
            "figure",
            vec![("class".into(), "media".into())],
            Box::new(|n: &Handle| n.is_element("IMG")),
        );
        Pipeline::new().push(wrap).run(&doc).unwrap();
        assert_eq!(elements_by_tag_name(&doc, "FIGURE").len(), 2);
    }

    #[test]
    fn unwrap_splices_all_children() {
        let doc = dom("<div class=\"wrapper\"><p>a</p><p>b</p><p>c</p></div>");
        let op = UnwrapElements::new(Box::new(|n: &Handle| n.has_class("wrapper")));
        Pipeline::new().push(op).run(&doc).unwrap();
        let body = &elements_by_tag_name(&doc, "BODY")[0];
        assert_eq!(body.children.borrow().len(), 3);
        assert!(elements_by_tag_name(&doc, "DIV").is_empty());
    }

    #[test]
    fn heading_ids_are_unique() {
        let doc = dom("<h2>Setup</h2><h2>Setup</h2><h2 id=\"setup-3\">Setup</h2><h2>Setup</h2>");
        Pipeline::new()
            .push(AddHeadingIds::new(""))
            .run(&doc)
            .unwrap();
        let ids: Vec<String> = elements_by_tag_name(&doc, "H2")
            .iter()
            .filter_map(|h| h.get_attribute("id"))
            .collect();
        assert_eq!(ids.len(), 4);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), 4, "duplicate ids in {ids:?}");
    }

    #[test]
    fn slugify_flattens_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Spaced   out  "), "spaced-out");
        assert_eq!(slugify("???"), "section");
    }
}
