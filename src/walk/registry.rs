// Tag-rule registry.
//
// Case-insensitive mapping from uppercase tag name to rule, with synonym
// expansion compiled at registration time and a single default-rule slot.
// Tags with no rule either walk transparently (the passthrough set) or are
// retained as raw HTML.

use std::collections::HashMap;
use std::rc::Rc;

use super::Context;
use crate::error::Error;
use crate::tree::Handle;

/// A per-tag conversion strategy. `emit` returns the nodes to splice into
/// the parent's child stream; an empty vector drops the element.
pub trait TagRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error>;
}

/// Elements that contribute nothing to Markdown output and are dropped with
/// their subtrees.
const IGNORED: &[&str] = &[
    "APPLET", "AREA", "BASEFONT", "BGSOUND", "COL", "COLGROUP", "COMMAND", "CONTENT",
    "DATALIST", "DIALOG", "EMBED", "FRAME", "FRAMESET", "ISINDEX", "KEYGEN", "LINK", "MATH",
    "MENU", "MENUITEM", "META", "NEXTID", "NOEMBED", "NOFRAMES", "OPTGROUP", "OPTION", "PARAM",
    "SCRIPT", "SHADOW", "SOURCE", "SPACER", "STYLE", "SVG", "TEMPLATE", "TITLE", "TRACK",
];

/// Elements whose children are rendered in place while the element itself is
/// discarded, when no rule claims them.
const PASSTHROUGH: &[&str] = &[
    "ABBR", "ACRONYM", "ADDRESS", "ARTICLE", "ASIDE", "BDI", "BDO", "BIG", "BLINK", "BODY",
    "BUTTON", "CANVAS", "CAPTION", "CENTER", "DATA", "DD", "DETAILS", "DFN", "DIR", "DL", "DT",
    "FIELDSET", "FIGCAPTION", "FIGURE", "FONT", "FOOTER", "FORM", "HEAD", "HEADER", "HGROUP",
    "HTML", "INS", "LABEL", "LEGEND", "MAIN", "MAP", "MARK", "MARQUEE", "METER", "MULTICOL",
    "NAV", "NOBR", "NOSCRIPT", "OBJECT", "OUTPUT", "PICTURE", "PROGRESS", "Q", "RB", "RBC",
    "RP", "RT", "RTC", "RUBY", "SECTION", "SELECT", "SLOT", "SMALL", "SPAN", "SUB", "SUMMARY",
    "SUP", "TBODY", "TD", "TFOOT", "TH", "THEAD", "TIME", "TR", "U", "WBR",
];

/// Registry of tag rules, keyed on uppercase tag name.
#[derive(Default)]
pub struct Registry {
    rules: HashMap<String, Rc<dyn TagRule>>,
    default_rule: Option<Rc<dyn TagRule>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a tag. Pseudo-tags expand to their synonym set:
    /// `H` covers `H1..H6`, `EM` also covers `I CITE DFN`, `STRONG` covers
    /// `B`, `DEL` covers `S STRIKE`.
    pub fn register(&mut self, tag: &str, rule: Rc<dyn TagRule>) {
        for name in expand_synonyms(&tag.to_ascii_uppercase()) {
            self.rules.insert(name, rule.clone());
        }
    }

    /// Install the fallback rule for unmatched tags.
    pub fn set_default(&mut self, rule: Rc<dyn TagRule>) {
        self.default_rule = Some(rule);
    }

    pub fn get(&self, tag: &str) -> Option<&Rc<dyn TagRule>> {
        self.rules.get(&tag.to_ascii_uppercase())
    }

    pub fn default_rule(&self) -> Option<&Rc<dyn TagRule>> {
        self.default_rule.as_ref()
    }

    pub fn is_ignored(&self, tag: &str) -> bool {
        IGNORED.contains(&tag.to_ascii_uppercase().as_str())
    }

    pub fn is_passthrough(&self, tag: &str) -> bool {
        PASSTHROUGH.contains(&tag.to_ascii_uppercase().as_str())
    }
}

fn expand_synonyms(tag: &str) -> Vec<String> {
    match tag {
        "H" => (1..=6).map(|n| format!("H{n}")).collect(),
        "EM" => ["EM", "I", "CITE", "DFN"].map(String::from).to_vec(),
        "STRONG" => ["STRONG", "B"].map(String::from).to_vec(),
        "DEL" => ["DEL", "S", "STRIKE"].map(String::from).to_vec(),
        other => vec![other.to_string()],
    }
}
