// MathML → LaTeX conversion.
//
// Structural path: parse the markup, walk the element tree and translate
// each MathML element to its LaTeX emission. When no parseable structure is
// found, a regex fallback rewrites fractions, scripts and roots textually
// and replaces a fixed table of symbolic operators.

use std::sync::LazyLock;

use regex::Regex;

use crate::parse::{parse, ParseOptions};
use crate::tree::{elements_by_tag_name, text_content, AstData, Handle};

pub(crate) fn mathml_to_latex(markup: &str) -> String {
    if !markup.contains('<') {
        return fallback_convert(markup);
    }
    match structural_convert(markup) {
        Some(latex) if !latex.trim().is_empty() => latex,
        _ => fallback_convert(markup),
    }
}

fn structural_convert(markup: &str) -> Option<String> {
    let options = ParseOptions::default();
    let dom = parse(markup, &options).ok()?;
    let root = elements_by_tag_name(&dom, "MATH")
        .into_iter()
        .next()
        .unwrap_or(dom);
    Some(postprocess(&convert_children(&root)))
}

fn convert_children(node: &Handle) -> String {
    node.children_snapshot()
        .iter()
        .map(convert_node)
        .collect::<Vec<_>>()
        .concat()
}

fn convert_node(node: &Handle) -> String {
    let data = node.data.borrow().clone();
    let name = match data {
        AstData::Text { value } => return value,
        AstData::Element { name, .. } => name,
        _ => return convert_children(node),
    };

    match name.as_str() {
        "MATH" | "MROW" | "MSTYLE" | "MPADDED" | "SEMANTICS" => convert_children(node),
        // Annotation elements repeat the content in another encoding.
        "ANNOTATION" | "ANNOTATION-XML" => String::new(),
        "MI" => convert_identifier(node),
        "MN" => text_content(node).trim().to_string(),
        "MO" => convert_operator(node),
        "MFRAC" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [num, den] => format!(r"\frac{{{num}}}{{{den}}}"),
                _ => parts.concat(),
            }
        }
        "MSUP" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [base, exp] => format!("{base}^{}", brace_if_long(exp)),
                _ => parts.concat(),
            }
        }
        "MSUB" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [base, sub] => format!("{base}_{}", brace_if_long(sub)),
                _ => parts.concat(),
            }
        }
        "MSUBSUP" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [base, sub, sup] => format!("{base}_{{{sub}}}^{{{sup}}}"),
                _ => parts.concat(),
            }
        }
        "MSQRT" => format!(r"\sqrt{{{}}}", convert_children(node)),
        "MROOT" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [base, index] => format!(r"\sqrt[{index}]{{{base}}}"),
                _ => parts.concat(),
            }
        }
        "MFENCED" => convert_fenced(node),
        "MTABLE" => convert_table(node),
        "MOVER" => convert_over_under(node, Position::Over),
        "MUNDER" => convert_over_under(node, Position::Under),
        "MUNDEROVER" => {
            let parts = converted_parts(node);
            match parts.as_slice() {
                [base, under, over] if is_large_operator(base) => {
                    format!(r"{base}\limits_{{{under}}}^{{{over}}}")
                }
                [base, under, over] => {
                    format!(r"\overset{{{over}}}{{\underset{{{under}}}{{{base}}}}}")
                }
                _ => parts.concat(),
            }
        }
        "MTEXT" => format!(r"\text{{{}}}", text_content(node).trim()),
        "MSPACE" => " ".to_string(),
        "MPHANTOM" => String::new(),
        _ => convert_children(node),
    }
}

/// Converted element children, trimmed, empty strings dropped.
fn converted_parts(node: &Handle) -> Vec<String> {
    node.children_snapshot()
        .iter()
        .map(|c| convert_node(c).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn brace_if_long(part: &str) -> String {
    if part.chars().count() > 1 {
        format!("{{{part}}}")
    } else {
        part.to_string()
    }
}

const FUNCTION_NAMES: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "sinh", "cosh", "tanh", "arcsin", "arccos",
    "arctan", "log", "ln", "lg", "exp", "lim", "liminf", "limsup", "min", "max", "det", "dim",
    "gcd", "inf", "sup", "arg", "deg", "ker", "mod",
];

fn convert_identifier(node: &Handle) -> String {
    let ident = text_content(node).trim().to_string();
    let mut chars = ident.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => greek_latex(c)
            .map(str::to_string)
            .unwrap_or_else(|| c.to_string()),
        _ if FUNCTION_NAMES.contains(&ident.as_str()) => format!("\\{ident}"),
        _ if ident.is_empty() => String::new(),
        _ => format!(r"\text{{{ident}}}"),
    }
}

fn convert_operator(node: &Handle) -> String {
    let op = text_content(node).trim().to_string();
    let stretchy = node
        .get_attribute("stretchy")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if stretchy {
        match op.as_str() {
            "(" | "[" | "{" | "⟨" | "⌈" | "⌊" => return format!(r"\left{}", fence_latex(&op)),
            ")" | "]" | "}" | "⟩" | "⌉" | "⌋" => return format!(r"\right{}", fence_latex(&op)),
            _ => {}
        }
    }
    match operator_latex(&op) {
        // Command-form operators need a separating space before whatever
        // follows, or the next letter merges into the control word.
        Some(latex) if latex.starts_with('\\') => format!("{latex} "),
        Some(latex) => latex.to_string(),
        None => op,
    }
}

fn fence_latex(fence: &str) -> &str {
    match fence {
        "{" => r"\{",
        "}" => r"\}",
        "⟨" => r"\langle",
        "⟩" => r"\rangle",
        "⌈" => r"\lceil",
        "⌉" => r"\rceil",
        "⌊" => r"\lfloor",
        "⌋" => r"\rfloor",
        "" => ".",
        other => other,
    }
}

fn operator_latex(op: &str) -> Option<&'static str> {
    Some(match op {
        "×" => r"\cdot",
        "⋅" | "·" => r"\cdot",
        "÷" => r"\div",
        "±" => r"\pm",
        "∓" => r"\mp",
        "≤" => r"\leq",
        "≥" => r"\geq",
        "≠" => r"\neq",
        "≈" => r"\approx",
        "≡" => r"\equiv",
        "∑" => r"\sum",
        "∏" => r"\prod",
        "∫" => r"\int",
        "∮" => r"\oint",
        "√" => r"\sqrt",
        "∞" => r"\infty",
        "∂" => r"\partial",
        "∇" => r"\nabla",
        "→" => r"\rightarrow",
        "←" => r"\leftarrow",
        "⇒" => r"\Rightarrow",
        "⇐" => r"\Leftarrow",
        "↔" => r"\leftrightarrow",
        "∈" => r"\in",
        "∉" => r"\notin",
        "⊂" => r"\subset",
        "⊆" => r"\subseteq",
        "⊃" => r"\supset",
        "⊇" => r"\supseteq",
        "∪" => r"\cup",
        "∩" => r"\cap",
        "∧" => r"\wedge",
        "∨" => r"\vee",
        "¬" => r"\neg",
        "∀" => r"\forall",
        "∃" => r"\exists",
        "∅" => r"\emptyset",
        "⋯" => r"\cdots",
        "…" => r"\ldots",
        "′" => "'",
        "−" => "-",
        "∗" => "*",
        _ => return None,
    })
}

fn greek_latex(c: char) -> Option<&'static str> {
    Some(match c {
        'α' => r"\alpha",
        'β' => r"\beta",
        'γ' => r"\gamma",
        'δ' => r"\delta",
        'ε' | 'ϵ' => r"\epsilon",
        'ζ' => r"\zeta",
        'η' => r"\eta",
        'θ' => r"\theta",
        'ι' => r"\iota",
        'κ' => r"\kappa",
        'λ' => r"\lambda",
        'μ' => r"\mu",
        'ν' => r"\nu",
        'ξ' => r"\xi",
        'π' => r"\pi",
        'ρ' => r"\rho",
        'σ' => r"\sigma",
        'τ' => r"\tau",
        'υ' => r"\upsilon",
        'φ' | 'ϕ' => r"\phi",
        'χ' => r"\chi",
        'ψ' => r"\psi",
        'ω' => r"\omega",
        'Γ' => r"\Gamma",
        'Δ' => r"\Delta",
        'Θ' => r"\Theta",
        'Λ' => r"\Lambda",
        'Ξ' => r"\Xi",
        'Π' => r"\Pi",
        'Σ' => r"\Sigma",
        'Φ' => r"\Phi",
        'Ψ' => r"\Psi",
        'Ω' => r"\Omega",
        _ => return None,
    })
}

fn convert_fenced(node: &Handle) -> String {
    let open = node.get_attribute("open").unwrap_or_else(|| "(".into());
    let close = node.get_attribute("close").unwrap_or_else(|| ")".into());
    let separators = node
        .get_attribute("separators")
        .unwrap_or_else(|| ",".into());

    // A fenced table renders its own delimiters through the matrix
    // environment (pmatrix and friends).
    let element_children: Vec<Handle> = node
        .children_snapshot()
        .into_iter()
        .filter(|c| matches!(&*c.data.borrow(), AstData::Element { .. }))
        .collect();
    if let [only] = element_children.as_slice() {
        if only.is_element("MTABLE") {
            return convert_node(only);
        }
    }

    let parts = converted_parts(node);
    // `{…|…}` reads as set-builder notation.
    let joined = if separators.trim() == "|" {
        parts.join(r" \middle| ")
    } else {
        let sep = separators.trim().chars().next().unwrap_or(',').to_string();
        parts.join(&sep)
    };
    format!(
        r"\left{}{}\right{}",
        fence_latex(&open),
        joined,
        fence_latex(&close)
    )
}

fn convert_table(node: &Handle) -> String {
    let mut rows = Vec::new();
    let mut max_cols = 0usize;
    for tr in node.children_snapshot() {
        if !tr.is_element("MTR") {
            continue;
        }
        let cells: Vec<String> = tr
            .children_snapshot()
            .iter()
            .filter(|c| c.is_element("MTD"))
            .map(convert_children)
            .collect();
        max_cols = max_cols.max(cells.len());
        rows.push(cells.join(" & "));
    }
    let body = rows.join(r" \\ ");

    let framed = node.has_attribute("frame");
    if framed || max_cols > 10 {
        let columns = "c".repeat(max_cols.max(1));
        return format!(
            r"\left(\begin{{array}}{{{columns}}}{body}\end{{array}}\right)"
        );
    }

    let parent_fence = node
        .parent()
        .filter(|p| p.is_element("MFENCED"))
        .map(|p| p.get_attribute("open").unwrap_or_else(|| "(".into()));
    let env = match parent_fence.as_deref() {
        Some("[") => "bmatrix",
        Some("{") => "Bmatrix",
        Some("|") => "vmatrix",
        Some("‖") => "Vmatrix",
        Some(_) => "pmatrix",
        None => "pmatrix",
    };
    format!(r"\begin{{{env}}}{body}\end{{{env}}}")
}

enum Position {
    Over,
    Under,
}

fn accent_latex(mark: &str) -> Option<&'static str> {
    Some(match mark {
        "^" | "ˆ" | "\u{302}" => r"\hat",
        "¯" | "‾" | "_" | "\u{304}" => r"\bar",
        "~" | "˜" | "\u{303}" => r"\tilde",
        "→" | "⃗" => r"\vec",
        "˙" | "\u{307}" => r"\dot",
        "¨" | "\u{308}" => r"\ddot",
        _ => return None,
    })
}

fn is_large_operator(base: &str) -> bool {
    matches!(
        base,
        r"\sum" | r"\prod" | r"\int" | r"\oint" | r"\lim" | r"\max" | r"\min" | r"\sup" | r"\inf"
    ) || base.starts_with(r"\big")
}

fn convert_over_under(node: &Handle, position: Position) -> String {
    let raw_marks: Vec<String> = node
        .children_snapshot()
        .iter()
        .map(|c| text_content(c).trim().to_string())
        .collect();
    let parts = converted_parts(node);
    let (base, script) = match parts.as_slice() {
        [base, script] => (base.clone(), script.clone()),
        _ => return parts.concat(),
    };

    if is_large_operator(&base) {
        return match position {
            Position::Over => format!(r"{base}\limits^{{{script}}}"),
            Position::Under => format!(r"{base}\limits_{{{script}}}"),
        };
    }

    let mark = raw_marks.get(1).map(String::as_str).unwrap_or("");
    if let Some(accent) = accent_latex(mark) {
        return format!("{accent}{{{base}}}");
    }
    match position {
        Position::Over => format!(r"\overset{{{script}}}{{{base}}}"),
        Position::Under => format!(r"\underset{{{script}}}{{{base}}}"),
    }
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

static BRACE_INNER_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\s+|\s+\}").unwrap());
static EQUALS_SPACING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*=\s*").unwrap());
static PLUS_SPACING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\+\s*").unwrap());
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn postprocess(latex: &str) -> String {
    let value = BRACE_INNER_SPACE.replace_all(latex, |caps: &regex::Captures| {
        if caps[0].starts_with('{') { "{" } else { "}" }.to_string()
    });
    let value = EQUALS_SPACING.replace_all(&value, " = ");
    let value = PLUS_SPACING.replace_all(&value, " + ");
    let value = SPACE_RUN.replace_all(&value, " ");
    value.trim().to_string()
}

// ---------------------------------------------------------------------------
// Regex fallback
// ---------------------------------------------------------------------------

static MATH_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<math[^>]*>(.*)</math>").unwrap());
static FRAC_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<mfrac[^>]*>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*</mfrac>")
        .unwrap()
});
static SUP_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<msup[^>]*>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*</msup>")
        .unwrap()
});
static SUB_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<msub[^>]*>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*<m\w+[^>]*>([^<]*)</m\w+>\s*</msub>")
        .unwrap()
});
static SQRT_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<msqrt[^>]*>(.*?)</msqrt>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[^>]+>").unwrap());

fn fallback_convert(markup: &str) -> String {
    let body = MATH_BODY
        .captures(markup)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| markup.to_string());

    let value = FRAC_TAGS.replace_all(&body, r"\frac{$1}{$2}");
    let value = SUP_TAGS.replace_all(&value, "$1^{$2}");
    let value = SUB_TAGS.replace_all(&value, "$1_{$2}");
    let value = SQRT_TAGS.replace_all(&value, r"\sqrt{$1}");
    let value = ANY_TAG.replace_all(&value, "");

    // Fixed symbolic operator table.
    let mut value = value.into_owned();
    for (symbol, latex) in [
        ("×", r"\cdot"),
        ("⋅", r"\cdot"),
        ("÷", r"\div"),
        ("±", r"\pm"),
        ("≤", r"\leq"),
        ("≥", r"\geq"),
        ("≠", r"\neq"),
        ("∑", r"\sum"),
        ("∏", r"\prod"),
        ("∫", r"\int"),
        ("∞", r"\infty"),
        ("→", r"\rightarrow"),
        ("−", "-"),
    ] {
        if value.contains(symbol) {
            value = value.replace(symbol, latex);
        }
    }
    postprocess(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fraction_converts_structurally() {
        let latex = mathml_to_latex("<math><mfrac><mi>a</mi><mi>b</mi></mfrac></math>");
        assert_eq!(latex, r"\frac{a}{b}");
    }

    #[test]
    fn superscript_braces_long_exponents() {
        assert_eq!(
            mathml_to_latex("<math><msup><mi>x</mi><mn>2</mn></msup></math>"),
            "x^2"
        );
        assert_eq!(
            mathml_to_latex("<math><msup><mi>x</mi><mn>10</mn></msup></math>"),
            "x^{10}"
        );
    }

    #[test]
    fn subsup_braces_both_scripts() {
        assert_eq!(
            mathml_to_latex(
                "<math><msubsup><mi>x</mi><mn>1</mn><mn>2</mn></msubsup></math>"
            ),
            "x_{1}^{2}"
        );
    }

    #[test]
    fn greek_identifiers_map() {
        assert_eq!(mathml_to_latex("<math><mi>α</mi></math>"), r"\alpha");
    }

    #[test]
    fn function_names_gain_backslash() {
        assert_eq!(mathml_to_latex("<math><mi>sin</mi></math>"), r"\sin");
    }

    #[test]
    fn multi_letter_identifiers_become_text() {
        assert_eq!(
            mathml_to_latex("<math><mi>speed</mi></math>"),
            r"\text{speed}"
        );
    }

    #[test]
    fn operators_map_through_the_table() {
        assert_eq!(
            mathml_to_latex("<math><mi>a</mi><mo>≤</mo><mi>b</mi></math>"),
            r"a\leq b"
        );
    }

    #[test]
    fn equals_gets_breathing_room() {
        assert_eq!(
            mathml_to_latex("<math><mi>E</mi><mo>=</mo><mi>m</mi></math>"),
            "E = m"
        );
    }

    #[test]
    fn sqrt_and_root() {
        assert_eq!(
            mathml_to_latex("<math><msqrt><mi>x</mi></msqrt></math>"),
            r"\sqrt{x}"
        );
        assert_eq!(
            mathml_to_latex("<math><mroot><mi>x</mi><mn>3</mn></mroot></math>"),
            r"\sqrt[3]{x}"
        );
    }

    #[test]
    fn fenced_defaults_to_parentheses() {
        assert_eq!(
            mathml_to_latex("<math><mfenced><mi>a</mi><mi>b</mi></mfenced></math>"),
            r"\left(a,b\right)"
        );
    }

    #[test]
    fn fenced_table_becomes_pmatrix() {
        let latex = mathml_to_latex(
            "<math><mfenced><mtable><mtr><mtd><mn>1</mn></mtd><mtd><mn>0</mn></mtd></mtr>\
             <mtr><mtd><mn>0</mn></mtd><mtd><mn>1</mn></mtd></mtr></mtable></mfenced></math>",
        );
        assert_eq!(latex, r"\begin{pmatrix}1 & 0 \\ 0 & 1\end{pmatrix}");
    }

    #[test]
    fn bracket_fenced_table_becomes_bmatrix() {
        let latex = mathml_to_latex(
            "<math><mfenced open=\"[\" close=\"]\"><mtable><mtr><mtd><mn>1</mn></mtd></mtr></mtable></mfenced></math>",
        );
        assert!(latex.contains(r"\begin{bmatrix}"), "{latex}");
    }

    #[test]
    fn sum_with_under_over_uses_limits() {
        let latex = mathml_to_latex(
            "<math><munderover><mo>∑</mo><mrow><mi>i</mi><mo>=</mo><mn>0</mn></mrow><mi>n</mi></munderover></math>",
        );
        assert_eq!(latex, r"\sum\limits_{i = 0}^{n}");
    }

    #[test]
    fn over_accents_map() {
        assert_eq!(
            mathml_to_latex("<math><mover><mi>x</mi><mo>^</mo></mover></math>"),
            r"\hat{x}"
        );
        assert_eq!(
            mathml_to_latex("<math><mover><mi>v</mi><mo>→</mo></mover></math>"),
            r"\vec{v}"
        );
    }

    #[test]
    fn mtext_is_wrapped() {
        assert_eq!(
            mathml_to_latex("<math><mtext>if</mtext></math>"),
            r"\text{if}"
        );
    }

    #[test]
    fn fallback_rewrites_textually() {
        // An unclosed structure the tree walk yields nothing useful for.
        let latex = fallback_convert("<mfrac><mi>a</mi><mn>2</mn></mfrac> ≤ ∞");
        assert_eq!(latex, r"\frac{a}{2} \leq \infty");
    }
}
