// ASCIIMath → LaTeX rewrite.
//
// A light textual translation: slash fractions become \frac, sqrt(…) becomes
// \sqrt{…}, and recognized function/Greek names gain a backslash. Anything
// else passes through unchanged.

use std::sync::LazyLock;

use regex::Regex;

static FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<num>[A-Za-z0-9]+)\s*/\s*(?<den>[A-Za-z0-9]+)").unwrap());
static SQRT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sqrt\(([^()]*)\)").unwrap());
static NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\?[A-Za-z]+").unwrap());

const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "sinh", "cosh", "tanh", "log", "ln", "lim", "exp",
    "min", "max", "det", "gcd",
];

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega", "Gamma", "Delta", "Theta", "Lambda", "Xi", "Pi", "Sigma", "Phi", "Psi", "Omega",
];

pub(crate) fn ascii_to_latex(content: &str) -> String {
    let value = content.trim();

    let value = SQRT.replace_all(value, r"\sqrt{$1}");
    let value = FRACTION.replace_all(&value, r"\frac{$num}{$den}");

    // Escape recognized names, leaving anything already backslashed alone.
    let value = NAME.replace_all(&value, |caps: &regex::Captures| {
        let name = &caps[0];
        if name.starts_with('\\') {
            name.to_string()
        } else if FUNCTIONS.contains(&name) || GREEK.contains(&name) {
            format!(r"\{name}")
        } else {
            name.to_string()
        }
    });

    value.trim().to_string()
}
