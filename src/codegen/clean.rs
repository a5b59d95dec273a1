// codegen/clean.rs - strip markdown wrapping from model output

use regex::Regex;
use std::sync::OnceLock;

/// Remove every markdown fence line (a line opening with three backticks) and trim.
pub fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.trim().to_string();
    }
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE_RE
        .get_or_init(|| Regex::new(r"(?m)^[ \t]*```[^\n]*$\n?").expect("valid fence regex"));
    re.replace_all(text, "").trim().to_string()
}
