// narration/source.rs - lightweight view over Python scene source
//
// Not a parser: it only knows enough about string literals to tell real
// comments from `#` characters inside strings.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Byte offset of the `#`.
    pub offset: usize,
    /// Byte offset of the end of the line.
    pub end: usize,
    pub line: usize,
    /// Comment body with the `#` and surrounding whitespace removed.
    pub text: String,
    /// True when nothing but whitespace precedes the `#` on its line.
    pub standalone: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCall {
    pub offset: usize,
    pub constructor: String,
    pub text: String,
}

#[derive(Debug)]
pub struct SourceView<'a> {
    pub source: &'a str,
    pub comments: Vec<Comment>,
    pub text_calls: Vec<TextCall>,
}

impl<'a> SourceView<'a> {
    pub fn new(source: &'a str) -> Self {
        let comments = scan_comments(source);
        let text_calls = scan_text_calls(source, &comments);
        Self {
            source,
            comments,
            text_calls,
        }
    }

    /// Sum of literal `self.wait(n)` durations in `range` of the source.
    pub fn wait_seconds(&self, start: usize, end: usize) -> f64 {
        static WAIT_RE: OnceLock<Regex> = OnceLock::new();
        let re = WAIT_RE.get_or_init(|| {
            Regex::new(r"self\.wait\s*\(\s*(\d+(?:\.\d+)?|\.\d+)\s*\)").expect("valid wait regex")
        });

        let end = end.min(self.source.len());
        re.captures_iter(&self.source[start..end])
            .filter(|c| {
                let at = start + c.get(0).map(|m| m.start()).unwrap_or(0);
                !self.in_comment(at)
            })
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .sum()
    }

    pub fn total_wait_seconds(&self) -> f64 {
        self.wait_seconds(0, self.source.len())
    }

    fn in_comment(&self, offset: usize) -> bool {
        self.comments
            .iter()
            .any(|c| offset >= c.offset && offset < c.end)
    }
}

fn scan_comments(source: &str) -> Vec<Comment> {
    let mut comments = Vec::new();
    // Open triple-quote delimiter carried across lines.
    let mut open_triple: Option<&'static str> = None;
    let mut line_start = 0;

    for (line_no, line) in source.split_inclusive('\n').enumerate() {
        let body = line.trim_end_matches(['\n', '\r']);
        let mut i = 0;
        let bytes = body.as_bytes();

        while i < bytes.len() {
            if let Some(delim) = open_triple {
                match body[i..].find(delim) {
                    Some(pos) => {
                        i += pos + 3;
                        open_triple = None;
                    }
                    None => i = bytes.len(),
                }
                continue;
            }

            match bytes[i] {
                b'#' => {
                    let text = body[i + 1..].trim().to_string();
                    comments.push(Comment {
                        offset: line_start + i,
                        end: line_start + body.len(),
                        line: line_no,
                        text,
                        standalone: body[..i].trim().is_empty(),
                    });
                    break;
                }
                quote @ (b'"' | b'\'') => {
                    if body[i..].starts_with("\"\"\"") || body[i..].starts_with("'''") {
                        open_triple = Some(if quote == b'"' { "\"\"\"" } else { "'''" });
                        i += 3;
                        continue;
                    }
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }

        line_start += line.len();
    }

    comments
}

fn scan_text_calls(source: &str, comments: &[Comment]) -> Vec<TextCall> {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    let re = CALL_RE.get_or_init(|| {
        Regex::new(
            r#"\b(Text|Tex|Title|MarkupText)\s*\(\s*(r?)(?:"((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)')"#,
        )
        .expect("valid text call regex")
    });

    re.captures_iter(source)
        .filter_map(|c| {
            let whole = c.get(0)?;
            if comments
                .iter()
                .any(|cm| whole.start() >= cm.offset && whole.start() < cm.end)
            {
                return None;
            }
            let constructor = c.get(1)?.as_str().to_string();
            let raw = c.get(2).map(|m| !m.as_str().is_empty()).unwrap_or(false);
            let literal = c.get(3).or_else(|| c.get(4))?.as_str();

            let text = speakable(&constructor, literal, raw);
            if text.is_empty() {
                return None;
            }
            Some(TextCall {
                offset: whole.start(),
                constructor,
                text,
            })
        })
        .collect()
}

/// Turn a display literal into something a narrator can read.
fn speakable(constructor: &str, literal: &str, raw: bool) -> String {
    let mut text = if raw {
        literal.to_string()
    } else {
        unescape(literal)
    };

    match constructor {
        "Tex" => text = strip_latex(&text),
        "MarkupText" => text = strip_markup(&text),
        _ => {}
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('t') | Some('r') => out.push(' '),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

pub fn strip_latex(text: &str) -> String {
    static CMD_RE: OnceLock<Regex> = OnceLock::new();
    let re = CMD_RE.get_or_init(|| Regex::new(r"\\[A-Za-z]+\*?").expect("valid latex regex"));
    re.replace_all(text, " ")
        .chars()
        .map(|c| match c {
            '{' | '}' | '$' | '\\' | '^' | '_' | '&' => ' ',
            other => other,
        })
        .collect()
}

fn strip_markup(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));
    re.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_inside_string_is_not_a_comment() {
        let src = "label = Text(\"Step #1\")  # real comment\ns = '''\n# inside docstring\n'''\n";
        let view = SourceView::new(src);

        assert_eq!(view.comments.len(), 1);
        assert_eq!(view.comments[0].text, "real comment");
        assert!(!view.comments[0].standalone);
        assert_eq!(view.text_calls[0].text, "Step #1");
    }

    #[test]
    fn test_text_calls_and_waits() {
        let src = r#"
title = Title("Fractions")
eq = Tex(r"$\frac{1}{2}$ is a half")
m = MathTex("x^2")
note = MarkupText('<b>Bold</b> idea')
# t = Text("commented out")
self.wait(1.5)
self.wait(2)
# self.wait(10)
"#;
        let view = SourceView::new(src);
        let texts: Vec<&str> = view.text_calls.iter().map(|t| t.text.as_str()).collect();

        assert_eq!(texts, vec!["Fractions", "1 2 is a half", "Bold idea"]);
        assert_eq!(view.total_wait_seconds(), 3.5);
    }
}
