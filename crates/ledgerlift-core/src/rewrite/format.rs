// Text helpers for generated Java: casing, indentation, line endings.

use std::sync::OnceLock;

use regex::Regex;

pub fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Prefix `tabs` tabs to every non-blank line
pub fn indent(text: &str, tabs: usize) -> String {
    indent_with(text, &"\t".repeat(tabs))
}

/// Prefix `prefix` to every non-blank line
pub fn indent_with(text: &str, prefix: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indent a member template to sit at `member_indent`. The first line is
/// left bare because it is inserted after the existing indentation.
pub fn member_block(template: &str, member_indent: &str) -> String {
    indent_with(template, member_indent)
        .trim_start_matches([' ', '\t'])
        .to_string()
}

/// Line terminator style of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    CrLf,
    Lf,
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
        }
    }

    pub fn platform() -> Self {
        if cfg!(windows) {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    /// First style found, in `\r\n`, `\n`, `\r` order of preference
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else if text.contains('\n') {
            LineEnding::Lf
        } else if text.contains('\r') {
            LineEnding::Cr
        } else {
            LineEnding::platform()
        }
    }

    /// Rewrite every line break in `text` to this style
    pub fn apply(self, text: &str) -> String {
        static BREAK: OnceLock<Regex> = OnceLock::new();
        let re = BREAK.get_or_init(|| Regex::new(r"\r\n|\r|\n").expect("valid line-break pattern"));
        re.replace_all(text, self.as_str()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casing() {
        assert_eq!(upper_first("store"), "Store");
        assert_eq!(lower_first("Name"), "name");
        assert_eq!(upper_first(""), "");
        assert!(starts_uppercase("Id"));
        assert!(!starts_uppercase("id"));
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a;\n\nb;", 2), "\t\ta;\n\n\t\tb;");
        assert_eq!(indent_with("a;\n  \nb;", "    "), "    a;\n\n    b;");
    }

    #[test]
    fn member_block_leaves_first_line_bare() {
        assert_eq!(member_block("int f() {\n\treturn 1;\n}", "\t"), "int f() {\n\t\treturn 1;\n\t}");
    }

    #[test]
    fn line_endings_detect_and_apply() {
        assert_eq!(LineEnding::detect("a\r\nb\n"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("a\nb"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\rb"), LineEnding::Cr);
        assert_eq!(LineEnding::CrLf.apply("a\nb\r\nc\rd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(LineEnding::Lf.apply("a\r\nb"), "a\nb");
    }
}
