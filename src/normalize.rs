//! Whitespace clean-up transforms for the editor toolbar and `typer clean`.
//!
//! Line-based transforms split on `\r\n`, `\n` and lone `\r`, and join the
//! result with `\n`, so they also normalize line endings. A trailing line
//! break survives as a trailing empty line.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_TAB_SIZE: usize = 4;

fn space_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("valid regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid regex"))
}

fn line_ending() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r\n?|\n").expect("valid regex"))
}

fn split_lines(text: &str) -> Vec<&str> {
    line_ending().split(text).collect()
}

fn map_lines(text: &str, f: impl Fn(&str) -> &str) -> String {
    split_lines(text).into_iter().map(f).collect::<Vec<_>>().join("\n")
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Trim leading and trailing whitespace on every line.
pub fn trim_lines(text: &str) -> String {
    map_lines(text, str::trim)
}

pub fn remove_trailing_spaces(text: &str) -> String {
    map_lines(text, str::trim_end)
}

pub fn remove_leading_spaces(text: &str) -> String {
    map_lines(text, str::trim_start)
}

/// Collapse runs of two or more ASCII spaces into one.
pub fn collapse_spaces(text: &str) -> String {
    space_run().replace_all(text, " ").into_owned()
}

/// Collapse runs of two or more whitespace characters of any kind (tabs,
/// NBSP and newlines included) into one space.
pub fn collapse_all_whitespace(text: &str) -> String {
    whitespace_run().replace_all(text, " ").into_owned()
}

pub fn remove_empty_lines(text: &str) -> String {
    split_lines(text)
        .into_iter()
        .filter(|line| !is_blank(line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn expand_tabs(text: &str, tab_size: usize) -> String {
    text.replace('\t', &" ".repeat(tab_size))
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    line_ending().replace_all(text, "\n").into_owned()
}

/// Drop blank lines at the start and end, keeping interior ones.
/// Text made only of blank lines is left as is.
pub fn trim_empty_lines(text: &str) -> String {
    let lines = split_lines(text);
    let Some(first) = lines.iter().position(|l| !is_blank(l)) else {
        return lines.join("\n");
    };
    let last = lines.iter().rposition(|l| !is_blank(l)).unwrap_or(first);
    lines[first..=last].join("\n")
}

/// Normalize line endings, trim lines, collapse spaces, drop blank lines,
/// then expand tabs.
pub fn full_clean(text: &str, tab_size: usize) -> String {
    let text = normalize_line_endings(text);
    let text = trim_lines(&text);
    let text = collapse_spaces(&text);
    let text = remove_empty_lines(&text);
    expand_tabs(&text, tab_size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    TrimLines,
    RemoveTrailingSpaces,
    RemoveLeadingSpaces,
    CollapseSpaces,
    CollapseAllWhitespace,
    RemoveEmptyLines,
    ExpandTabs,
    NormalizeLineEndings,
    TrimEmptyLines,
    FullClean,
}

impl Normalization {
    pub fn apply(self, text: &str) -> String {
        self.apply_with(text, DEFAULT_TAB_SIZE)
    }

    /// `tab_size` only affects [`Normalization::ExpandTabs`] and
    /// [`Normalization::FullClean`].
    pub fn apply_with(self, text: &str, tab_size: usize) -> String {
        match self {
            Normalization::TrimLines => trim_lines(text),
            Normalization::RemoveTrailingSpaces => remove_trailing_spaces(text),
            Normalization::RemoveLeadingSpaces => remove_leading_spaces(text),
            Normalization::CollapseSpaces => collapse_spaces(text),
            Normalization::CollapseAllWhitespace => collapse_all_whitespace(text),
            Normalization::RemoveEmptyLines => remove_empty_lines(text),
            Normalization::ExpandTabs => expand_tabs(text, tab_size),
            Normalization::NormalizeLineEndings => normalize_line_endings(text),
            Normalization::TrimEmptyLines => trim_empty_lines(text),
            Normalization::FullClean => full_clean(text, tab_size),
        }
    }
}
