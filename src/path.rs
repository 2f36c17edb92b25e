//! Field path encoding shared by schemas and comparison results.
//!
//! Paths use dot notation for object keys and brackets for list positions,
//! e.g. `Transactions[2].Amount`. Keys that themselves contain `.`, `[`, `]`
//! or `\` are backslash-escaped so that [`parse_path`] recovers the exact
//! segments [`join_key`] and [`join_index`] produced.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(&escape_key(key)),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

pub fn join_key(parent: &str, key: &str) -> String {
    let escaped = escape_key(key);
    if parent.is_empty() {
        escaped
    } else {
        format!("{parent}.{escaped}")
    }
}

pub fn join_index(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Schema paths mark list item schemas with an empty index: `Lines[]`.
pub fn join_items(parent: &str) -> String {
    format!("{parent}[]")
}

pub fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(key) => out = join_key(&out, key),
            PathSegment::Index(index) => out = join_index(&out, *index),
        }
    }
    out
}

pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::<PathSegment>::new();
    let mut key = String::new();
    let mut key_open = false;
    let mut chars = path.chars().peekable();

    while let Some(character) = chars.next() {
        match character {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| format!("dangling escape at end of path `{path}`"))?;
                key.push(escaped);
                key_open = true;
            }
            '.' => {
                if key_open {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    key_open = false;
                } else if !matches!(segments.last(), Some(PathSegment::Index(_))) {
                    return Err(format!("empty key segment in path `{path}`"));
                }
            }
            '[' => {
                if key_open {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    key_open = false;
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(digit) if digit.is_ascii_digit() => digits.push(digit),
                        Some(other) => {
                            return Err(format!("unexpected `{other}` inside index in `{path}`"));
                        }
                        None => return Err(format!("unterminated index in path `{path}`")),
                    }
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| format!("invalid index `{digits}` in path `{path}`"))?;
                segments.push(PathSegment::Index(index));
            }
            ']' => return Err(format!("unbalanced `]` in path `{path}`")),
            other => {
                key.push(other);
                key_open = true;
            }
        }
    }

    if key_open {
        segments.push(PathSegment::Key(key));
    }
    Ok(segments)
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for character in key.chars() {
        if matches!(character, '.' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(character);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{PathSegment, join_index, join_key, parse_path, render_path};
    use proptest::prelude::*;

    #[test]
    fn parses_nested_list_paths() {
        let path = join_key(&join_index(&join_key("", "Transactions"), 2), "Amount");
        assert_eq!(path, "Transactions[2].Amount");
        assert_eq!(
            parse_path(&path).expect("path should parse"),
            vec![
                PathSegment::Key("Transactions".to_string()),
                PathSegment::Index(2),
                PathSegment::Key("Amount".to_string()),
            ]
        );
    }

    #[test]
    fn keys_with_separators_survive_round_trip() {
        let path = join_key(&join_key("", "Address.Line[1]"), "Zip\\Code");
        assert_eq!(path, "Address\\.Line\\[1\\].Zip\\\\Code");
        let segments = parse_path(&path).expect("escaped path should parse");
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("Address.Line[1]".to_string()),
                PathSegment::Key("Zip\\Code".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(parse_path("Lines[2").is_err());
        assert!(parse_path("Lines[x]").is_err());
        assert!(parse_path("a..b").is_err());
    }

    fn segment_strategy() -> impl Strategy<Value = PathSegment> {
        prop_oneof![
            "[A-Za-z0-9_.\\[\\]\\\\ ]{1,8}".prop_map(PathSegment::Key),
            (0_usize..50).prop_map(PathSegment::Index),
        ]
    }

    proptest! {
        #[test]
        fn render_then_parse_is_lossless(
            first in "[A-Za-z0-9_.\\[\\]\\\\ ]{1,8}",
            rest in proptest::collection::vec(segment_strategy(), 0..6),
        ) {
            let mut segments = vec![PathSegment::Key(first)];
            segments.extend(rest);
            let rendered = render_path(&segments);
            prop_assert_eq!(parse_path(&rendered).expect("rendered path should parse"), segments);
        }
    }
}
