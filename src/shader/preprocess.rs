//! Conditional compilation for WGSL.
//!
//! WGSL has no preprocessor, but effects toggle code paths with defines. Supported
//! directives are `#ifdef NAME`, `#ifndef NAME`, `#else` and `#endif`, each on its own
//! line. Defines with a non-empty value are also substituted wherever their name
//! appears as an identifier.

use std::collections::{BTreeMap, HashMap};

use super::lexer::rename_identifiers;

#[derive(Debug)]
struct Frame {
    parent_active: bool,
    condition: bool,
    in_else: bool,
}

impl Frame {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

/// Expands directives against `defines`.
///
/// Skipped lines and directive lines become empty lines so that line numbers in
/// diagnostics still point at the right place.
pub fn preprocess(source: &str, defines: &BTreeMap<String, String>) -> Result<String, String> {
    let substitutions: HashMap<String, String> = defines
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let mut stack: Vec<Frame> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (number, line) in source.lines().enumerate() {
        let active = stack.last().is_none_or(Frame::active);
        let trimmed = line.trim_start();

        if let Some(directive) = trimmed.strip_prefix('#') {
            let mut parts = directive.split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            let argument = parts.next();

            match (keyword, argument) {
                ("ifdef", Some(name)) | ("ifndef", Some(name)) => {
                    let defined = defines.contains_key(name);
                    stack.push(Frame {
                        parent_active: active,
                        condition: if keyword == "ifdef" { defined } else { !defined },
                        in_else: false,
                    });
                }
                ("else", None) => match stack.last_mut() {
                    Some(frame) if !frame.in_else => frame.in_else = true,
                    _ => return Err(format!("line {}: unexpected #else", number + 1)),
                },
                ("endif", None) => {
                    if stack.pop().is_none() {
                        return Err(format!("line {}: unexpected #endif", number + 1));
                    }
                }
                _ => {
                    return Err(format!(
                        "line {}: unsupported directive '{}'",
                        number + 1,
                        trimmed
                    ));
                }
            }
            out.push('\n');
            continue;
        }

        if active {
            if substitutions.is_empty() {
                out.push_str(line);
            } else {
                out.push_str(&rename_identifiers(line, &substitutions));
            }
        }
        out.push('\n');
    }

    if !stack.is_empty() {
        return Err(format!("{} unterminated #ifdef block(s)", stack.len()));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn lines(src: &str) -> Vec<&str> {
        src.lines().filter(|l| !l.trim().is_empty()).collect()
    }

    #[test]
    fn ifdef_selects_branch() {
        let src = "#ifdef FAST\nlet a = 1;\n#else\nlet a = 2;\n#endif\n";
        assert_eq!(lines(&preprocess(src, &defines(&[("FAST", "")])).unwrap()), vec!["let a = 1;"]);
        assert_eq!(lines(&preprocess(src, &defines(&[])).unwrap()), vec!["let a = 2;"]);
    }

    #[test]
    fn nested_blocks_respect_parent() {
        let src = "#ifndef A\n#ifdef B\nb\n#else\nnot_b\n#endif\n#endif\nalways\n";
        let out = preprocess(src, &defines(&[("A", ""), ("B", "")])).unwrap();
        assert_eq!(lines(&out), vec!["always"]);

        let out = preprocess(src, &defines(&[])).unwrap();
        assert_eq!(lines(&out), vec!["not_b", "always"]);
    }

    #[test]
    fn values_are_substituted_as_identifiers() {
        let src = "let n = SAMPLES + SAMPLES_X;\n";
        let out = preprocess(src, &defines(&[("SAMPLES", "8")])).unwrap();
        assert_eq!(lines(&out), vec!["let n = 8 + SAMPLES_X;"]);
    }

    #[test]
    fn line_count_is_preserved() {
        let src = "a\n#ifdef X\nb\n#endif\nc\n";
        let out = preprocess(src, &defines(&[])).unwrap();
        assert_eq!(out.lines().count(), 5);
    }

    #[test]
    fn unbalanced_directives_are_errors() {
        assert!(preprocess("#endif\n", &defines(&[])).is_err());
        assert!(preprocess("#ifdef X\n", &defines(&[])).is_err());
        assert!(preprocess("#ifdef X\n#else\n#else\n#endif\n", &defines(&[])).is_err());
        assert!(preprocess("#include foo\n", &defines(&[])).is_err());
    }
}
