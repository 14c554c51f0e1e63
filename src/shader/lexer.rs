//! Just enough WGSL lexing to rename identifiers and find top-level declarations.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    Comment,
    Whitespace,
    Punct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl Token<'_> {
    fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Comment | TokenKind::Whitespace)
    }
}

/// Splits `source` into tokens. Concatenating every token's text gives back `source`.
pub(crate) fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        let kind = if c == b'/' && next == Some(b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            TokenKind::Comment
        } else if c == b'/' && next == Some(b'*') {
            // Block comments nest in WGSL.
            let mut depth = 0usize;
            while i < bytes.len() {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    depth += 1;
                    i += 2;
                } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        break;
                    }
                } else {
                    i += 1;
                }
            }
            TokenKind::Comment
        } else if c.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if c.is_ascii_digit() || (c == b'.' && next.is_some_and(|n| n.is_ascii_digit())) {
            i += 1;
            while i < bytes.len() {
                let b = bytes[i];
                let exponent_sign = (b == b'+' || b == b'-')
                    && matches!(bytes[i - 1], b'e' | b'E' | b'p' | b'P')
                    && !is_hex_literal(&source[start..i]);
                if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            TokenKind::Number
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            TokenKind::Ident
        } else {
            // Single character, respecting UTF-8 boundaries.
            let len = source[i..].chars().next().map_or(1, char::len_utf8);
            i += len;
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            text: &source[start..i],
        });
    }

    tokens
}

fn is_hex_literal(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    // `0x1p-3` has a signed exponent, `0x1e` does not.
    lower.starts_with("0x") && !lower.contains('p')
}

/// A `{}` block seen by [`rename_identifiers`].
#[derive(Default)]
struct Scope<'a> {
    locals: Vec<&'a str>,
    is_struct: bool,
}

/// Where the renamer is inside a `fn` or `struct` header.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Header {
    None,
    Function,
    /// Inside the parameter list, at this paren depth.
    Params(u32),
    Body,
    Struct,
}

/// Progress through a `let`/`var`/`const` inside a block.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Binding {
    None,
    Name,
    /// Inside `var<...>`.
    Template,
}

/// Replaces identifiers found in `renames`.
///
/// Comments and numbers are left alone, and so are member accesses (`foo.name`),
/// attribute names (`@name`) and struct members. Function parameters and block-level
/// `let`/`var`/`const` bindings shadow a rename for the rest of their scope.
pub(crate) fn rename_identifiers(source: &str, renames: &HashMap<String, String>) -> String {
    let tokens = tokenize(source);
    let mut out = String::with_capacity(source.len() + source.len() / 4);
    let mut previous: Option<&str> = None;
    let mut scopes: Vec<Scope<'_>> = Vec::new();
    let mut header = Header::None;
    let mut binding = Binding::None;
    let mut params: Vec<&str> = Vec::new();
    // A local is visible after its declaration ends, not in its own initializer.
    let mut pending: Vec<&str> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.is_trivia() {
            out.push_str(token.text);
            continue;
        }
        let next = tokens[i + 1..].iter().find(|t| !t.is_trivia()).map(|t| t.text);

        match token.kind {
            TokenKind::Ident => {
                let qualified = matches!(previous, Some(".") | Some("@"));
                let mut declaration = false;
                if !qualified && next == Some(":") {
                    let in_struct = scopes.last().is_some_and(|s| s.is_struct);
                    if header == Header::Params(1) {
                        params.push(token.text);
                        declaration = true;
                    } else if in_struct {
                        declaration = true;
                    }
                }
                if binding == Binding::Name && !qualified {
                    pending.push(token.text);
                    binding = Binding::None;
                    declaration = true;
                }

                let shadowed = scopes.iter().any(|s| s.locals.contains(&token.text));
                match renames.get(token.text) {
                    Some(replacement) if !qualified && !declaration && !shadowed => {
                        out.push_str(replacement)
                    }
                    _ => out.push_str(token.text),
                }

                match token.text {
                    "fn" if scopes.is_empty() => header = Header::Function,
                    "struct" if scopes.is_empty() => header = Header::Struct,
                    "let" | "var" | "const" if !scopes.is_empty() => binding = Binding::Name,
                    _ => {}
                }
            }
            _ => {
                out.push_str(token.text);
                match (token.text, header) {
                    ("(", Header::Function) => header = Header::Params(1),
                    ("(", Header::Params(n)) => header = Header::Params(n + 1),
                    (")", Header::Params(1)) => header = Header::Body,
                    (")", Header::Params(n)) => header = Header::Params(n - 1),
                    ("{", _) => {
                        let locals = if header == Header::Body {
                            std::mem::take(&mut params)
                        } else {
                            Vec::new()
                        };
                        scopes.push(Scope {
                            locals,
                            is_struct: header == Header::Struct,
                        });
                        header = Header::None;
                    }
                    ("}", _) => {
                        scopes.pop();
                    }
                    (";", _) => {
                        if let Some(scope) = scopes.last_mut() {
                            scope.locals.append(&mut pending);
                        }
                        binding = Binding::None;
                    }
                    ("<", _) if binding == Binding::Name => binding = Binding::Template,
                    (">", _) if binding == Binding::Template => binding = Binding::Name,
                    _ => {}
                }
            }
        }

        previous = Some(token.text);
    }

    out
}

/// Names introduced at brace depth zero by `fn`, `struct`, `const`, `override`, `var`
/// and `alias`.
pub(crate) fn top_level_declarations(source: &str) -> Vec<String> {
    let tokens: Vec<_> = tokenize(source)
        .into_iter()
        .filter(|t| !t.is_trivia())
        .collect();

    let mut names = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];
        match token.text {
            "{" => depth += 1,
            "}" => depth -= 1,
            "fn" | "struct" | "const" | "override" | "var" | "alias" if depth == 0 => {
                let mut j = i + 1;
                // var<private>, var<uniform>
                if tokens.get(j).is_some_and(|t| t.text == "<") {
                    while j < tokens.len() && tokens[j].text != ">" {
                        j += 1;
                    }
                    j += 1;
                }
                if let Some(name) = tokens.get(j).filter(|t| t.kind == TokenKind::Ident) {
                    if !names.iter().any(|n| n == name.text) {
                        names.push(name.text.to_string());
                    }
                }
                i = j;
            }
            _ => {}
        }
        i += 1;
    }

    names
}

/// Whether `source` mentions `name` as an identifier outside comments.
pub(crate) fn references_identifier(source: &str, name: &str) -> bool {
    tokenize(source)
        .iter()
        .any(|t| t.kind == TokenKind::Ident && t.text == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renames(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn tokens_round_trip_source() {
        let src = "fn f(x: f32) -> f32 { /* a /* nested */ b */ return x * 1.0e-3; } // end\n";
        let joined: String = tokenize(src).iter().map(|t| t.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn rename_skips_members_comments_and_attributes() {
        let src = "let a = intensity * color.intensity; // intensity\n@group(0) var group: f32;";
        let out = rename_identifiers(
            src,
            &renames(&[("intensity", "params.e0_intensity"), ("group", "e0_group")]),
        );
        assert_eq!(
            out,
            "let a = params.e0_intensity * color.intensity; // intensity\n@group(0) var e0_group: f32;"
        );
    }

    #[test]
    fn parameters_and_locals_shadow_renames() {
        let src = "fn boost(strength: f32) -> f32 { return strength * 2.0; }\nfn f() -> f32 { let k = strength; { var<function> strength = k; k = strength; } return strength; }";
        let out = rename_identifiers(
            src,
            &renames(&[("strength", "params.e0_strength"), ("boost", "e0_boost")]),
        );
        assert_eq!(
            out,
            "fn e0_boost(strength: f32) -> f32 { return strength * 2.0; }\nfn f() -> f32 { let k = params.e0_strength; { var<function> strength = k; k = strength; } return params.e0_strength; }"
        );
    }

    #[test]
    fn local_initializer_sees_the_outer_name() {
        let out = rename_identifiers(
            "fn f() -> f32 { let gain = gain * 2.0; return gain; }",
            &renames(&[("gain", "params.e1_gain")]),
        );
        assert_eq!(out, "fn f() -> f32 { let gain = params.e1_gain * 2.0; return gain; }");
    }

    #[test]
    fn struct_members_keep_their_names() {
        let out = rename_identifiers(
            "struct Weights {\n    @align(16) strength: f32,\n    tint: Tint,\n}",
            &renames(&[("strength", "params.e0_strength"), ("Weights", "e0_Weights"), ("Tint", "e0_Tint")]),
        );
        assert_eq!(out, "struct e0_Weights {\n    @align(16) strength: f32,\n    tint: e0_Tint,\n}");
    }

    #[test]
    fn rename_matches_whole_identifiers_only() {
        let out = rename_identifiers("tint tinted _tint", &renames(&[("tint", "e1_tint")]));
        assert_eq!(out, "e1_tint tinted _tint");
    }

    #[test]
    fn numbers_with_exponents_are_one_token() {
        let tokens = tokenize("1e-6 0x1p-3 0x1e-2");
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text)
            .collect();
        assert_eq!(numbers, vec!["1e-6", "0x1p-3", "0x1e", "2"]);
    }

    #[test]
    fn finds_top_level_declarations() {
        let src = r#"
const STRENGTH: f32 = 2.0;
var<private> scratch: vec4f;
struct Sample { value: f32 }
fn helper(x: f32) -> f32 {
    const inner = 1.0;
    var local = x;
    return local * inner;
}
fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    return input_color;
}
"#;
        assert_eq!(
            top_level_declarations(src),
            vec!["STRENGTH", "scratch", "Sample", "helper", "main_image"]
        );
    }

    #[test]
    fn references_ignore_comments() {
        assert!(references_identifier("x = main_uv(uv);", "main_uv"));
        assert!(!references_identifier("// main_uv", "main_uv"));
    }
}
