//! Import request scanner.
//!
//! Finds outgoing references in source text without full parsing:
//! `import … from "x"`, bare `import "x"`, `import("x")` (dynamic),
//! `require("x")` and `export … from "x"` for scripts; `@import "x"`
//! and `url(x)` for stylesheets. Binary assets have no outgoing edges.
//!
//! Comments are skipped; requests are returned in first-appearance
//! order, deduplicated by (request, dynamic).

use crate::graph::ModuleKind;

/// A reference discovered in module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// The request string exactly as written.
    pub request: String,
    /// True for `import("x")` style lazy references.
    pub is_dynamic: bool,
}

/// Scan a module's source for outgoing requests, dispatching on kind.
#[must_use]
pub fn scan_module(kind: ModuleKind, source: &str) -> Vec<ImportRequest> {
    match kind {
        ModuleKind::Script => scan_script(source),
        ModuleKind::Style => scan_style(source),
        ModuleKind::Asset => Vec::new(),
    }
}

fn push_unique(results: &mut Vec<ImportRequest>, request: String, is_dynamic: bool) {
    if request.is_empty() {
        return;
    }
    // Remote and inline references are not build-time requests.
    if request.starts_with("http:") || request.starts_with("https:") || request.starts_with("data:")
    {
        return;
    }
    let candidate = ImportRequest {
        request,
        is_dynamic,
    };
    if !results.contains(&candidate) {
        results.push(candidate);
    }
}

/// True when `chars[i..]` starts with `word` at an identifier boundary.
fn matches_keyword(chars: &[char], i: usize, word: &str) -> bool {
    let w: Vec<char> = word.chars().collect();
    if i + w.len() > chars.len() || chars[i..i + w.len()] != w[..] {
        return false;
    }
    let before_ok = i == 0 || !is_ident_char(chars[i - 1]);
    let after_ok = i + w.len() == chars.len() || !is_ident_char(chars[i + w.len()]);
    before_ok && after_ok
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Read a quoted string starting at `i`; returns (contents, index past the
/// closing quote).
fn read_string(chars: &[char], i: usize) -> Option<(String, usize)> {
    let quote = *chars.get(i)?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let mut out = String::new();
    let mut j = i + 1;
    while j < chars.len() {
        if chars[j] == quote {
            return Some((out, j + 1));
        }
        if chars[j] == '\n' {
            return None; // unterminated
        }
        out.push(chars[j]);
        j += 1;
    }
    None
}

/// Advance past `//` and `/* */` comments; returns the new index when a
/// comment was skipped.
fn skip_comment(chars: &[char], i: usize) -> Option<usize> {
    if i + 1 >= chars.len() || chars[i] != '/' {
        return None;
    }
    match chars[i + 1] {
        '/' => {
            let mut j = i + 2;
            while j < chars.len() && chars[j] != '\n' {
                j += 1;
            }
            Some(j)
        }
        '*' => {
            let mut j = i + 2;
            while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            Some((j + 2).min(chars.len()))
        }
        _ => None,
    }
}

fn scan_script(source: &str) -> Vec<ImportRequest> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut results = Vec::new();
    let mut i = 0;

    while i < len {
        if let Some(j) = skip_comment(&chars, i) {
            i = j;
            continue;
        }

        // String literals outside import positions are opaque; skipping
        // them avoids false hits on e.g. "import" inside a string.
        if chars[i] == '"' || chars[i] == '\'' {
            if let Some((_, j)) = read_string(&chars, i) {
                i = j;
                continue;
            }
        }

        if matches_keyword(&chars, i, "import") {
            let after = skip_ws(&chars, i + 6);
            if after < len && chars[after] == '(' {
                // Dynamic import: import("x")
                let arg = skip_ws(&chars, after + 1);
                if let Some((spec, j)) = read_string(&chars, arg) {
                    push_unique(&mut results, spec, true);
                    i = j;
                    continue;
                }
            } else if let Some((spec, j)) = read_string(&chars, after) {
                // Bare import: import "x"
                push_unique(&mut results, spec, false);
                i = j;
                continue;
            } else if let Some((spec, j)) = find_from_clause(&chars, after) {
                // import x from "x"
                push_unique(&mut results, spec, false);
                i = j;
                continue;
            }
            i += 6;
            continue;
        }

        if matches_keyword(&chars, i, "export") {
            if let Some((spec, j)) = find_from_clause(&chars, i + 6) {
                push_unique(&mut results, spec, false);
                i = j;
                continue;
            }
            i += 6;
            continue;
        }

        if matches_keyword(&chars, i, "require") {
            let after = skip_ws(&chars, i + 7);
            if after < len && chars[after] == '(' {
                let arg = skip_ws(&chars, after + 1);
                if let Some((spec, j)) = read_string(&chars, arg) {
                    push_unique(&mut results, spec, false);
                    i = j;
                    continue;
                }
            }
            i += 7;
            continue;
        }

        i += 1;
    }

    results
}

/// Scan forward from an import/export clause for `from "x"`, stopping
/// at the first `;` or the start of another statement. Newlines are
/// ordinary whitespace here, so a wrapped `import x\n  from "y"` still
/// scans.
fn find_from_clause(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start;
    while i < chars.len() && chars[i] != ';' {
        if matches_keyword(chars, i, "from") {
            let after = skip_ws(chars, i + 4);
            return read_string(chars, after);
        }
        if i > start
            && (matches_keyword(chars, i, "import") || matches_keyword(chars, i, "export"))
        {
            return None;
        }
        if chars[i] == '{' {
            while i < chars.len() && chars[i] != '}' {
                i += 1;
            }
        }
        i += 1;
    }
    None
}

fn scan_style(source: &str) -> Vec<ImportRequest> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut results = Vec::new();
    let mut i = 0;

    while i < len {
        // CSS block comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            let mut j = i + 2;
            while j + 1 < len && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            i = (j + 2).min(len);
            continue;
        }

        if matches_keyword(&chars, i, "@import") {
            let mut after = skip_ws(&chars, i + 7);
            // @import url("x") or @import "x"
            if matches_keyword(&chars, after, "url") {
                after = skip_ws(&chars, after + 3);
                if after < len && chars[after] == '(' {
                    after = skip_ws(&chars, after + 1);
                }
            }
            if let Some((spec, j)) = read_string(&chars, after) {
                push_unique(&mut results, spec, false);
                i = j;
                continue;
            }
            i += 7;
            continue;
        }

        if matches_keyword(&chars, i, "url") {
            let open = skip_ws(&chars, i + 3);
            if open < len && chars[open] == '(' {
                let arg = skip_ws(&chars, open + 1);
                if let Some((spec, j)) = read_string(&chars, arg) {
                    push_unique(&mut results, spec, false);
                    i = j;
                    continue;
                }
                // Unquoted url(path)
                let mut j = arg;
                let mut spec = String::new();
                while j < len && chars[j] != ')' && !chars[j].is_whitespace() {
                    spec.push(chars[j]);
                    j += 1;
                }
                if !spec.starts_with('#') {
                    push_unique(&mut results, spec, false);
                }
                i = j;
                continue;
            }
            i += 3;
            continue;
        }

        i += 1;
    }

    results
}
