//! Catalog loader: finds the `set(<MARKER> ...)` list in a CMake file and returns the suite names it declares.
//!
//! The scan is a single forward pass over the text. The command name `set` is matched case-insensitively (CMake
//! commands are), the marker must be followed by whitespace or the closing parenthesis, and `#` comments are
//! dropped, both inside the list and in front of a declaration. Only the first matching declaration is used.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while locating the catalog declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CatalogError {
    #[error("no `set({marker} ...)` declaration found")]
    #[diagnostic(
        code(sanity::catalog::missing),
        help("the build configuration must declare the suite list as `set({marker} <suite> ...)`")
    )]
    MissingDeclaration { marker: String },

    #[error("`set({marker} ...)` opened on line {line} is never closed")]
    #[diagnostic(code(sanity::catalog::unterminated))]
    Unterminated { marker: String, line: usize },
}

/// Parse the suite list declared under `marker`.
///
/// Returns suite names in declaration order. An empty list is valid.
#[tracing::instrument(skip_all, fields(marker = marker, text_len = text.len()))]
pub fn parse_catalog(text: &str, marker: &str) -> Result<Vec<String>, CatalogError> {
    let body = find_declaration(text, marker)?;
    let suites: Vec<String> = body.split_whitespace().map(str::to_string).collect();
    tracing::debug!(count = suites.len(), "catalog parsed");
    Ok(suites)
}

/// Locate the declaration and return its body with comments blanked out.
fn find_declaration(text: &str, marker: &str) -> Result<String, CatalogError> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('(') {
        let open = search_from + rel;
        search_from = open + 1;

        if is_commented(text, open) || !preceded_by_set(&text[..open]) {
            continue;
        }
        let args = text[open + 1..].trim_start();
        let Some(rest) = args.strip_prefix(marker) else {
            continue;
        };
        if !rest.starts_with(|c: char| c.is_whitespace() || c == ')') {
            continue;
        }

        return collect_body(rest).ok_or_else(|| CatalogError::Unterminated {
            marker: marker.to_string(),
            line: line_of(text, open),
        });
    }

    Err(CatalogError::MissingDeclaration {
        marker: marker.to_string(),
    })
}

/// Copy everything up to the first `)` that is not inside a `#` comment.
fn collect_body(rest: &str) -> Option<String> {
    let mut body = String::new();
    let mut in_comment = false;
    for ch in rest.chars() {
        match ch {
            '\n' => {
                in_comment = false;
                body.push(ch);
            }
            _ if in_comment => {}
            '#' => in_comment = true,
            ')' => return Some(body),
            _ => body.push(ch),
        }
    }
    None
}

/// True when `head` ends with the standalone word `set` (optionally followed by whitespace).
fn preceded_by_set(head: &str) -> bool {
    let head = head.trim_end();
    let Some(split) = head.len().checked_sub(3) else {
        return false;
    };
    let (before, word) = match (head.get(..split), head.get(split..)) {
        (Some(before), Some(word)) => (before, word),
        _ => return false,
    };
    word.eq_ignore_ascii_case("set")
        && before
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
}

/// True when a `#` precedes `offset` on the same line.
fn is_commented(text: &str, offset: usize) -> bool {
    let line_start = text[..offset].rfind('\n').map_or(0, |nl| nl + 1);
    text[line_start..offset].contains('#')
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}
