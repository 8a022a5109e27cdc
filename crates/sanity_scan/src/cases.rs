//! gtest case extraction from suite sources.
//!
//! Declarations are recognised one line at a time: after trimming leading whitespace, a line whose leading
//! identifier starts with the declaration token (`TEST`, so `TEST_F` and `TEST_P` as well) must carry
//! `(<group>, <name>)` on that same line. Declarations split across lines are rejected with
//! [`DeclarationError::MultiLine`] rather than skipped, so a case can never silently drop out of a run.

use miette::Diagnostic;
use thiserror::Error;

/// Tokens that drive case discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    /// Prefix of the declaration macro name.
    pub declaration_token: String,
    /// Prefix that disables a group or a case.
    pub disabled_marker: String,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            declaration_token: "TEST".to_string(),
            disabled_marker: "DISABLED".to_string(),
        }
    }
}

impl ScanRules {
    pub fn with_declaration_token(mut self, token: impl Into<String>) -> Self {
        self.declaration_token = token.into();
        self
    }

    pub fn with_disabled_marker(mut self, marker: impl Into<String>) -> Self {
        self.disabled_marker = marker.into();
        self
    }

    fn is_disabled(&self, token: &str) -> bool {
        token.starts_with(&self.disabled_marker)
    }
}

/// A malformed declaration line. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DeclarationError {
    #[error("line {line}: test declaration has no argument list: `{text}`")]
    #[diagnostic(code(sanity::cases::missing_parens))]
    MissingParens { line: usize, text: String },

    #[error("line {line}: test declaration continues past the end of the line: `{text}`")]
    #[diagnostic(
        code(sanity::cases::multi_line),
        help("write the declaration as `TEST(Group, Name)` on a single line")
    )]
    MultiLine { line: usize, text: String },

    #[error("line {line}: expected `(group, name)`, found {found} argument(s): `{text}`")]
    #[diagnostic(code(sanity::cases::arity))]
    WrongArity { line: usize, found: usize, text: String },

    #[error("line {line}: empty group or case name: `{text}`")]
    #[diagnostic(code(sanity::cases::empty_token))]
    EmptyToken { line: usize, text: String },
}

/// Cases of one group, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseGroup {
    pub name: String,
    pub cases: Vec<String>,
}

/// Enabled cases of one suite, grouped by group name in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseCatalog {
    groups: Vec<CaseGroup>,
}

impl CaseCatalog {
    pub fn groups(&self) -> &[CaseGroup] {
        &self.groups
    }

    /// Number of enabled cases across all groups.
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.cases.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// `(group, name)` pairs in run order: groups by first appearance, names sorted within each group.
    pub fn run_order(&self) -> Vec<(&str, &str)> {
        let mut order = Vec::with_capacity(self.total());
        for group in &self.groups {
            let mut names: Vec<&str> = group.cases.iter().map(String::as_str).collect();
            names.sort_unstable();
            order.extend(names.into_iter().map(|name| (group.name.as_str(), name)));
        }
        order
    }

    fn push(&mut self, group: &str, name: &str) {
        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(existing) => existing.cases.push(name.to_string()),
            None => self.groups.push(CaseGroup {
                name: group.to_string(),
                cases: vec![name.to_string()],
            }),
        }
    }
}

/// Extract every enabled `(group, name)` declaration from a suite source.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn extract_cases(source: &str, rules: &ScanRules) -> Result<CaseCatalog, DeclarationError> {
    let mut catalog = CaseCatalog::default();
    let mut disabled = 0usize;

    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim_start();
        if !is_declaration(line, &rules.declaration_token) {
            continue;
        }
        let (group, name) = split_declaration(line, idx + 1)?;
        if rules.is_disabled(&group) || rules.is_disabled(&name) {
            disabled += 1;
            continue;
        }
        catalog.push(&group, &name);
    }

    tracing::debug!(cases = catalog.total(), disabled, "cases extracted");
    Ok(catalog)
}

fn is_declaration(line: &str, token: &str) -> bool {
    let ident_len = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    line[..ident_len].starts_with(token)
}

fn split_declaration(line: &str, line_no: usize) -> Result<(String, String), DeclarationError> {
    let text = || line.trim_end().to_string();
    let open = line.find('(');
    let close = line.find(')');
    let (open, close) = match (open, close) {
        (Some(open), Some(close)) if open < close => (open, close),
        (Some(_), None) => return Err(DeclarationError::MultiLine { line: line_no, text: text() }),
        _ => return Err(DeclarationError::MissingParens { line: line_no, text: text() }),
    };

    let inner: String = line[open + 1..close].chars().filter(|c| !c.is_whitespace()).collect();
    let parts: Vec<&str> = inner.split(',').collect();
    let [group, name] = parts.as_slice() else {
        return Err(DeclarationError::WrongArity {
            line: line_no,
            found: parts.len(),
            text: text(),
        });
    };
    if group.is_empty() || name.is_empty() {
        return Err(DeclarationError::EmptyToken { line: line_no, text: text() });
    }
    Ok((group.to_string(), name.to_string()))
}
