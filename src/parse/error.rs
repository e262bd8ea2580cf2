use std::fmt;

use thiserror::Error;

use crate::types::{CheckError, DefinitionError};

/// What went wrong at a [`SyntaxError`]'s position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxErrorKind {
    /// The text does not follow the grammar.
    #[error("{0}")]
    Grammar(String),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// One problem found in rule or pipeline source, with its 1-based position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{line}:{column}: {kind}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    /// Position `offset` bytes into `source`.
    pub(crate) fn at(source: &str, offset: usize, kind: SyntaxErrorKind) -> Self {
        let before = source.get(..offset).unwrap_or(source);
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Self {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
            kind,
        }
    }
}

/// Errors produced when parsing rule or pipeline source.
///
/// Grammar errors stop parsing at the first one; name resolution and type
/// errors are all collected.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    errors: Vec<SyntaxError>,
}

impl ParseError {
    pub(crate) fn new(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }

    /// Every error, in source order.
    #[must_use]
    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("parse error: ")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_from_offset() {
        let src = "rule \"r\"\n  when x\nthen end";
        let offset = src.find('x').unwrap();
        let err = SyntaxError::at(src, offset, SyntaxErrorKind::Grammar("boom".into()));
        assert_eq!((err.line, err.column), (2, 8));
        let first = SyntaxError::at(src, 0, SyntaxErrorKind::Grammar("boom".into()));
        assert_eq!((first.line, first.column), (1, 1));
    }

    #[test]
    fn columns_count_characters() {
        let err = SyntaxError::at("é é", 3, SyntaxErrorKind::Grammar("x".into()));
        assert_eq!(err.column, 3);
    }

    #[test]
    fn error_display() {
        let err = ParseError::new(vec![
            SyntaxError {
                line: 1,
                column: 5,
                kind: SyntaxErrorKind::Grammar("expected rule name".into()),
            },
            SyntaxError {
                line: 2,
                column: 1,
                kind: CheckError::UndeclaredFunction { name: "f".into() }.into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "parse error: 1:5: expected rule name; 2:1: unknown function 'f'"
        );
    }
}
