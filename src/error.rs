use std::io;

use thiserror::Error;

/// Errors when parsing a single rewrite directive or any of its parts.
///
/// Everything except [`ParseError::NotImplemented`] is a syntax error in
/// the directive text itself.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Dangling escape character at end of input: {0:?}")]
    DanglingEscape(String),

    #[error("Unexpected end of expression: {0:?}")]
    UnexpectedEnd(String),

    #[error("Unexpected character {found:?} at index {index} in {input:?}")]
    UnexpectedChar {
        input: String,
        index: usize,
        found: char,
    },

    #[error("Missing close brace in {0:?}")]
    MissingCloseBrace(String),

    #[error("Back-reference is not a single digit in {0:?}")]
    InvalidBackReference(String),

    #[error("Unrecognized server variable {0:?}")]
    UnknownServerVariable(String),

    #[error("Expected an integer but found {0:?}")]
    InvalidInteger(String),

    #[error("Operation {operation} is not valid for a {kind} condition")]
    InvalidOperation { kind: String, operation: String },

    #[error("Invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Flag definitions missing brackets: {0:?}")]
    FlagsMissingBrackets(String),

    #[error("Flag definitions are empty")]
    FlagsEmpty,

    #[error("Unrecognized flag {0:?}")]
    UnknownFlag(String),

    #[error("Invalid status code in redirect flag {0:?}")]
    InvalidStatus(String),

    #[error("Invalid cookie flag {0:?}")]
    InvalidCookie(String),

    #[error("Invalid env flag {0:?}")]
    InvalidEnv(String),

    #[error("{directive} expects {expected} arguments but found {found}")]
    WrongArgumentCount {
        directive: String,
        expected: &'static str,
        found: usize,
    },

    #[error("Too many tokens on line ({0})")]
    TooManyTokens(usize),

    #[error("Unrecognized directive {0:?}")]
    UnknownDirective(String),

    #[error("Not implemented: {0}")]
    NotImplemented(#[from] Unsupported),
}

impl ParseError {
    /// Returns true if the error was caused by a recognized but
    /// unsupported feature rather than a malformed directive.
    #[inline]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

/// `mod_rewrite` features that are recognized but deliberately not
/// supported by this engine.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Unsupported {
    #[error("segmented server variable lookups ({0})")]
    SegmentedLookup(String),

    #[error("server variable {0} is not available outside of httpd")]
    ServerVariable(String),

    #[error("symbolic link property tests")]
    SymbolicLink,

    #[error("existing url property tests require a sub-request")]
    ExistingUrl,

    #[error("RewriteBase directive")]
    RewriteBase,

    #[error("RewriteMap directive")]
    RewriteMap,

    #[error("proxy flag")]
    Proxy,
}

/// Errors when loading a complete rule file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Error parsing rewrite rules at line {line}")]
    Line {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("Failed to read rewrite rules")]
    Io(#[from] io::Error),
}

impl LoadError {
    /// Line number (1-based) the error was raised on, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Line { line, .. } => Some(*line),
            Self::Io(_) => None,
        }
    }

    /// Underlying directive error, if any.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::Line { source, .. } => Some(source),
            Self::Io(_) => None,
        }
    }

    /// See [`ParseError::is_unsupported`].
    #[inline]
    pub fn is_unsupported(&self) -> bool {
        self.parse_error().is_some_and(ParseError::is_unsupported)
    }
}
