//! Diagnostics produced by the parser and the compiler.

use regocheck_types::{Location, ids};
use std::fmt;

/// Source excerpt attached to parse errors: the offending line and a caret column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetails {
    pub line: String,
    /// 0-based byte index of the caret within `line`.
    pub idx: usize,
}

impl ErrorDetails {
    pub fn lines(&self) -> Vec<String> {
        vec![self.line.clone(), format!("{}^", " ".repeat(self.idx))]
    }
}

/// A single structured diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub code: &'static str,
    pub message: String,
    pub location: Option<Location>,
    pub details: Option<ErrorDetails>,
}

impl Error {
    pub fn new(code: &'static str, location: Option<Location>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location,
            details: None,
        }
    }

    pub fn parse(location: Location, message: impl Into<String>) -> Self {
        Self::new(ids::CODE_PARSE_ERROR, Some(location), message)
    }

    pub fn compile(location: &Location, message: impl Into<String>) -> Self {
        Self::new(ids::CODE_COMPILE_ERROR, Some(location.clone()), message)
    }

    pub fn type_error(location: &Location, message: impl Into<String>) -> Self {
        Self::new(ids::CODE_TYPE_ERROR, Some(location.clone()), message)
    }

    pub fn unsafe_var(location: &Location, var: &str) -> Self {
        Self::new(
            ids::CODE_UNSAFE_VAR_ERROR,
            Some(location.clone()),
            format!("var {var} is unsafe"),
        )
    }

    pub fn recursion(location: &Location, message: impl Into<String>) -> Self {
        Self::new(ids::CODE_RECURSION_ERROR, Some(location.clone()), message)
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{loc}: ")?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            for line in details.lines() {
                write!(f, "\n\t{line}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Ordered diagnostics. `limit_reached` records that more errors were dropped by the error limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Errors {
    errors: Vec<Error>,
    limit_reached: bool,
}

impl Errors {
    pub fn new(errors: Vec<Error>, limit_reached: bool) -> Self {
        Self {
            errors,
            limit_reached,
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<Error> {
        self.errors
    }
}

impl From<Error> for Errors {
    fn from(value: Error) -> Self {
        Errors::new(vec![value], false)
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no error(s)")?,
            [only] => write!(f, "1 error occurred: {only}")?,
            many => {
                write!(f, "{} errors occurred:", many.len())?;
                for err in many {
                    write!(f, "\n{err}")?;
                }
            }
        }
        if self.limit_reached {
            f.write_str("\nerror limit reached")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// Collects errors up to a limit (0 = unlimited) and records when that limit cut the list short.
#[derive(Debug)]
pub(crate) struct ErrorSink {
    errors: Vec<Error>,
    limit: usize,
    limit_reached: bool,
}

impl ErrorSink {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            errors: Vec::new(),
            limit,
            limit_reached: false,
        }
    }

    pub(crate) fn push(&mut self, err: Error) {
        if self.limit > 0 && self.errors.len() >= self.limit {
            self.limit_reached = true;
            return;
        }
        self.errors.push(err);
    }

    /// True once an error has been dropped; stages stop doing work at this point.
    pub(crate) fn halted(&self) -> bool {
        self.limit_reached
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn finish(self) -> Errors {
        Errors::new(self.errors, self.limit_reached)
    }
}
