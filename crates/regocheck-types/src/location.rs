use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a diagnostic inside a policy source file.
///
/// `row` and `col` are 1-based. `file` may be empty for sources that were parsed from memory.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Location {
    pub file: String,
    pub row: u32,
    pub col: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            row,
            col,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}:{}", self.row, self.col)
        } else {
            write!(f, "{}:{}", self.file, self.row)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_file_and_row() {
        assert_eq!(Location::new("a.rego", 3, 7).to_string(), "a.rego:3");
        assert_eq!(Location::new("", 3, 7).to_string(), "3:7");
    }
}
