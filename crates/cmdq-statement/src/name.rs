use std::fmt;

use serde::{Deserialize, Serialize};

/// Line/column of a statement within the submitted text. Both are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLocation {
    pub line: u32,
    pub column: u32,
}

impl NodeLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}", self.line, self.column)
    }
}

/// Dotted name such as `orders` or `prod.orders`. Always has at least one part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    /// Single-part name; `None` when `name` is empty.
    pub fn simple(name: impl Into<String>) -> Option<Self> {
        Self::from_parts([name.into()])
    }

    /// Builds a name from its parts; `None` when there are no parts or any part is empty.
    pub fn from_parts<I, S>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() || parts.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { parts })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Last component, e.g. `orders` for `prod.orders`.
    pub fn suffix(&self) -> &str {
        // non-empty by construction
        self.parts.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

impl TryFrom<Vec<String>> for QualifiedName {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        QualifiedName::from_parts(parts).ok_or_else(|| "qualified name must not be empty".into())
    }
}

impl From<QualifiedName> for Vec<String> {
    fn from(name: QualifiedName) -> Self {
        name.parts
    }
}
