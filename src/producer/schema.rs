//! Attribute schema hints handed to the storage layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Storage column kind for one attribute. Booleans are stored as `Integer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Blob,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Blob => "blob",
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "integer" | "boolean" => Ok(Self::Integer),
            "real" => Ok(Self::Real),
            "blob" => Ok(Self::Blob),
            _ => Err(format!("unknown column kind: {s}")),
        }
    }
}

/// Attribute name to column kind, in sorted order.
pub type Schema = BTreeMap<String, ColumnKind>;

/// Build a [`Schema`] from a static column list.
pub fn schema_of(columns: &[(&str, ColumnKind)]) -> Schema {
    columns
        .iter()
        .map(|(name, kind)| (name.to_string(), *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_column_kinds() {
        assert_eq!("text".parse::<ColumnKind>().unwrap(), ColumnKind::Text);
        assert_eq!("boolean".parse::<ColumnKind>().unwrap(), ColumnKind::Integer);
        assert!("varchar".parse::<ColumnKind>().is_err());
    }

    #[test]
    fn schema_is_sorted() {
        let schema = schema_of(&[("url", ColumnKind::Text), ("count", ColumnKind::Integer)]);
        let names: Vec<&str> = schema.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["count", "url"]);
    }
}
