use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Single hop in a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Dotted/indexed address into the form tree, e.g. `education.0.school`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,
    #[error("field path '{0}' contains an empty segment")]
    EmptySegment(String),
}

impl FieldPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn parse(raw: &str) -> Result<Self, FieldPathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FieldPathError::Empty);
        }
        if trimmed.split('.').any(|segment| segment.trim().is_empty()) {
            return Err(FieldPathError::EmptySegment(trimmed.to_string()));
        }
        Ok(Self::from_dotted(trimmed))
    }

    /// Lenient constructor for paths known at compile time; empty segments are skipped.
    pub fn from_dotted(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(segment.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Section key addressed by the first segment, if it is a key.
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => f.write_str(key)?,
                PathSegment::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_become_indices() {
        let path = FieldPath::parse("education.0.school").expect("valid path");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("education".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("school".to_string()),
            ]
        );
        assert_eq!(path.root(), Some("education"));
        assert_eq!(path.to_string(), "education.0.school");
    }

    #[test]
    fn rejects_empty_segments() {
        assert_eq!(FieldPath::parse("  "), Err(FieldPathError::Empty));
        assert!(matches!(
            FieldPath::parse("education..school"),
            Err(FieldPathError::EmptySegment(_))
        ));
    }
}
