//! Parameter space definition
//!
//! A [`ParameterSpace`] is an ordered list of named ranges. Each name is a
//! [`ParameterKey`] that points at a placeholder inside one template file of
//! the base case, e.g. `constant__transportProperties__nu` targets the `nu`
//! placeholder in `constant/transportProperties`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParameterError;

/// Separator between the segments of an encoded parameter key
pub const KEY_SEPARATOR: &str = "__";

/// Parsed `folder__file__name` parameter key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterKey {
    /// Path segments of the template file, relative to the case root
    path: Vec<String>,
    /// Placeholder name inside the template
    name: String,
}

impl ParameterKey {
    pub fn parse(raw: &str) -> Result<Self, ParameterError> {
        let invalid = |reason| ParameterError::InvalidParameterKey {
            key: raw.to_string(),
            reason,
        };

        let mut segments: Vec<String> = raw.split(KEY_SEPARATOR).map(str::to_string).collect();
        if segments.len() < 2 {
            return Err(invalid(
                "expected at least one path segment and a name, e.g. 'folder__file__name'",
            ));
        }
        if segments.iter().any(String::is_empty) {
            return Err(invalid("empty segment"));
        }
        if segments
            .iter()
            .any(|s| s == "." || s == ".." || s.contains(['/', '\\']))
        {
            return Err(invalid("segments must be plain file or directory names"));
        }

        let name = segments.pop().unwrap_or_default();
        if !is_identifier(&name) {
            return Err(invalid(
                "placeholder name must start with a letter or '_' and contain only letters, digits or '_'",
            ));
        }

        Ok(Self {
            path: segments,
            name,
        })
    }

    /// Template file path relative to the case directory
    pub fn template_path(&self) -> PathBuf {
        self.path.iter().collect()
    }

    /// Placeholder name substituted inside the template
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.path {
            write!(f, "{segment}{KEY_SEPARATOR}")?;
        }
        write!(f, "{}", self.name)
    }
}

impl FromStr for ParameterKey {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ParameterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A named, bounded input parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRange {
    key: ParameterKey,
    min: f64,
    max: f64,
}

impl ParameterRange {
    pub fn new(name: &str, min: f64, max: f64) -> Result<Self, ParameterError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(ParameterError::InvalidRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok(Self {
            key: ParameterKey::parse(name)?,
            min,
            max,
        })
    }

    pub fn key(&self) -> &ParameterKey {
        &self.key
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Map a unit value in `[0, 1]` onto this range, clamped to the bounds
    pub fn scale(&self, unit: f64) -> f64 {
        (self.min + unit * (self.max - self.min)).clamp(self.min, self.max)
    }
}

/// Ordered collection of parameter ranges; order fixes the design-matrix columns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSpace {
    ranges: Vec<ParameterRange>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a space from `(name, min, max)` triples, keeping their order
    pub fn from_ranges<'a, I>(ranges: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (&'a str, f64, f64)>,
    {
        let mut space = Self::new();
        for (name, min, max) in ranges {
            space.push(name, min, max)?;
        }
        Ok(space)
    }

    pub fn push(&mut self, name: &str, min: f64, max: f64) -> Result<(), ParameterError> {
        let range = ParameterRange::new(name, min, max)?;
        if self.ranges.iter().any(|r| r.key == range.key) {
            return Err(ParameterError::DuplicateParameter(name.to_string()));
        }
        self.ranges.push(range);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[ParameterRange] {
        &self.ranges
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParameterKey> {
        self.ranges.iter().map(ParameterRange::key)
    }
}

impl<'de> Deserialize<'de> for ParameterSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpaceVisitor;

        impl<'de> Visitor<'de> for SpaceVisitor {
            type Value = ParameterSpace;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter keys to [min, max] pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut space = ParameterSpace::new();
                while let Some((name, [min, max])) = map.next_entry::<String, [f64; 2]>()? {
                    space.push(&name, min, max).map_err(de::Error::custom)?;
                }
                Ok(space)
            }
        }

        deserializer.deserialize_map(SpaceVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let key = ParameterKey::parse("constant__transportProperties__nu").unwrap();
        assert_eq!(key.name(), "nu");
        assert_eq!(
            key.template_path(),
            PathBuf::from("constant").join("transportProperties")
        );
        assert_eq!(key.to_string(), "constant__transportProperties__nu");
    }

    #[test]
    fn test_parse_key_top_level_file() {
        let key = ParameterKey::parse("setup__inlet_velocity").unwrap();
        assert_eq!(key.template_path(), PathBuf::from("setup"));
        assert_eq!(key.name(), "inlet_velocity");
    }

    #[test]
    fn test_invalid_keys() {
        for raw in ["nu", "", "constant____nu", "__nu", "constant__", "..__file__x"] {
            assert!(
                matches!(
                    ParameterKey::parse(raw),
                    Err(ParameterError::InvalidParameterKey { .. })
                ),
                "{raw} should be rejected"
            );
        }
        assert!(ParameterKey::parse("constant/transportProperties/nu").is_err());
        assert!(ParameterKey::parse("constant__file__1abc").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ParameterRange::new("a__b", 0.0, 1.0).is_ok());
        assert!(matches!(
            ParameterRange::new("a__b", 1.0, 1.0),
            Err(ParameterError::InvalidRange { .. })
        ));
        assert!(ParameterRange::new("a__b", 2.0, 1.0).is_err());
        assert!(ParameterRange::new("a__b", f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_scale_stays_in_bounds() {
        let range = ParameterRange::new("a__b", 0.1, 0.3).unwrap();
        assert_eq!(range.scale(0.0), 0.1);
        assert_eq!(range.scale(1.0), 0.3);
        assert!((range.scale(0.5) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_space_keeps_order_and_rejects_duplicates() {
        let mut space =
            ParameterSpace::from_ranges([("z__b", 0.0, 1.0), ("a__c", 2.0, 3.0)]).unwrap();
        let names: Vec<String> = space.keys().map(ToString::to_string).collect();
        assert_eq!(names, vec!["z__b", "a__c"]);

        assert!(matches!(
            space.push("z__b", 0.0, 5.0),
            Err(ParameterError::DuplicateParameter(_))
        ));
        assert_eq!(space.len(), 2);
    }
}
