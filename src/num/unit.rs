use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreResult, UnitError};

/// A unit string, e.g. `""`, `kg`, `mt`, `units`, `kwh`, `%`,
/// `kgCO2e / kg`, `tCO2e`, `kg / unit`, `% / year`, `kwh / unit`.
///
/// A ratio unit has a numerator and denominator separated by `/`. Equality
/// and lookups always go through the normalized form: interior whitespace
/// stripped, and the word `each` rewritten to `/` (`Design Notes`: "Dynamic
/// unit strings... compare normalized form").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit(String);

impl Unit {
    pub const EMPTY: &'static str = "";
    pub const PERCENT: &'static str = "%";

    pub fn new(raw: impl Into<String>) -> CoreResult<Self> {
        let raw = raw.into();
        let normalized = Self::normalize(&raw);
        if normalized.matches('/').count() > 1 {
            return Err(UnitError::Malformed(raw).into());
        }
        Ok(Self(normalized))
    }

    /// Construct without validation; used for compile-time-known literals.
    pub fn literal(raw: &str) -> Self {
        Self(Self::normalize(raw))
    }

    fn normalize(raw: &str) -> String {
        let no_ws: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        no_ws.replace("each", "/")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_percent(&self) -> bool {
        self.0 == Self::PERCENT
    }

    pub fn is_ratio(&self) -> bool {
        self.0.contains('/')
    }

    /// Splits a ratio unit into `(numerator, denominator)`. Non-ratio units
    /// have an implicit denominator of `""`.
    pub fn parts(&self) -> (&str, &str) {
        match self.0.split_once('/') {
            Some((num, den)) => (num, den),
            None => (&self.0, ""),
        }
    }

    pub fn numerator(&self) -> &str {
        self.parts().0
    }

    pub fn denominator(&self) -> &str {
        self.parts().1
    }

    /// The per-unit check used throughout the engine: "denominator ∈
    /// {unit, units} ⇒ per-unit" (`spec.md` §4.1).
    pub fn is_per_unit(&self) -> bool {
        matches!(self.denominator(), "unit" | "units")
    }

    pub fn is_mass(&self) -> bool {
        matches!(self.0.as_str(), "kg" | "mt")
    }

    pub fn is_population(&self) -> bool {
        matches!(self.0.as_str(), "unit" | "units")
    }

    pub fn is_volume_count(&self) -> bool {
        self.is_mass() || self.is_population()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Unit {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for Unit {
    fn from(value: String) -> Self {
        Self(Self::normalize(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_each() {
        let a = Unit::literal("kg / unit");
        assert_eq!(a.as_str(), "kg/unit");
        assert!(a.is_ratio());
        assert!(a.is_per_unit());
    }

    #[test]
    fn each_rewrites_to_slash() {
        let u = Unit::literal("kgCO2eeachkg");
        assert_eq!(u.as_str(), "kgCO2e/kg");
    }

    #[test]
    fn percent_is_a_unit() {
        let u = Unit::literal("%");
        assert!(u.is_percent());
        assert!(!u.is_ratio());
    }

    #[test]
    fn rejects_double_ratio() {
        assert!(Unit::new("kg/unit/year").is_err());
    }
}
