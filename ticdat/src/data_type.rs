use crate::error::{verify, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which strings a field accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringsAllowed {
    /// Written as `"*"` in schema files.
    Any(AnyString),
    Only(BTreeSet<String>),
}

/// Marker for the `"*"` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyString;

impl Serialize for AnyString {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str("*")
    }
}

impl<'de> Deserialize<'de> for AnyString {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == "*" {
            Ok(AnyString)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list of strings, got '{s}'"
            )))
        }
    }
}

impl StringsAllowed {
    pub fn any() -> Self {
        StringsAllowed::Any(AnyString)
    }

    pub fn none() -> Self {
        StringsAllowed::Only(BTreeSet::new())
    }

    pub fn only<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StringsAllowed::Only(strings.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, s: &str) -> bool {
        match self {
            StringsAllowed::Any(_) => true,
            StringsAllowed::Only(set) => set.contains(s),
        }
    }
}

impl Default for StringsAllowed {
    fn default() -> Self {
        StringsAllowed::none()
    }
}

/// The validity rule for one data field.
///
/// Assigning a rule never blocks data entry; it only drives
/// `find_data_type_failures` and `replace_data_type_failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataType {
    pub number_allowed: bool,
    pub min: f64,
    pub max: f64,
    pub inclusive_min: bool,
    pub inclusive_max: bool,
    pub must_be_int: bool,
    pub strings_allowed: StringsAllowed,
    pub nullable: bool,
}

impl Default for DataType {
    /// Non-negative numbers (min inclusive, unbounded above), no strings, no null.
    fn default() -> Self {
        DataType {
            number_allowed: true,
            min: 0.0,
            max: f64::INFINITY,
            inclusive_min: true,
            inclusive_max: false,
            must_be_int: false,
            strings_allowed: StringsAllowed::none(),
            nullable: false,
        }
    }
}

impl DataType {
    /// A rule that accepts no numbers; combine with `strings` / `nullable`.
    pub fn non_numeric() -> Self {
        DataType {
            number_allowed: false,
            ..DataType::default()
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = max;
        self
    }

    pub fn inclusive_min(mut self, inclusive: bool) -> Self {
        self.inclusive_min = inclusive;
        self
    }

    pub fn inclusive_max(mut self, inclusive: bool) -> Self {
        self.inclusive_max = inclusive;
        self
    }

    pub fn must_be_int(mut self, must_be_int: bool) -> Self {
        self.must_be_int = must_be_int;
        self
    }

    pub fn number_allowed(mut self, allowed: bool) -> Self {
        self.number_allowed = allowed;
        self
    }

    pub fn strings(mut self, strings_allowed: StringsAllowed) -> Self {
        self.strings_allowed = strings_allowed;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Check the numeric bounds and normalize a rule that forbids numbers.
    pub(crate) fn checked(self) -> Result<Self> {
        if !self.number_allowed {
            return Ok(DataType {
                min: 0.0,
                max: f64::INFINITY,
                inclusive_min: true,
                inclusive_max: true,
                must_be_int: false,
                ..self
            });
        }
        verify(!self.min.is_nan(), || "min should be numeric".to_string())?;
        verify(!self.max.is_nan(), || "max should be numeric".to_string())?;
        verify(self.max >= self.min, || {
            "max cannot be smaller than min".to_string()
        })?;
        Ok(self)
    }

    pub fn valid(&self, value: &Value) -> bool {
        match value {
            Value::Number(n) => {
                if !self.number_allowed || n.is_nan() {
                    return false;
                }
                if *n < self.min || *n > self.max {
                    return false;
                }
                if !self.inclusive_min && *n == self.min {
                    return false;
                }
                if !self.inclusive_max && *n == self.max {
                    return false;
                }
                !(self.must_be_int && n.fract() != 0.0)
            }
            Value::Text(s) => self.strings_allowed.allows(s),
            Value::Null => self.nullable,
            Value::Bool(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_accepts_non_negative_numbers() {
        let rule = DataType::default();
        assert!(rule.valid(&Value::from(0)));
        assert!(rule.valid(&Value::from(1e12)));
        assert!(!rule.valid(&Value::from(-5)));
        assert!(!rule.valid(&Value::Null));
        assert!(!rule.valid(&Value::from("x")));
        assert!(!rule.valid(&Value::from(true)));
    }

    #[test]
    fn test_exclusive_bounds_and_integrality() {
        let rule = DataType::default()
            .min(5.0)
            .inclusive_min(false)
            .max(12.0)
            .inclusive_max(true)
            .must_be_int(true);
        assert!(!rule.valid(&Value::from(5)));
        assert!(rule.valid(&Value::from(6)));
        assert!(rule.valid(&Value::from(12)));
        assert!(!rule.valid(&Value::from(12.5)));
        assert!(!rule.valid(&Value::from(5.5)));
    }

    #[test]
    fn test_nan_is_never_valid() {
        let open = DataType::default().min(f64::NEG_INFINITY).max(f64::INFINITY).inclusive_max(true);
        assert!(!open.must_be_int);
        assert!(open.valid(&Value::Number(f64::INFINITY)));
        assert!(!open.valid(&Value::Number(f64::NAN)));
        assert!(!DataType::default().valid(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_strings_and_null() {
        let rule = DataType::non_numeric()
            .strings(StringsAllowed::only(["Boston", "Seattle"]))
            .nullable(true);
        assert!(rule.valid(&Value::from("Boston")));
        assert!(!rule.valid(&Value::from("New York")));
        assert!(rule.valid(&Value::Null));
        assert!(!rule.valid(&Value::from(3)));

        let anything = DataType::non_numeric().strings(StringsAllowed::any());
        assert!(anything.valid(&Value::from("whatever")));
    }

    #[test]
    fn test_checked_rejects_inverted_bounds() {
        assert!(DataType::default().min(3.0).max(1.0).checked().is_err());
        let normalized = DataType::non_numeric().min(3.0).max(1.0).checked().unwrap();
        assert_eq!(normalized.min, 0.0);
        assert!(normalized.max.is_infinite());
    }

    #[test]
    fn test_yaml_strings_allowed_forms() {
        let rule: DataType = serde_yaml::from_str("strings_allowed: '*'\nnumber_allowed: false").unwrap();
        assert_eq!(rule.strings_allowed, StringsAllowed::any());
        let rule: DataType = serde_yaml::from_str("strings_allowed: [a, b]\nmin: 1").unwrap();
        assert_eq!(rule.strings_allowed, StringsAllowed::only(["a", "b"]));
        assert_eq!(rule.min, 1.0);
        assert!(rule.number_allowed);
    }
}
