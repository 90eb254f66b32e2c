//! Normalised numeric value for weight and increment fields.
//!
//! Every JSON number, integer or float, becomes an `f64` at the
//! deserialisation boundary. Integral values serialise back as JSON
//! integers so stored documents keep the shape callers sent.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Largest magnitude at which every integer is exactly representable.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A JSON number normalised to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Numeric(pub f64);

impl Numeric {
    /// Reads a JSON number. Strings, booleans and null yield `None`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        value.as_f64().map(Self)
    }

    /// The underlying value.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Integral value if it can be written as a JSON integer without loss.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_exact_integer(self) -> Option<i64> {
        let x = self.0;
        (x.is_finite() && x.fract() == 0.0 && x.abs() <= MAX_EXACT_INTEGER).then(|| x as i64)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_exact_integer() {
            Some(i) => write!(f, "{i}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_exact_integer() {
            Some(i) => serializer.serialize_i64(i),
            None => serializer.serialize_f64(self.0),
        }
    }
}

struct NumericVisitor;

impl Visitor<'_> for NumericVisitor {
    type Value = Numeric;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON number")
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Numeric, E> {
        Ok(Numeric(v as f64))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Numeric, E> {
        Ok(Numeric(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Numeric, E> {
        Ok(Numeric(v))
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NumericVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integers_keep_their_shape() {
        let n: Numeric = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(n.get(), 5.0);
        assert_eq!(serde_json::to_string(&n).unwrap(), "5");

        let n: Numeric = serde_json::from_value(json!(5.0)).unwrap();
        assert_eq!(serde_json::to_string(&n).unwrap(), "5");

        let n: Numeric = serde_json::from_value(json!(2.5)).unwrap();
        assert_eq!(serde_json::to_string(&n).unwrap(), "2.5");
    }

    #[test]
    fn non_numbers_are_rejected() {
        assert!(serde_json::from_value::<Numeric>(json!("5")).is_err());
        assert!(serde_json::from_value::<Numeric>(json!(true)).is_err());
        assert!(serde_json::from_value::<Numeric>(json!(null)).is_err());
        assert_eq!(Numeric::from_json(&json!("5")), None);
        assert_eq!(Numeric::from_json(&json!(-3)), Some(Numeric(-3.0)));
    }

    #[test]
    fn huge_values_stay_floats() {
        let n = Numeric(1e20);
        assert_eq!(n.as_exact_integer(), None);
        assert_eq!(n.to_string(), "100000000000000000000");
    }
}
