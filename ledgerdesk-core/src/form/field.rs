use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Nullable form input.
///
/// Form payloads distinguish a key that was never sent (`Unset`) from one the
/// user cleared (`null` or a blank string, both `Cleared`). Validation only
/// cares whether a value is present, so both collapse to `None` through
/// [`Field::resolve`], the single place where that conversion happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Unset,
    Cleared,
    Value(T),
}

impl<T> Field<T> {
    /// Collapses the three input states into presence/absence.
    pub fn resolve(&self) -> Option<&T> {
        match self {
            Field::Value(value) => Some(value),
            Field::Unset | Field::Cleared => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Field::Value(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.resolve().copied()
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T> Field<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Cleared,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(value) => value.serialize(serializer),
            Field::Unset | Field::Cleared => serializer.serialize_none(),
        }
    }
}

// Absent keys never reach this impl; `#[serde(default)]` yields `Unset`.
impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None => Ok(Field::Cleared),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(Field::Cleared),
            Some(raw) => serde_json::from_value(raw)
                .map(Field::Value)
                .map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[derive(Debug, Deserialize, Serialize)]
    struct Probe {
        #[serde(default)]
        quantity: Field<Decimal>,
    }

    fn parse(json: &str) -> Field<Decimal> {
        serde_json::from_str::<Probe>(json).unwrap().quantity
    }

    #[test]
    fn test_absent_key_is_unset() {
        assert_eq!(parse("{}"), Field::Unset);
    }

    #[test]
    fn test_null_and_blank_are_cleared() {
        assert_eq!(parse(r#"{"quantity": null}"#), Field::Cleared);
        assert_eq!(parse(r#"{"quantity": ""}"#), Field::Cleared);
        assert_eq!(parse(r#"{"quantity": "   "}"#), Field::Cleared);
    }

    #[test]
    fn test_numbers_and_numeric_strings_are_values() {
        assert_eq!(parse(r#"{"quantity": "2.50"}"#), Field::Value(dec!(2.50)));
        assert_eq!(parse(r#"{"quantity": 3}"#), Field::Value(dec!(3)));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(serde_json::from_str::<Probe>(r#"{"quantity": "abc"}"#).is_err());
    }

    #[test]
    fn test_resolve_treats_unset_and_cleared_alike() {
        assert_eq!(Field::<Decimal>::Unset.resolve(), None);
        assert_eq!(Field::<Decimal>::Cleared.resolve(), None);
        assert_eq!(Field::Value(dec!(1)).get(), Some(dec!(1)));
    }

    #[test]
    fn test_serializes_missing_as_null() {
        let json = serde_json::to_string(&Probe { quantity: Field::Cleared }).unwrap();
        assert_eq!(json, r#"{"quantity":null}"#);
    }
}
