//! Keys, values and the set arithmetic applied to stored rows.
//!
//! A stored value is a JSON array of strings or numbers that never holds the
//! same element twice. Every union keeps the first occurrence of an element,
//! so results are ordered by first appearance across the inputs.

use crate::error::{AclError, AclResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single element of a stored set. Numbers compare by value, so `1` and
/// `1.0` are the same element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AclValue {
    Number(serde_json::Number),
    Text(String),
}

impl AclValue {
    fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl PartialEq for AclValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => numbers_equal(a, b),
            _ => false,
        }
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if a.is_f64() || b.is_f64() {
        return a.as_f64() == b.as_f64();
    }
    false
}

impl fmt::Display for AclValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AclValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AclValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for AclValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for AclValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for AclValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for AclValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// A row key. Numeric keys are stored by their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclKey(String);

impl AclKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AclKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AclKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for AclKey {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<i64> for AclKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for AclKey {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for AclKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Caller input for `add` and `remove`: one value or a sequence of them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Values(Vec<AclValue>);

impl Values {
    /// Normalise into a sequence, rejecting strings mixed with numbers.
    pub fn into_checked(self) -> AclResult<Vec<AclValue>> {
        let mut iter = self.0.iter();
        if let Some(first) = iter.next() {
            let text = first.is_text();
            if iter.any(|v| v.is_text() != text) {
                return Err(AclError::contract(format!(
                    "values must be all strings or all numbers, got {:?}",
                    self.0
                )));
            }
        }
        Ok(self.0)
    }
}

macro_rules! values_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Values {
            fn from(value: $ty) -> Self {
                Self(vec![AclValue::from(value)])
            }
        })*
    };
}

values_from_scalar!(&str, String, &String, i64, i32, u64, AclValue);

impl<T: Into<AclValue>> From<Vec<T>> for Values {
    fn from(values: Vec<T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AclValue>, const N: usize> From<[T; N]> for Values {
    fn from(values: [T; N]) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AclValue> + Clone> From<&[T]> for Values {
    fn from(values: &[T]) -> Self {
        Self(values.iter().cloned().map(Into::into).collect())
    }
}

/// Caller input for `del` and `union`: one key or a list of keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Keys(Vec<AclKey>);

impl Keys {
    pub fn into_vec(self) -> Vec<AclKey> {
        self.0
    }
}

macro_rules! keys_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Keys {
            fn from(key: $ty) -> Self {
                Self(vec![AclKey::from(key)])
            }
        })*
    };
}

keys_from_scalar!(&str, String, &String, i64, i32, u64, AclKey);

impl<T: Into<AclKey>> From<Vec<T>> for Keys {
    fn from(keys: Vec<T>) -> Self {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AclKey>, const N: usize> From<[T; N]> for Keys {
    fn from(keys: [T; N]) -> Self {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AclKey> + Clone> From<&[T]> for Keys {
    fn from(keys: &[T]) -> Self {
        Self(keys.iter().cloned().map(Into::into).collect())
    }
}

/// Append every element of `incoming` not already present in `set`.
pub fn union_into<I>(set: &mut Vec<AclValue>, incoming: I)
where
    I: IntoIterator<Item = AclValue>,
{
    for value in incoming {
        if !set.contains(&value) {
            set.push(value);
        }
    }
}

/// Union of several sets, ordered by first occurrence.
pub fn union<I, S>(sets: I) -> Vec<AclValue>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = AclValue>,
{
    let mut result = Vec::new();
    for set in sets {
        union_into(&mut result, set);
    }
    result
}

/// `set` with every element of `removed` taken out, order preserved.
pub fn difference(set: Vec<AclValue>, removed: &[AclValue]) -> Vec<AclValue> {
    set.into_iter().filter(|v| !removed.contains(v)).collect()
}

/// Decode a set-bucket row value. An empty column reads as the empty set.
pub fn parse_set(raw: &str) -> AclResult<Vec<AclValue>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_set(set: &[AclValue]) -> AclResult<String> {
    Ok(serde_json::to_string(set)?)
}

/// Row value of a permission bucket: sub-key (resource) to permission set.
///
/// A sub-key is only ever present with a non-empty set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(BTreeMap<String, Vec<AclValue>>);

impl PermissionMap {
    pub fn parse(raw: &str) -> AclResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> AclResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, sub_key: &AclKey) -> Vec<AclValue> {
        self.0.get(sub_key.as_str()).cloned().unwrap_or_default()
    }

    pub fn contains(&self, sub_key: &AclKey) -> bool {
        self.0.contains_key(sub_key.as_str())
    }

    /// Union of the named sub-keys' sets, in list order.
    pub fn union(&self, sub_keys: &[AclKey]) -> Vec<AclValue> {
        union(sub_keys.iter().map(|k| self.get(k)))
    }

    /// Union `values` into the sub-key's set, creating it when absent.
    pub fn add(&mut self, sub_key: &AclKey, values: Vec<AclValue>) {
        let set = self.0.entry(sub_key.as_str().to_string()).or_default();
        union_into(set, values);
        if set.is_empty() {
            self.0.remove(sub_key.as_str());
        }
    }

    /// Take `values` out of the sub-key's set; an emptied set drops the sub-key.
    pub fn remove(&mut self, sub_key: &AclKey, values: &[AclValue]) {
        if let Some(set) = self.0.remove(sub_key.as_str()) {
            let remaining = difference(set, values);
            if !remaining.is_empty() {
                self.0.insert(sub_key.as_str().to_string(), remaining);
            }
        }
    }

    pub fn delete(&mut self, sub_keys: &[AclKey]) {
        for key in sub_keys {
            self.0.remove(key.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<AclValue> {
        values.iter().map(|v| AclValue::from(*v)).collect()
    }

    #[test]
    fn test_union_keeps_first_occurrence_order() {
        let merged = union(vec![texts(&["b", "a"]), texts(&["c", "a", "b", "d"])]);
        assert_eq!(merged, texts(&["b", "a", "c", "d"]));
    }

    #[test]
    fn test_union_into_is_idempotent() {
        let mut set = texts(&["read"]);
        union_into(&mut set, texts(&["read", "read"]));
        assert_eq!(set, texts(&["read"]));
    }

    #[test]
    fn test_difference() {
        let left = difference(texts(&["a", "b", "c"]), &texts(&["b", "x"]));
        assert_eq!(left, texts(&["a", "c"]));
    }

    #[test]
    fn test_numbers_and_strings_are_distinct() {
        let mut set = vec![AclValue::from(1)];
        union_into(&mut set, vec![AclValue::from("1")]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_integral_float_equals_integer() {
        let stored = parse_set("[1.0, 2.5]").unwrap();
        assert_eq!(stored.first(), Some(&AclValue::from(1)));
        assert_ne!(stored.get(1), Some(&AclValue::from(2)));
        assert_ne!(AclValue::from(-1), AclValue::from(u64::MAX));

        let mut set = stored.clone();
        union_into(&mut set, vec![AclValue::from(1)]);
        assert_eq!(set, stored);

        assert_eq!(difference(stored, &[AclValue::from(1)]), parse_set("[2.5]").unwrap());
    }

    #[test]
    fn test_mixed_values_break_contract() {
        let values = Values::from(vec![AclValue::from("a"), AclValue::from(2)]);
        let err = values.into_checked().unwrap_err();
        assert!(err.is_contract_violation());

        assert!(Values::from(vec![1, 2, 3]).into_checked().is_ok());
        assert!(Values::default().into_checked().unwrap().is_empty());
    }

    #[test]
    fn test_parse_set_round_trips_mixed_json() {
        let set = parse_set(r#"["admin", 42]"#).unwrap();
        assert_eq!(set, vec![AclValue::from("admin"), AclValue::from(42)]);
        assert_eq!(encode_set(&set).unwrap(), r#"["admin",42]"#);
        assert!(parse_set("").unwrap().is_empty());
        assert!(parse_set("{not json").is_err());
    }

    #[test]
    fn test_permission_map_drops_emptied_sub_keys() {
        let resource = AclKey::from("resource1");
        let mut map = PermissionMap::default();
        map.add(&resource, texts(&["read", "write"]));
        map.add(&resource, texts(&["write", "delete"]));
        assert_eq!(map.get(&resource), texts(&["read", "write", "delete"]));

        map.remove(&resource, &texts(&["read", "write", "delete"]));
        assert!(!map.contains(&resource));
        assert!(map.is_empty());
        assert_eq!(map.encode().unwrap(), "{}");
    }

    #[test]
    fn test_permission_map_union_across_sub_keys() {
        let mut map = PermissionMap::parse(r#"{"a":["read"],"b":["write","read"]}"#).unwrap();
        let keys = vec![AclKey::from("b"), AclKey::from("a"), AclKey::from("missing")];
        assert_eq!(map.union(&keys), texts(&["write", "read"]));

        map.delete(&[AclKey::from("a")]);
        assert_eq!(map.encode().unwrap(), r#"{"b":["write","read"]}"#);
    }

    #[test]
    fn test_numeric_keys_use_decimal_text() {
        assert_eq!(AclKey::from(42).as_str(), "42");
        let keys = Keys::from(["a", "b"]).into_vec();
        assert_eq!(keys, vec![AclKey::from("a"), AclKey::from("b")]);
    }
}
