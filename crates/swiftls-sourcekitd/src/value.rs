//! Owned request/response value trees.
//!
//! Requests are built as `Value` trees and serialized at the FFI boundary;
//! responses are decoded into `Value` trees exactly once. Accessors return
//! `Option` so a malformed response degrades to a dropped item, never a
//! worker crash.

use std::collections::HashMap;

use crate::uid::Uid;

/// A compiler-service protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Dictionary(HashMap<Uid, Value>),
    Array(Vec<Value>),
    String(String),
    Int(i64),
    Bool(bool),
    Uid(Uid),
}

impl Value {
    /// Build a dictionary from key/value pairs.
    pub fn dictionary(entries: impl IntoIterator<Item = (Uid, Value)>) -> Self {
        Value::Dictionary(entries.into_iter().collect())
    }

    /// Build an array of strings (compiler arguments).
    pub fn strings(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Value::Array(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            Value::Uid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` for missing keys and non-dictionaries.
    pub fn get(&self, key: Uid) -> Option<&Value> {
        match self {
            Value::Dictionary(map) => map.get(&key),
            _ => None,
        }
    }

    pub fn get_str(&self, key: Uid) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_int(&self, key: Uid) -> Option<i64> {
        self.get(key)?.as_int()
    }

    /// Non-negative integer lookup, converted to `usize`.
    pub fn get_usize(&self, key: Uid) -> Option<usize> {
        usize::try_from(self.get_int(key)?).ok()
    }

    pub fn get_uid(&self, key: Uid) -> Option<Uid> {
        self.get(key)?.as_uid()
    }

    pub fn get_array(&self, key: Uid) -> Option<&[Value]> {
        self.get(key)?.as_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(raw: u64) -> Uid {
        Uid::from_raw(raw)
    }

    #[test]
    fn test_dictionary_accessors() {
        let v = Value::dictionary([
            (uid(1), Value::string("name")),
            (uid(2), Value::Int(42)),
            (uid(3), Value::Uid(uid(9))),
            (uid(4), Value::strings(["-sdk", "/sdk"])),
        ]);

        assert_eq!(v.get_str(uid(1)), Some("name"));
        assert_eq!(v.get_int(uid(2)), Some(42));
        assert_eq!(v.get_usize(uid(2)), Some(42));
        assert_eq!(v.get_uid(uid(3)), Some(uid(9)));
        assert_eq!(v.get_array(uid(4)).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_missing_and_mistyped_keys_are_none() {
        let v = Value::dictionary([(uid(1), Value::string("x"))]);
        assert_eq!(v.get(uid(2)), None);
        assert_eq!(v.get_int(uid(1)), None);
        assert_eq!(Value::Null.get(uid(1)), None);
        assert_eq!(Value::Int(-1).get_usize(uid(1)), None);
    }

    #[test]
    fn test_negative_int_is_not_usize() {
        let v = Value::dictionary([(uid(1), Value::Int(-5))]);
        assert_eq!(v.get_usize(uid(1)), None);
        assert_eq!(v.get_int(uid(1)), Some(-5));
    }
}
