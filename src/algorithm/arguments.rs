//! Bound argument tables.

use std::collections::BTreeMap;

/// An argument converted to its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    DoubleList(Vec<f64>),
    Str(String),
}

/// The arguments bound to one step.
///
/// Keeps the raw text of every entry alongside its typed value. Values with
/// no declared kind are kept as strings; the getters still parse them on
/// demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArguments {
    raw: BTreeMap<String, String>,
    typed: BTreeMap<String, ArgValue>,
}

impl StepArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overlay an entry.
    pub fn insert(&mut self, name: impl Into<String>, raw: impl Into<String>, value: ArgValue) {
        let name = name.into();
        self.raw.insert(name.clone(), raw.into());
        self.typed.insert(name, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    /// The raw string table.
    pub fn raw(&self) -> &BTreeMap<String, String> {
        &self.raw
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.typed.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.typed.get(name)? {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::Str(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
            ArgValue::Str(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.typed.get(name)? {
            ArgValue::Int(i) => Some(*i),
            ArgValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.typed.get(name)? {
            ArgValue::Double(v) => Some(*v),
            ArgValue::Int(i) => Some(*i as f64),
            ArgValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_double_list(&self, name: &str) -> Option<Vec<f64>> {
        match self.typed.get(name)? {
            ArgValue::DoubleList(values) => Some(values.clone()),
            ArgValue::Double(v) => Some(vec![*v]),
            ArgValue::Int(i) => Some(vec![*i as f64]),
            ArgValue::Str(s) => s
                .split(',')
                .map(|item| item.trim().parse().ok())
                .collect(),
            ArgValue::Bool(_) => None,
        }
    }

    /// The raw text of an entry.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_raw(name)
    }
}
