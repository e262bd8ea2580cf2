use std::collections::HashMap;

use super::value::Value;

/// The mutable record a pipeline processes.
///
/// Field names are flat; nested data lives inside [`Value::Map`] values and is
/// reached through field-access expressions.
pub trait Message {
    fn get(&self, name: &str) -> Option<&Value>;

    fn set(&mut self, name: &str, value: Value);

    fn remove(&mut self, name: &str) -> Option<Value>;

    fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// A [`Message`] held in memory as a field map.
///
/// # Example
///
/// ```
/// use rulepipe::{MemoryMessage, Message, Value};
///
/// let msg = MemoryMessage::new()
///     .with("source", "fw-01")
///     .with("bytes", 512_i64);
/// assert_eq!(msg.get("bytes"), Some(&Value::Long(512)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryMessage {
    fields: HashMap<String, Value>,
}

impl MemoryMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Message for MemoryMessage {
    fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_owned(), value);
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MemoryMessage {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut msg = MemoryMessage::new();
        msg.set("a", Value::Long(1));
        assert_eq!(msg.get("a"), Some(&Value::Long(1)));
        assert!(msg.has_field("a"));
        assert!(!msg.has_field("b"));
    }

    #[test]
    fn overwrite_field() {
        let mut msg = MemoryMessage::new().with("a", 1_i64);
        msg.set("a", Value::from("x"));
        assert_eq!(msg.get("a"), Some(&Value::from("x")));
        assert_eq!(msg.len(), 1);
    }

    #[test]
    fn remove_field() {
        let mut msg = MemoryMessage::new().with("a", true);
        assert_eq!(msg.remove("a"), Some(Value::Bool(true)));
        assert_eq!(msg.remove("a"), None);
        assert!(msg.is_empty());
    }

    #[test]
    fn collect_from_pairs() {
        let msg: MemoryMessage = [("x", 1_i64), ("y", 2_i64)].into_iter().collect();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get("y"), Some(&Value::Long(2)));
    }
}
