use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque key/value payload passed through to payment plugins.
///
/// The ledger never interprets these values. Plugins use them for
/// gateway-specific data such as return URLs or card tokens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtendedData {
    values: BTreeMap<String, Value>,
}

impl ExtendedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ExtendedData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let mut data = ExtendedData::new();
        data.set("return_url", "https://shop.example/done");
        data.set("attempt", 2);

        assert!(data.has("return_url"));
        assert_eq!(data.get("attempt"), Some(&json!(2)));
        assert_eq!(data.remove("attempt"), Some(json!(2)));
        assert!(!data.has("attempt"));
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a: ExtendedData = [("a", 1), ("b", 2)].into_iter().collect();
        let b: ExtendedData = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(a, b);
    }
}
