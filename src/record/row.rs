use serde_json::{Map, Value};

/// A single-level row of scalar cells, keyed by joined key paths
///
/// Cells keep their insertion order, which becomes the first-seen column
/// order when rows are written out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    cells: Map<String, Value>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cell, replacing any previous value under the same key
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.cells.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cells.get(key)
    }

    /// Returns true if the key is present with a non-null value
    pub fn has_value(&self, key: &str) -> bool {
        self.cells.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, Value)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insertion_order_is_kept() {
        let mut row = FlatRow::new();
        row.insert("z", json!(1));
        row.insert("a", json!(2));
        row.insert("m", json!(3));

        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_has_value() {
        let row: FlatRow = vec![
            ("id".to_string(), json!("42")),
            ("price".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert!(row.has_value("id"));
        assert!(!row.has_value("price"));
        assert!(!row.has_value("missing"));
        assert_eq!(row.len(), 2);
    }
}
