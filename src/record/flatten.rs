//! Record flattening
//!
//! Turns an arbitrarily nested listing into a [`FlatRow`]. The transform is
//! total and deterministic: every JSON value flattens, and equal inputs give
//! equal rows with the same key order.

use crate::record::FlatRow;
use serde_json::{Map, Value};

/// Column name used when a listing is not a mapping at all
pub const SCALAR_LISTING_KEY: &str = "value";

/// Flattens nested listings into single-level rows
#[derive(Debug, Clone)]
pub struct Flattener {
    separator: String,
}

impl Flattener {
    /// Creates a flattener joining nested keys with `separator`
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Flattens one listing
    ///
    /// # Rules
    ///
    /// | Value | Result |
    /// |-------|--------|
    /// | mapping | recurse, child keys prefixed with `parent + separator` |
    /// | sequence whose first element is a mapping | whole sequence as one JSON string |
    /// | other sequence | kept, elements normalized |
    /// | scalar | kept, normalized |
    ///
    /// An empty nested mapping contributes no columns. A listing that is not
    /// a mapping becomes a single `value` column.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use sumi_harvest::record::Flattener;
    ///
    /// let row = Flattener::new(".").flatten(&json!({
    ///     "property": { "id": "42", "price": { "value": 9500 } },
    ///     "images": [{ "small": "a.jpg" }],
    /// }));
    ///
    /// assert_eq!(row.get("property.price.value"), Some(&json!(9500)));
    /// assert_eq!(row.get("images"), Some(&json!("[{\"small\":\"a.jpg\"}]")));
    /// ```
    pub fn flatten(&self, listing: &Value) -> FlatRow {
        let mut row = FlatRow::new();

        match listing {
            Value::Object(map) => self.flatten_into(&mut row, "", map),
            other => self.insert_leaf(&mut row, SCALAR_LISTING_KEY.to_string(), other),
        }

        row
    }

    /// Flattens every listing of a page, in order
    pub fn flatten_all(&self, listings: &[Value]) -> Vec<FlatRow> {
        listings.iter().map(|listing| self.flatten(listing)).collect()
    }

    fn flatten_into(&self, row: &mut FlatRow, prefix: &str, map: &Map<String, Value>) {
        for (key, value) in map {
            let column = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}{}{}", prefix, self.separator, key)
            };

            match value {
                Value::Object(child) => self.flatten_into(row, &column, child),
                other => self.insert_leaf(row, column, other),
            }
        }
    }

    fn insert_leaf(&self, row: &mut FlatRow, column: String, value: &Value) {
        let cell = match value {
            // Arrays of records are not navigable as columns; keep them as text
            Value::Array(items) if items.first().is_some_and(Value::is_object) => {
                Value::String(value.to_string())
            }
            Value::Array(items) => {
                Value::Array(items.iter().cloned().map(normalize_scalar).collect())
            }
            other => normalize_scalar(other.clone()),
        };

        row.insert(column, cell);
    }
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Maps "not a number" sentinels to an explicit null
///
/// Strings spelling `NaN` (any case) become null. JSON numbers are always
/// finite once decoded, so they pass through unchanged; so does everything else.
pub fn normalize_scalar(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().eq_ignore_ascii_case("nan") => Value::Null,
        Value::Number(n) if n.as_f64().is_some_and(|f| !f.is_finite()) => Value::Null,
        other => other,
    }
}
