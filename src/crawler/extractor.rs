//! Data island extraction
//!
//! Search pages render their results client-side from a JSON document
//! embedded in the HTML (for Next.js sites, `<script id="__NEXT_DATA__">`).
//! This module locates that element, parses its text as JSON and walks a key
//! path down to the listings array.

use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Reasons a page body yields no listings array
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("No element with id '{element_id}' in page")]
    MissingDataIsland { element_id: String },

    #[error("Data island is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Listings not found at '{path}'")]
    PathNotFound { path: String },
}

/// Extracts the listings array from a search page
///
/// # Arguments
///
/// * `html` - The page body
/// * `element_id` - Identifier of the element holding the JSON document
/// * `json_path` - Keys from the document root to the listings; numeric
///   segments index into arrays
///
/// # Returns
///
/// * `Ok(Vec<Value>)` - The listings, possibly empty
/// * `Err(ExtractError)` - The element, the JSON or the path is missing
///
/// # Example
///
/// ```
/// use sumi_harvest::crawler::extract_listings;
///
/// let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
///     {"props": {"listings": [{"id": 1}, {"id": 2}]}}
/// </script></body></html>"#;
/// let path = vec!["props".to_string(), "listings".to_string()];
///
/// let listings = extract_listings(html, "__NEXT_DATA__", &path).unwrap();
/// assert_eq!(listings.len(), 2);
/// ```
pub fn extract_listings(
    html: &str,
    element_id: &str,
    json_path: &[String],
) -> Result<Vec<Value>, ExtractError> {
    let text = find_data_island(html, element_id)?;

    let document: Value = serde_json::from_str(text.trim())
        .map_err(|e| ExtractError::MalformedJson(e.to_string()))?;

    match walk_path(&document, json_path) {
        Some(Value::Array(listings)) => Ok(listings.clone()),
        _ => Err(ExtractError::PathNotFound {
            path: json_path.join("/"),
        }),
    }
}

/// Returns the text content of the first element carrying `element_id`
fn find_data_island(html: &str, element_id: &str) -> Result<String, ExtractError> {
    let missing = || ExtractError::MissingDataIsland {
        element_id: element_id.to_string(),
    };

    let document = Html::parse_document(html);
    let selector = Selector::parse("[id]").map_err(|_| missing())?;

    document
        .select(&selector)
        .find(|element| element.value().id() == Some(element_id))
        .map(|element| element.text().collect::<String>())
        .ok_or_else(missing)
}

fn walk_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ELEMENT_ID: &str = "__NEXT_DATA__";

    fn page_with(data: &str) -> String {
        format!(
            r#"<!DOCTYPE html><html><head><title>Search</title></head><body>
<div id="__next"><p>Loading</p></div>
<script id="__NEXT_DATA__" type="application/json">{}</script>
</body></html>"#,
            data
        )
    }

    fn default_path() -> Vec<String> {
        ["props", "pageProps", "searchResult", "listings"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_extract_listings() {
        let data = json!({
            "props": {"pageProps": {"searchResult": {"listings": [
                {"property": {"id": "1", "price": {"value": 100}}},
                {"property": {"id": "2", "price": {"value": 200}}}
            ]}}}
        });
        let html = page_with(&data.to_string());

        let listings = extract_listings(&html, ELEMENT_ID, &default_path()).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[1]["property"]["id"], json!("2"));
    }

    #[test]
    fn test_empty_listings_array() {
        let html = page_with(r#"{"props": {"pageProps": {"searchResult": {"listings": []}}}}"#);
        let listings = extract_listings(&html, ELEMENT_ID, &default_path()).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn test_missing_data_island() {
        let html = "<html><body><div id=\"__next\"></div></body></html>";
        let result = extract_listings(html, ELEMENT_ID, &default_path());
        assert_eq!(
            result,
            Err(ExtractError::MissingDataIsland {
                element_id: ELEMENT_ID.to_string()
            })
        );
    }

    #[test]
    fn test_malformed_json() {
        let html = page_with("{\"props\": ");
        let result = extract_listings(&html, ELEMENT_ID, &default_path());
        assert!(matches!(result, Err(ExtractError::MalformedJson(_))));
    }

    #[test]
    fn test_path_not_found() {
        let html = page_with(r#"{"props": {"pageProps": {}}}"#);
        let result = extract_listings(&html, ELEMENT_ID, &default_path());
        assert_eq!(
            result,
            Err(ExtractError::PathNotFound {
                path: "props/pageProps/searchResult/listings".to_string()
            })
        );
    }

    #[test]
    fn test_path_to_non_array() {
        let html =
            page_with(r#"{"props": {"pageProps": {"searchResult": {"listings": {"a": 1}}}}}"#);
        let result = extract_listings(&html, ELEMENT_ID, &default_path());
        assert!(matches!(result, Err(ExtractError::PathNotFound { .. })));
    }

    #[test]
    fn test_numeric_segment_indexes_array() {
        let html = page_with(r#"{"results": [{"hits": [1, 2, 3]}]}"#);
        let path = vec!["results".to_string(), "0".to_string(), "hits".to_string()];

        let listings = extract_listings(&html, ELEMENT_ID, &path).unwrap();
        assert_eq!(listings, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_custom_element_id() {
        let html = r#"<html><body><script id="state">{"items": [{"x": 1}]}</script></body></html>"#;
        let path = vec!["items".to_string()];

        let listings = extract_listings(html, "state", &path).unwrap();
        assert_eq!(listings, vec![json!({"x": 1})]);
    }

    #[test]
    fn test_json_with_markup_characters() {
        let html = page_with(r#"{"items": [{"title": "2 < 3 && 4 > 1"}]}"#);
        let path = vec!["items".to_string()];

        let listings = extract_listings(&html, ELEMENT_ID, &path).unwrap();
        assert_eq!(listings[0]["title"], json!("2 < 3 && 4 > 1"));
    }
}
