use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameter carrying the page number
pub const PAGE_PARAM: &str = "page";

/// A single page of a paginated search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Search URL as configured (raw or templated)
    pub base_url: String,

    /// 1-based page number
    pub page_number: u32,
}

impl PageRequest {
    pub fn new(base_url: impl Into<String>, page_number: u32) -> Self {
        Self {
            base_url: base_url.into(),
            page_number,
        }
    }

    /// Concrete URL for this page
    pub fn url(&self) -> UrlResult<String> {
        apply_page(&self.base_url, self.page_number)
    }

    /// The request for the following page of the same search
    pub fn next(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            page_number: self.page_number + 1,
        }
    }
}

/// Applies the pagination rule to a search URL
///
/// # Rules
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. If a `page` query parameter exists, replace its value in place
///    (template placeholders such as `page={page}` or `page={}` are just
///    values to be replaced)
/// 3. Otherwise append `page=<n>` after the existing parameters
/// 4. Duplicate `page` parameters collapse into the first one
/// 5. Reject any `{page}` or `{}` placeholder left elsewhere (a path segment,
///    another parameter); it would never change between pages
///
/// The remaining parameters keep their order. The query is re-serialized in
/// `application/x-www-form-urlencoded` form, so applying the rule to its own
/// output with the same page number yields the same URL.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::apply_page;
///
/// let url = apply_page("https://example.com/search?c=2&page={}", 3).unwrap();
/// assert_eq!(url, "https://example.com/search?c=2&page=3");
///
/// let url = apply_page("https://example.com/search?c=2", 3).unwrap();
/// assert_eq!(url, "https://example.com/search?c=2&page=3");
/// ```
pub fn apply_page(base_url: &str, page: u32) -> UrlResult<String> {
    if page == 0 {
        return Err(UrlError::InvalidPage(page));
    }

    let mut url = Url::parse(base_url.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    set_page_param(&mut url, &page.to_string());

    let url: String = url.into();
    if has_placeholder(&url) {
        return Err(UrlError::MisplacedPlaceholder(base_url.trim().to_string()));
    }

    Ok(url)
}

/// Returns true if a page placeholder survives, literal or percent-encoded
fn has_placeholder(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    ["{page}", "{}", "%7bpage%7d", "%7b%7d"]
        .iter()
        .any(|placeholder| url.contains(placeholder))
}

/// Replaces or appends the page query parameter
fn set_page_param(url: &mut Url, page: &str) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let mut replaced = false;
    pairs.retain_mut(|(key, value)| {
        if key != PAGE_PARAM {
            return true;
        }
        if replaced {
            return false;
        }
        *value = page.to_string();
        replaced = true;
        true
    });

    if !replaced {
        pairs.push((PAGE_PARAM.to_string(), page.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs.iter());
}
