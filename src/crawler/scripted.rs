//! Scripted [`PageClient`] for driving the crawler in unit tests

use crate::crawler::client::{PageClient, PageResponse, TransportError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One scripted reaction to a request
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Reply(Result<PageResponse, TransportError>),
    /// Never answers
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<u32, VecDeque<Step>>,
    requests: Vec<String>,
}

/// Answers requests from per-page scripts
///
/// Each page replays its steps in order and repeats the last one forever.
/// Unscripted pages answer with an empty listings array.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedClient {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, page: u32, steps: Vec<Step>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.insert(page, steps.into());
    }

    pub(crate) fn requested_urls(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub(crate) fn requested_pages(&self) -> Vec<u32> {
        self.requested_urls()
            .iter()
            .filter_map(|url| page_of(url))
            .collect()
    }

    pub(crate) fn requests_for(&self, page: u32) -> usize {
        self.requested_pages().iter().filter(|p| **p == page).count()
    }

    fn next_step(&self, url: &str) -> Step {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(url.to_string());

        let queue = page_of(url).and_then(|page| inner.scripts.get_mut(&page));
        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => listings(0),
        }
    }
}

#[async_trait]
impl PageClient for ScriptedClient {
    async fn fetch(&self, url: &str) -> Result<PageResponse, TransportError> {
        match self.next_step(url) {
            Step::Reply(reply) => reply,
            Step::Hang => std::future::pending().await,
        }
    }
}

fn page_of(url: &str) -> Option<u32> {
    let parsed = url::Url::parse(url).ok()?;
    let page = parsed
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok());
    page
}

/// Wraps a data island document in a minimal search page
pub(crate) fn page_html(data: &str) -> String {
    format!(
        concat!(
            r#"<html><head><title>Search</title></head><body><div id="__next"></div>"#,
            r#"<script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#
        ),
        data
    )
}

/// A 200 page carrying `count` listings
pub(crate) fn listings(count: usize) -> Step {
    let items: Vec<_> = (1..=count)
        .map(|i| {
            json!({
                "property": {
                    "id": i.to_string(),
                    "price": {"value": i * 1000, "currency": "AED"},
                    "location": {"name": format!("Area {}", i)},
                    "amenities": ["pool", "gym"]
                },
                "agent": {"name": "Sam"}
            })
        })
        .collect();
    let data = json!({"props": {"pageProps": {"searchResult": {"listings": items}}}});
    html(page_html(&data.to_string()))
}

/// A 200 page with an arbitrary body
pub(crate) fn html(body: String) -> Step {
    Step::Reply(Ok(PageResponse { status: 200, body }))
}

/// An error status with an empty body
pub(crate) fn status(code: u16) -> Step {
    Step::Reply(Ok(PageResponse {
        status: code,
        body: String::new(),
    }))
}

pub(crate) fn timeout() -> Step {
    Step::Reply(Err(TransportError::Timeout {
        url: "scripted".to_string(),
    }))
}

pub(crate) fn hang() -> Step {
    Step::Hang
}
