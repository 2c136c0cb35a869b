//! Cursor-based listing pagination
//!
//! Turns the listing endpoint into a lazy stream of [`ObjectEntry`]:
//! one GET per page, `prefixes` merged ahead of `items` as name-only
//! placeholders, continuation cursors chased transparently. A result cap
//! stops the stream after exactly that many yields and is forwarded to
//! each page request as an upper bound. The stream is not rewindable;
//! restart by calling [`list`] again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, BoxStream};
use http::Method;

use gs_core::Result;

use crate::client::StorageClient;
use crate::object::{ListingPage, ObjectEntry};

/// Emitted once per process, the first time any listing spans pages
static PAGING_ADVISORY_SHOWN: AtomicBool = AtomicBool::new(false);

struct ListState {
    client: StorageClient,
    resource: String,
    query: Vec<(String, String)>,
    cursor: Option<String>,
    buffered: VecDeque<ObjectEntry>,
    remaining: Option<u64>,
    more_pages: bool,
}

/// Lazy paginated listing of `resource` with the given query parameters.
///
/// `max_results` caps the total number of yielded entries regardless of how
/// many pages the remote holds.
pub fn list(
    client: StorageClient,
    resource: impl Into<String>,
    query: Vec<(String, String)>,
    max_results: Option<u64>,
) -> BoxStream<'static, Result<ObjectEntry>> {
    let state = ListState {
        client,
        resource: resource.into(),
        query,
        cursor: None,
        buffered: VecDeque::new(),
        remaining: max_results,
        more_pages: true,
    };

    Box::pin(stream::try_unfold(state, |mut st| async move {
        loop {
            if st.remaining == Some(0) {
                return Ok(None);
            }
            if let Some(entry) = st.buffered.pop_front() {
                if let Some(rem) = st.remaining.as_mut() {
                    *rem -= 1;
                }
                return Ok(Some((entry, st)));
            }
            if !st.more_pages {
                return Ok(None);
            }

            let remaining_param = st.remaining.map(|r| r.to_string());
            let cursor_param = st.cursor.clone();
            let mut query: Vec<(&str, &str)> = st
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            if let Some(rem) = remaining_param.as_deref() {
                query.push(("maxResults", rem));
            }
            if let Some(token) = cursor_param.as_deref() {
                query.push(("pageToken", token));
            }

            let page: ListingPage<ObjectEntry> = st
                .client
                .request(Method::GET, &st.resource, &query)
                .await?
                .json()
                .await?;

            st.buffered = page
                .prefixes
                .into_iter()
                .map(ObjectEntry::prefix)
                .chain(page.items)
                .collect();

            match page.next_page_token {
                Some(token) => {
                    if !PAGING_ADVISORY_SHOWN.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            "Large number of results returned. Listing may take a while. \
                             You can limit the object count using the --max-results option."
                        );
                    }
                    st.cursor = Some(token);
                }
                None => {
                    st.more_pages = false;
                    st.cursor = None;
                }
            }
        }
    }))
}

/// Listing of `gs://bucket/prefix` with `/` delimiter semantics
pub fn list_objects(
    client: StorageClient,
    bucket: &str,
    prefix: Option<&str>,
    delimiter: Option<&str>,
    max_results: Option<u64>,
) -> BoxStream<'static, Result<ObjectEntry>> {
    let resource = format!("b/{}/o", urlencoding::encode(bucket));
    let mut query = Vec::new();
    if let Some(delimiter) = delimiter {
        query.push(("delimiter".to_string(), delimiter.to_string()));
    }
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        query.push(("prefix".to_string(), prefix.to_string()));
    }
    list(client, resource, query, max_results)
}
