//! Cursor-based pagination over [`MetricsSource::list_items`].

use chrono::{DateTime, Utc};
use xcellent_core::SourceItem;

use crate::error::SourceError;
use crate::source::{ListItemsRequest, MetricsSource};

/// Largest page the API serves.
pub const PAGE_SIZE: usize = 100;

/// Fetch up to `max_items` items, following the cursor page by page.
///
/// Pages are requested sequentially. The loop stops when the cap is reached,
/// the cursor runs out, or `ceil(max_items / PAGE_SIZE)` pages have been
/// read, whichever comes first. Any page failure fails the whole fetch.
///
/// # Errors
///
/// Returns the first [`SourceError`] raised by the source.
pub async fn fetch_items(
    source: &dyn MetricsSource,
    max_items: usize,
    created_after: Option<DateTime<Utc>>,
) -> Result<Vec<SourceItem>, SourceError> {
    let mut items: Vec<SourceItem> = Vec::new();
    let mut page_token: Option<String> = None;
    let max_pages = max_items.div_ceil(PAGE_SIZE);

    for page in 0..max_pages {
        let request = ListItemsRequest {
            max_results: PAGE_SIZE.min(max_items - items.len()),
            created_after,
            page_token: page_token.take(),
        };
        let fetched = source.list_items(&request).await?;
        tracing::debug!(page, count = fetched.items.len(), "source: fetched item page");
        items.extend(fetched.items);

        page_token = fetched.next_page_token;
        if page_token.is_none() || items.len() >= max_items {
            break;
        }
    }

    items.truncate(max_items);
    Ok(items)
}
