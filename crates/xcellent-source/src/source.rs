use async_trait::async_trait;
use chrono::{DateTime, Utc};
use xcellent_core::{AccountCounters, SourceItem};

use crate::error::SourceError;

/// One page request against the item listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListItemsRequest {
    pub max_results: usize,
    /// Only items created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Cursor returned by the previous page.
    pub page_token: Option<String>,
}

/// One page of items plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPage {
    pub items: Vec<SourceItem>,
    pub next_page_token: Option<String>,
}

/// Supplier of point-in-time cumulative counters.
///
/// Implementations keep no history: every call reports the current totals.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn account_counters(&self) -> Result<AccountCounters, SourceError>;

    async fn list_items(&self, request: &ListItemsRequest) -> Result<ItemPage, SourceError>;
}
