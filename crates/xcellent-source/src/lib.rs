//! The metrics source seam and its X API v2 implementation.

pub mod client;
pub mod error;
pub mod normalize;
pub mod pagination;
pub mod source;
pub mod types;

pub use client::XApiClient;
pub use error::SourceError;
pub use pagination::{fetch_items, PAGE_SIZE};
pub use source::{ItemPage, ListItemsRequest, MetricsSource};
