//! Gmail search query construction
//!
//! Structured filters ([`QueryOptions`]) are rendered into a single Gmail
//! search string. An empty rendering is refused rather than treated as
//! "match everything".

mod builder;

pub use builder::{AttachmentFilter, BuiltQuery, QueryOptions, build_query, quote_if_needed};
