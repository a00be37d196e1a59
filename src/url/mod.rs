//! URL handling module for Threadkeeper
//!
//! Forum listings and topics are addressed through query parameters
//! (`viewforum.php?f=12&start=60`), so most helpers here read and rewrite
//! individual query parameters while leaving the rest of the URL untouched.

mod normalize;
mod query;

pub use normalize::canonical_topic_url;
pub use query::{query_param, same_endpoint, with_param, without_param};
