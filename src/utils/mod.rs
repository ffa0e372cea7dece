pub mod errors;

pub use errors::{FeedError, Result};
