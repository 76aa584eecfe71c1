//! Hap: declarative HTML extraction
//!
//! A dataplan names a link, a list of field definitions and the types of the
//! fields to keep. Each definition is a literal or a pipeline of operations
//! (CSS and XPath queries, regex capture, replace, remove, glue) run against
//! the fetched page:
//!
//! ```json
//! {
//!     "link": "https://github.com/lexndru/hap",
//!     "define": [{"title": {"query": "title"}}],
//!     "declare": {"title": "string"}
//! }
//! ```
//!
//! Evaluating a plan produces one typed record, stamped with `_datetime`.

pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod plan;
pub mod store;

pub use cache::{Cache, DiskCache, MemoryCache};
pub use config::Settings;
pub use document::{DocumentQuery, HtmlDocument};
pub use engine::{evaluate, Driver, FieldValue, Outcome, Record, RunOptions};
pub use error::{HapError, Result};
pub use fetch::{Fetcher, LinkFetcher};
pub use plan::Plan;
