//! Core domain types for rendergate.
//!
//! This crate contains the values that flow between the crawl engine and the
//! render-redirection layer: requests, responses and the metadata threaded
//! through both. There is no IO and no async here; everything can be built
//! and inspected from any layer, including tests.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod directive;
mod http;
mod meta;
mod options;

pub use directive::{DirectiveName, DirectiveNameError};
pub use http::{CrawlRequest, CrawlResponse, Headers, Method};
pub use meta::{RenderMarker, RenderRequest, RequestMeta, Screenshot, SlotKey};
pub use options::RenderOptions;

pub use url::Url;
