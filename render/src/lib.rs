//! Render redirection for a crawl pipeline.
//!
//! Decides per page whether a plain HTTP fetch should go through a
//! headless-browser rendering service instead, rewrites the request into a
//! rendering-service call, and turns the service's reply back into a response
//! that looks like a direct fetch of the original URL.
//!
//! # Flow
//!
//! 1. **URL rules** - pre-dispatch; a match attaches a render request in place
//! 2. **Rewrite** - requests carrying a render request become `POST`s to
//!    `render.json` or, with a directive, `execute`
//! 3. **Dispatch** - by the crawl engine's own downloader, in the original
//!    page's download slot with an extended timeout
//! 4. **Reconstitute** - the reply is unwrapped into a page response at the
//!    original URL, with the screenshot attached to metadata
//! 5. **Response rules** - plain responses are checked by body, score and
//!    markup rules; a match resubmits the request for rendering
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`enable`] | The four enablement strategies and their chain |
//! | `builder` | Request rewriting and option merging |
//! | `reconstitute` | Reply unwrapping and screenshot extraction |
//! | `directive` | Directive script loading and caching |
//! | `coordinator` | Download-slot affinity and timeout budgeting |
//! | `artifacts` | Inline or content-addressed screenshot storage |
//! | `stats` | Issued/received counters |
//! | `resolved` | Internal: config resolution eliminating Option handling |
//!
//! # Error Handling
//!
//! All errors are [`RenderError`] with stable [`ErrorCode`] variants. At
//! runtime every failure is logged and degrades to treating the fetch as a
//! normal one; only [`ErrorCode::InvalidConfig`] reaches the caller, when the
//! pipeline is built.

mod artifacts;
mod builder;
mod coordinator;
mod directive;
pub mod enable;
mod error;
mod pipeline;
mod reconstitute;
mod resolved;
mod stats;

pub use artifacts::{ArtifactStore, FsArtifactStore, ScreenshotPolicy, screenshot_key};
pub use builder::{RequestBuilder, TARGET_URL_FIELD};
pub use coordinator::{Coordinator, HostSlots, SlotAssigner, extended_timeout};
pub use directive::{COMPANION_SOURCE_FIELD, Directive, DirectiveStore, PRIMARY_SOURCE_FIELD};
pub use enable::{EnablerChain, RenderEnabler, Trigger};
pub use error::{ErrorCode, ErrorDetails, RenderError};
pub use pipeline::{RenderPipeline, ResponseOutcome};
pub use reconstitute::{REPLY_EXTRA_KEY, Reconstitutor, RenderReply};
pub use stats::{RenderStats, StatsSnapshot};
