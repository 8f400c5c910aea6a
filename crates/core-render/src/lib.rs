//! Display bridge: converts `(buffer, cursor)` into a `RenderOutput` and
//! hands it to the external display controller.
//!
//! This is not the teacher's multi-line `Cell`/`Frame` grid model — a line
//! editor's render surface is a prompt plus a handful of logical lines,
//! not an arbitrary-height viewport, so the flatter `RenderOutput` from
//! `core-model` is produced directly. What does carry over from the
//! teacher is the shape of its render instrumentation: a hash-keyed cache
//! (`cache.rs`, grounded on `partial_cache.rs`'s `ahash` line-hashing), a
//! dirty-interval tracker (`dirty.rs`, grounded on `dirty.rs`'s mark/take
//! lifecycle), and per-stage atomic counters (`metrics.rs`, grounded on
//! `partial_metrics.rs`'s `RenderPathMetrics`).
//!
//! Submission (writing `RenderOutput` to the `DisplayController` and
//! retrying once on failure) lives here in `engine::submit`. Publishing
//! the high-priority `redraw-needed` event and draining the dispatcher's
//! queue (§4.5.6 steps 3-4) happens one level up in `core-readline`, since
//! that requires `core-events::Dispatcher`, which this crate does not
//! depend on.

pub mod cache;
pub mod dirty;
pub mod engine;
pub mod metrics;
pub mod prompt;
pub mod timing;

pub use engine::{submit, RenderEngine, RenderError};
pub use prompt::PromptMetrics;
