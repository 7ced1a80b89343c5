//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `WalkState`: the state machine of one account's history walk
//! - `Outcome` / `StopReason`: how a walk ended and why
//! - `CrawlCheckpoint`: resumable progress marker of a walk

mod checkpoint;
mod walk_state;

pub use checkpoint::CrawlCheckpoint;
pub use walk_state::{Outcome, StopReason, WalkState};
