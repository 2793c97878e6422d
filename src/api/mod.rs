//! YouTrack API client and types.
//!
//! This module provides the interface for communicating with the YouTrack
//! REST API.

mod client;
mod types;

pub use client::{RetryPolicy, YouTrackClient};
pub use types::CurrentUser;
