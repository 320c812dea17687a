// src/watch/mod.rs

//! Device discovery.
//!
//! This module is responsible for:
//! - Turning enumeration results into incremental added/removed
//!   notifications (a scan diffs against what was already reported).
//! - Driving the live monitor while active and draining it on demand.
//! - Deciding device visibility through a pluggable [`DeviceFilter`].
//!
//! It does **not** open devices or track their lifecycle; see
//! [`crate::service`] for that.

pub mod filter;
pub mod watcher;

pub use filter::{AcceptAll, DeviceFilter, MatchRules, Predicate};
pub use watcher::{DeviceWatcher, WatchEvent};
