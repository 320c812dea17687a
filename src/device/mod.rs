// src/device/mod.rs

//! Device snapshots.
//!
//! A [`DeviceRecord`] is the raw data a subsystem backend produces; a
//! [`Description`] wraps it together with the subsystem handle so topology
//! lookups (parent, ancestors, descendants) can be answered later.

pub mod description;
pub mod record;

pub use description::Description;
pub use record::DeviceRecord;
