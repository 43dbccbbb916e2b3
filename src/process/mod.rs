// src/process/mod.rs

//! Per-month processing: group part archives, parse their text entries into
//! frames, and stack the frames of each logical table.

pub mod consolidate;
pub mod frame;
pub mod group;

pub use consolidate::consolidate;
pub use frame::{FrameBuilder, PARTITION_COLUMN};
pub use group::{PartGrouper, PartGroups};
