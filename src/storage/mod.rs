//! Persistence of acquisition progress

pub mod checkpoint;

pub use checkpoint::CheckpointStore;
