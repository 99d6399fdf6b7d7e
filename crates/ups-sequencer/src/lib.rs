//! The Shutdown Sequencer: once the trigger evaluator or a power-quality
//! monitor decides the machine must go down, this crate owns making that
//! happen — in order, without aborting on a single stage's failure, and
//! identically whether or not `dry_run` is set.

mod config;
mod latch_file;
mod sequencer;

pub use config::{MountConfig, SequencerConfig};
pub use latch_file::{FileLatchPersistence, LatchPersistence};
pub use sequencer::{Sequencer, SequencerCapabilities};
