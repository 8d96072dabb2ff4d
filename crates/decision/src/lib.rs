//! Decision engine for upgrade-worthiness
//!
//! Maps a library item's current capabilities and a candidate release's
//! parsed capabilities onto a notify/skip verdict under the operator's
//! notification policy. Side-effect free; the workflow crate owns all I/O.

pub mod classifier;
pub mod release;
pub mod resolution;

pub use classifier::{classify, QualityView, Verdict};
pub use release::{parse_release_title, parse_sketch, CapabilitySketch, ParsedTitle};
pub use resolution::Resolution;
