//! Domain abstractions: store traits and external service seams

pub mod clients;
pub mod repositories;

pub use clients::*;
pub use repositories::*;
