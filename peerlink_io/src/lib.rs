//! Runtime plumbing shared by the peerlink crates.
//!
//! Every crate reaches tokio, its utilities and the lock types through this crate
//! so the whole workspace agrees on one runtime and one lock implementation.
#![forbid(unsafe_code)]
pub mod standard;

pub use standard::locks::*;
pub use standard::spawn::*;

#[cfg(feature = "deadlock-detection")]
pub use parking_lot::deadlock;

pub use tokio;
pub use tokio_stream;
pub use tokio_util;

pub use tokio_util::sync::CancellationToken;
