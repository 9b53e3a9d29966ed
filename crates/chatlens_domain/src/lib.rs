mod analysis;
mod block;
mod checkpoint;
mod client;
mod conversation;
mod detector;
mod error;
mod event;
mod segmenter;
mod stats;

pub use analysis::*;
pub use block::*;
pub use checkpoint::*;
pub use client::*;
pub use conversation::*;
pub use detector::*;
pub use error::*;
pub use event::*;
pub use segmenter::*;
pub use stats::*;
