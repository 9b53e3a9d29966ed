mod error;
mod retry;
mod scheduler;
mod store;
mod summary;

pub use error::*;
pub use retry::*;
pub use scheduler::*;
pub use store::*;
pub use summary::*;
