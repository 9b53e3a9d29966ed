mod cli;
mod logging;
mod runner;

pub use cli::*;
pub use logging::init_logging;
pub use runner::{Runner, load_conversations};
