mod app_config;
mod error;
mod provider;

pub use app_config::*;
pub use error::*;
pub use provider::*;
