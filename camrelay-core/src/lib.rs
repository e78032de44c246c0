pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
