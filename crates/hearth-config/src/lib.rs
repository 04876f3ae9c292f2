mod raw;
mod loader;
pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use loader::{load_config, Config};
pub use settings::Settings;
