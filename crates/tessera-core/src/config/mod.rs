//! Engine configuration
//!
//! Settings are layered from ordered sources: built-in defaults, a config
//! file (TOML, YAML or JSON by extension) and `TESSERA_*` environment
//! variables, later sources overriding earlier ones.

mod env_loader;
mod file_loader;
mod loader;
mod model;

pub use env_loader::{apply_env_overrides, load_env_overrides};
pub use file_loader::load_from_file;
pub use loader::{ConfigLoader, ConfigSource};
pub use model::{ApiConfig, LogFormat, LoggingConfig, TasksConfig, TesseraConfig, VoiceConfig};
