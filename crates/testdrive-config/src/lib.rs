//! Layered configuration resolution (CLI > file > env > default) with
//! per-field provenance tracking, and TOML config-file discovery.

mod config;
mod discovery;
mod layers;
mod source;

pub use config::{load_file_config, resolve, Config};
pub use discovery::{discover_config_file, discover_config_file_from};
pub use layers::{CliOverrides, EnvConfig, FileConfig};
pub use source::Source;
