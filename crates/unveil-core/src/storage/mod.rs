mod config;
pub mod reveals;

pub use config::{AdmissionConfig, QuotaConfig, RevealConfig, StageConfig};
pub use reveals::{MemoryRevealStore, RevealStore, SqliteRevealStore};

use std::path::PathBuf;

/// Returns `~/.config/unveil[-dev]/` based on UNVEIL_ENV.
///
/// Set UNVEIL_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("UNVEIL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("unveil-dev")
    } else {
        base_dir.join("unveil")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
