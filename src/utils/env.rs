// src/utils/env.rs

use log::{info, warn};

/// Loads `.env` from the working directory (or a parent) into the process
/// environment. Variables already set are left alone.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment variables from {}", path.display()),
        Err(e) if e.not_found() => {
            info!("No .env file found. Proceeding with system environment variables.")
        }
        Err(e) => warn!(
            "Could not read .env file: {}. Proceeding with system environment variables.",
            e
        ),
    }
}
