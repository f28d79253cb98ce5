//! Runtime configuration for the rolling-lottery CLI.
//!
//! Every value has a compile-time default and can be overridden through an
//! environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lottery_store::DEFAULT_CAPACITY_BYTES;

/// Subdirectory of the platform data dir used by default.
const APP_DIR_NAME: &str = "rolling-lottery";

/// Fallback data directory when the platform has no data dir.
const DEV_DATA_DIR: &str = "./data";

const LOG_DIR_NAME: &str = "logs";

/// Default bound on a single random-source call, in milliseconds.
const DEFAULT_RANDOM_TIMEOUT_MS: u64 = 3000;

/// Get the directory the store keeps its files in.
///
/// Priority:
/// 1. `ROLLING_LOTTERY_DATA_DIR` env variable if set
/// 2. `<platform data dir>/rolling-lottery`
/// 3. `./data` as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ROLLING_LOTTERY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(dir) = dirs::data_dir() {
        return dir.join(APP_DIR_NAME);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Get the directory daily log files are written to.
///
/// Priority:
/// 1. `ROLLING_LOTTERY_LOG_DIR` env variable if set
/// 2. `<data_dir>/logs`
pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    if let Ok(dir) = std::env::var("ROLLING_LOTTERY_LOG_DIR") {
        return PathBuf::from(dir);
    }

    data_dir.join(LOG_DIR_NAME)
}

/// Get the storage capacity ceiling in bytes.
///
/// Falls back to the default if `ROLLING_LOTTERY_STORAGE_CAPACITY` cannot be
/// parsed as a `u64`.
pub fn get_storage_capacity() -> u64 {
    if let Ok(capacity) = std::env::var("ROLLING_LOTTERY_STORAGE_CAPACITY") {
        return capacity.parse().unwrap_or(DEFAULT_CAPACITY_BYTES);
    }

    DEFAULT_CAPACITY_BYTES
}

/// Get the bound on waiting for the random source.
pub fn get_random_timeout() -> Duration {
    let ms = std::env::var("ROLLING_LOTTERY_RANDOM_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RANDOM_TIMEOUT_MS);
    Duration::from_millis(ms)
}
