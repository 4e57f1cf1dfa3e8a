//! Scratch configurations for integration tests

use genbatch::Config;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted in `dir` with millisecond polling and no submission pacing
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.state_dir = dir.join("state");
    config.download.output_dir = dir.join("video_outputs");
    config.generation.submit_delay = Duration::ZERO;
    config.polling.min_interval = Duration::from_millis(20);
    config.polling.max_interval = Duration::from_millis(40);
    config.polling.global_timeout = Duration::from_secs(5);
    config.submit_retry.initial_delay = Duration::from_millis(1);
    config.submit_retry.max_delay = Duration::from_millis(5);
    config.submit_retry.jitter = false;
    config
}

/// Temp dir plus a fast config rooted in it
pub fn scratch() -> (TempDir, Config) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = fast_config(dir.path());
    (dir, config)
}
