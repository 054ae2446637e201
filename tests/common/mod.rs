#![allow(dead_code)]

use rental_scout::config::{DelayRange, FlushBy, RetryPolicy, RunOptions, StatusBackoff};
use std::path::{Path, PathBuf};

/// Three attempts, no waiting anywhere
pub fn instant_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: DelayRange::ZERO,
        category_delays: Default::default(),
        backoff: StatusBackoff::none(),
    }
}

pub fn run_options(flush_every: usize, flush_by: FlushBy) -> RunOptions {
    RunOptions {
        flush_every,
        flush_by,
        retry_limit: 10,
        retry_pause: DelayRange::ZERO,
    }
}

/// Output files whose name ends with `suffix`
pub fn files_ending(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.to_string_lossy().ends_with(suffix))
        .collect();
    found.sort();
    found
}
