//! Run settings.
//!
//! Every value has a default matching how the crawlers have been run so far;
//! a TOML file overrides individual keys on top of those defaults:
//!
//! ```toml
//! [naver]
//! timeout_secs = 15
//!
//! [naver.retry]
//! max_retries = 3
//! base_delay = { min = 1.5, max = 3.0 }
//!
//! [naver.run]
//! flush_every = 50
//! flush_by = "index"
//! ```

use crate::error::{BackoffClass, Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Closed interval of seconds a pause is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min: 0.0, max: 0.0 };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Uniform sample from the range. A degenerate or inverted range yields `min`.
    pub fn sample(&self) -> Duration {
        let min = self.min.max(0.0);
        if self.max <= min {
            return Duration::from_secs_f64(min);
        }
        let secs = rand::thread_rng().gen_range(min..=self.max);
        Duration::from_secs_f64(secs)
    }
}

/// Extra wait after a failed attempt, chosen by what went wrong
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBackoff {
    /// HTTP 429
    pub rate_limited: DelayRange,
    /// HTTP 403
    pub blocked: DelayRange,
    pub network: DelayRange,
    /// Any other non-200 status
    pub status: DelayRange,
    pub malformed: DelayRange,
}

impl Default for StatusBackoff {
    fn default() -> Self {
        Self {
            rate_limited: DelayRange::new(10.0, 20.0),
            blocked: DelayRange::new(5.0, 10.0),
            network: DelayRange::new(3.0, 8.0),
            status: DelayRange::new(2.0, 5.0),
            malformed: DelayRange::new(2.0, 4.0),
        }
    }
}

impl StatusBackoff {
    pub fn for_class(&self, class: BackoffClass) -> DelayRange {
        match class {
            BackoffClass::RateLimited => self.rate_limited,
            BackoffClass::Blocked => self.blocked,
            BackoffClass::Network => self.network,
            BackoffClass::Status => self.status,
            BackoffClass::Malformed => self.malformed,
        }
    }

    /// No waiting at all; for tests.
    pub fn none() -> Self {
        Self {
            rate_limited: DelayRange::ZERO,
            blocked: DelayRange::ZERO,
            network: DelayRange::ZERO,
            status: DelayRange::ZERO,
            malformed: DelayRange::ZERO,
        }
    }
}

/// Pacing and retry policy of the paced fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per unit in one round
    pub max_retries: u32,
    /// Pause before every request
    pub base_delay: DelayRange,
    /// Per-category replacement for `base_delay`
    pub category_delays: BTreeMap<String, DelayRange>,
    pub backoff: StatusBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: DelayRange::new(1.5, 3.0),
            category_delays: BTreeMap::new(),
            backoff: StatusBackoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, category: Option<&str>) -> DelayRange {
        category
            .and_then(|c| self.category_delays.get(c))
            .copied()
            .unwrap_or(self.base_delay)
    }
}

/// What `flush_every` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushBy {
    /// 1-based position in the full unit sequence (page number)
    Index,
    /// Units processed by this run
    Processed,
}

/// Aggregator knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Checkpoint cadence; 0 disables checkpoints
    pub flush_every: usize,
    pub flush_by: FlushBy,
    /// Most units re-attempted by the deferred retry pass
    pub retry_limit: usize,
    /// Pause between deferred retries
    pub retry_pause: DelayRange,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            flush_every: 50,
            flush_by: FlushBy::Processed,
            retry_limit: 10,
            retry_pause: DelayRange::new(3.0, 6.0),
        }
    }
}

impl RunOptions {
    pub fn should_flush(&self, index: usize, processed: usize) -> bool {
        if self.flush_every == 0 {
            return false;
        }
        let counter = match self.flush_by {
            FlushBy::Index => index + 1,
            FlushBy::Processed => processed,
        };
        counter > 0 && counter % self.flush_every == 0
    }
}

/// One crawler's section of the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub run: RunOptions,
    /// Pause between the month requests of one listing
    pub inner_delay: DelayRange,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            run: RunOptions::default(),
            inner_delay: DelayRange::ZERO,
        }
    }
}

impl CrawlerSettings {
    pub fn naver() -> Self {
        Self {
            timeout_secs: 15,
            retry: RetryPolicy::default(),
            run: RunOptions {
                flush_every: 50,
                flush_by: FlushBy::Index,
                ..RunOptions::default()
            },
            inner_delay: DelayRange::ZERO,
        }
    }

    pub fn rooms() -> Self {
        let mut category_delays = BTreeMap::new();
        category_delays.insert("seoul".to_string(), DelayRange::new(3.0, 6.0));
        category_delays.insert("incheon".to_string(), DelayRange::new(2.5, 5.5));
        Self {
            timeout_secs: 30,
            retry: RetryPolicy {
                base_delay: DelayRange::new(2.5, 5.0),
                category_delays,
                backoff: StatusBackoff {
                    network: DelayRange::new(3.0, 6.0),
                    ..StatusBackoff::default()
                },
                ..RetryPolicy::default()
            },
            run: RunOptions {
                flush_every: 10,
                ..RunOptions::default()
            },
            inner_delay: DelayRange::ZERO,
        }
    }

    pub fn occupancy() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryPolicy {
                base_delay: DelayRange::new(0.2, 0.5),
                ..RetryPolicy::default()
            },
            run: RunOptions {
                flush_every: 30,
                retry_pause: DelayRange::new(0.5, 1.0),
                ..RunOptions::default()
            },
            inner_delay: DelayRange::new(0.07, 0.15),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// All crawler sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub naver: CrawlerSettings,
    pub rooms: CrawlerSettings,
    pub occupancy: CrawlerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            naver: CrawlerSettings::naver(),
            rooms: CrawlerSettings::rooms(),
            occupancy: CrawlerSettings::occupancy(),
        }
    }
}

impl Settings {
    /// Reads the settings file, or returns the defaults when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(text)?;
        let mut merged = match toml::Value::try_from(Self::default()) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(Error::Config("defaults are not a table".to_string())),
            Err(e) => return Err(Error::Config(format!("cannot encode defaults: {}", e))),
        };
        merge_tables(&mut merged, overrides);
        Ok(toml::Value::Table(merged).try_into()?)
    }
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match value {
            toml::Value::Table(update) => match base.get_mut(&key) {
                Some(toml::Value::Table(inner)) => merge_tables(inner, update),
                _ => {
                    base.insert(key, toml::Value::Table(update));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}
