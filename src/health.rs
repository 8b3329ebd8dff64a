//! CIO feed health check with an empty-feed streak

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::classifier::Tier;
use crate::error::Result;
use crate::store::{read_json_lenient, write_json_atomic};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    #[serde(default)]
    pub empty_streak: u32,
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default)]
    pub last_count: usize,
}

/// Why the check failed
#[derive(Debug, Clone, PartialEq)]
pub enum HealthFailure {
    MissingFeed,
    InvalidJson(String),
    MissingFields,
    EmptyFeed { streak: u32 },
}

impl std::fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthFailure::MissingFeed => write!(f, "feed file not found"),
            HealthFailure::InvalidJson(e) => write!(f, "invalid JSON: {}", e),
            HealthFailure::MissingFields => write!(f, "missing required fields (meta/candidates)"),
            HealthFailure::EmptyFeed { streak } => write!(f, "empty feed (streak {})", streak),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub count: usize,
    pub streak: u32,
    pub updated_at: Option<String>,
    pub failure: Option<HealthFailure>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct HealthCheck {
    feed_path: PathBuf,
    state_path: PathBuf,
    max_empty_streak: u32,
}

impl HealthCheck {
    pub fn new(signals_dir: &Path, state_dir: &Path, max_empty_streak: u32) -> Self {
        Self {
            feed_path: signals_dir.join(Tier::Cio.feed_file()),
            state_path: state_dir.join("health.json"),
            max_empty_streak: max_empty_streak.max(1),
        }
    }

    /// Inspect the CIO feed and update the streak
    ///
    /// `manual` fails on any empty feed instead of waiting for the streak.
    pub async fn run(&self, manual: bool) -> Result<HealthReport> {
        let mut state: HealthState = read_json_lenient(&self.state_path).await.unwrap_or_default();

        let (count, updated_at, failure) = match self.inspect().await {
            Ok((count, updated_at)) => (count, updated_at, None),
            Err(failure) => (0, None, Some(failure)),
        };

        let failure = match failure {
            Some(f) => {
                state.empty_streak += 1;
                Some(f)
            }
            None if count == 0 => {
                state.empty_streak += 1;
                warn!(streak = state.empty_streak, "Empty CIO feed");
                if manual || state.empty_streak >= self.max_empty_streak {
                    Some(HealthFailure::EmptyFeed {
                        streak: state.empty_streak,
                    })
                } else {
                    None
                }
            }
            None => {
                state.empty_streak = 0;
                None
            }
        };

        if failure.is_none() {
            state.last_check = Some(Utc::now().to_rfc3339());
            state.last_count = count;
        }
        write_json_atomic(&self.state_path, &state).await?;

        match &failure {
            Some(f) => warn!("Health check failed: {}", f),
            None => info!(count, streak = state.empty_streak, "Feed healthy"),
        }

        Ok(HealthReport {
            count,
            streak: state.empty_streak,
            updated_at,
            failure,
        })
    }

    async fn inspect(&self) -> std::result::Result<(usize, Option<String>), HealthFailure> {
        let data = match tokio::fs::read_to_string(&self.feed_path).await {
            Ok(data) => data,
            Err(_) => return Err(HealthFailure::MissingFeed),
        };
        let feed: serde_json::Value =
            serde_json::from_str(&data).map_err(|e| HealthFailure::InvalidJson(e.to_string()))?;

        let (Some(meta), Some(candidates)) = (feed.get("meta"), feed.get(Tier::Cio.feed_key())) else {
            return Err(HealthFailure::MissingFields);
        };
        let updated_at = meta
            .get("updated_at")
            .and_then(|v| v.as_str())
            .map(String::from);
        let count = candidates.as_array().map(Vec::len).unwrap_or(0);
        Ok((count, updated_at))
    }
}
