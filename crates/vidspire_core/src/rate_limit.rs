use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Millis;

pub const DEFAULT_DAILY_LIMIT: u32 = 2;

/// Rate-limited backend features, named by their `/usage/:feature` slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    CommentAnalyzer,
    IdeaValidator,
    ViralSearch,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::CommentAnalyzer,
        Feature::IdeaValidator,
        Feature::ViralSearch,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Feature::CommentAnalyzer => "comment-analyzer",
            Feature::IdeaValidator => "idea-validator",
            Feature::ViralSearch => "viral-search",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feature `{0}` (expected comment-analyzer, idea-validator or viral-search)")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.slug() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Rate-limit headers as reported on a rate-limited response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    /// Seconds until the window resets.
    pub reset: Option<u64>,
    pub retry_after: Option<u64>,
}

/// Last known usage window for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub limit: u32,
    /// Seconds until reset, counted from `observed_at`.
    pub reset_in: Option<u64>,
    pub is_exhausted: bool,
    #[serde(default)]
    pub observed_at: Millis,
}

impl Default for RateLimitSnapshot {
    fn default() -> Self {
        Self {
            remaining: DEFAULT_DAILY_LIMIT,
            limit: DEFAULT_DAILY_LIMIT,
            reset_in: None,
            is_exhausted: false,
            observed_at: 0,
        }
    }
}

impl RateLimitSnapshot {
    /// Folds response headers into the snapshot. Returns whether anything
    /// changed; responses without `X-RateLimit-Remaining` are ignored.
    pub fn apply_headers(&mut self, headers: &RateLimitHeaders, now: Millis) -> bool {
        let Some(remaining) = headers.remaining else {
            return false;
        };
        let before = self.clone();
        self.remaining = remaining;
        if let Some(limit) = headers.limit {
            self.limit = limit;
        }
        if headers.reset.is_some() {
            self.reset_in = headers.reset;
        }
        self.is_exhausted = remaining == 0;
        self.observed_at = now;
        *self != before
    }

    /// Whether submissions must be refused at `now`.
    ///
    /// An exhausted snapshot stops applying once its reset has elapsed.
    pub fn is_limited_at(&self, now: Millis) -> bool {
        if !self.is_exhausted {
            return false;
        }
        match self.reset_in {
            Some(seconds) => now < self.reset_at(seconds),
            None => true,
        }
    }

    /// Seconds left in the window at `now`, if the reset is known.
    pub fn reset_in_at(&self, now: Millis) -> Option<u64> {
        self.reset_in.map(|seconds| {
            let left = self.reset_at(seconds).saturating_sub(now).max(0);
            (left / 1000) as u64
        })
    }

    pub fn limit_message(&self, now: Millis) -> String {
        let seconds = self.reset_in_at(now).unwrap_or(0);
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        format!("Rate limit reached. Resets in {hours}h {minutes}m")
    }

    fn reset_at(&self, seconds: u64) -> Millis {
        let millis = Millis::try_from(seconds.saturating_mul(1000)).unwrap_or(Millis::MAX);
        self.observed_at.saturating_add(millis)
    }
}

/// Human-readable reset countdown: `3h 5m`, `12m`, `40s` or `soon`.
pub fn format_reset_time(seconds: Option<u64>) -> String {
    let seconds = match seconds {
        Some(seconds) if seconds > 0 => seconds,
        _ => return "soon".to_string(),
    };
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}
