use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use dom::ResourceKind;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning for readiness rounds.
///
/// Timeouts are policy, not contractual minimums. Every field has a default so
/// partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub image_timeout_ms: u64,
    pub stylesheet_timeout_ms: u64,
    pub script_timeout_ms: u64,

    /// Re-check interval while the document is still parsing.
    pub ready_poll_interval_ms: u64,
    /// After this many re-checks the scan proceeds anyway.
    pub max_ready_polls: u32,

    /// Percentage published when a round starts.
    pub baseline_percentage: f64,
    /// Percentage published once the resource set is known.
    pub after_scan_percentage: f64,
    /// Loading progress is `loading_base + ratio * loading_span`, clamped to
    /// `[after_scan_percentage, 100]`.
    pub loading_base: f64,
    pub loading_span: f64,

    /// Hold between reaching 100% and flipping `ready`.
    pub settle_delay_ms: u64,

    /// Maximum retained trace events.
    pub trace_capacity: usize,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            image_timeout_ms: 5000,
            stylesheet_timeout_ms: 3000,
            script_timeout_ms: 4000,
            ready_poll_interval_ms: 50,
            max_ready_polls: 100,
            baseline_percentage: 10.0,
            after_scan_percentage: 30.0,
            loading_base: 0.0,
            loading_span: 100.0,
            settle_delay_ms: 250,
            trace_capacity: 512,
        }
    }
}

impl ReadinessConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies `READINESS_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies `READINESS_*` overrides from an arbitrary lookup.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        override_field(&lookup, "READINESS_IMAGE_TIMEOUT_MS", &mut self.image_timeout_ms)?;
        override_field(
            &lookup,
            "READINESS_STYLESHEET_TIMEOUT_MS",
            &mut self.stylesheet_timeout_ms,
        )?;
        override_field(&lookup, "READINESS_SCRIPT_TIMEOUT_MS", &mut self.script_timeout_ms)?;
        override_field(
            &lookup,
            "READINESS_READY_POLL_INTERVAL_MS",
            &mut self.ready_poll_interval_ms,
        )?;
        override_field(&lookup, "READINESS_MAX_READY_POLLS", &mut self.max_ready_polls)?;
        override_field(
            &lookup,
            "READINESS_BASELINE_PERCENTAGE",
            &mut self.baseline_percentage,
        )?;
        override_field(
            &lookup,
            "READINESS_AFTER_SCAN_PERCENTAGE",
            &mut self.after_scan_percentage,
        )?;
        override_field(&lookup, "READINESS_LOADING_BASE", &mut self.loading_base)?;
        override_field(&lookup, "READINESS_LOADING_SPAN", &mut self.loading_span)?;
        override_field(&lookup, "READINESS_SETTLE_DELAY_MS", &mut self.settle_delay_ms)?;
        override_field(&lookup, "READINESS_TRACE_CAPACITY", &mut self.trace_capacity)?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, ms) in [
            ("image_timeout_ms", self.image_timeout_ms),
            ("stylesheet_timeout_ms", self.stylesheet_timeout_ms),
            ("script_timeout_ms", self.script_timeout_ms),
            ("ready_poll_interval_ms", self.ready_poll_interval_ms),
        ] {
            if ms == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if !(0.0..100.0).contains(&self.baseline_percentage) {
            return Err(invalid("baseline_percentage", "must be in [0, 100)"));
        }
        if !(self.baseline_percentage..100.0).contains(&self.after_scan_percentage) {
            return Err(invalid(
                "after_scan_percentage",
                "must be in [baseline_percentage, 100)",
            ));
        }
        if self.loading_span.is_nan()
            || self.loading_span <= 0.0
            || !self.loading_base.is_finite()
        {
            return Err(invalid("loading_span", "must be positive with a finite base"));
        }
        if self.trace_capacity == 0 {
            return Err(invalid("trace_capacity", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        Duration::from_millis(match kind {
            ResourceKind::Image => self.image_timeout_ms,
            ResourceKind::Stylesheet => self.stylesheet_timeout_ms,
            ResourceKind::Script => self.script_timeout_ms,
        })
    }

    /// Upper bound on the loading phase: timeouts run concurrently.
    pub fn max_timeout(&self) -> Duration {
        ResourceKind::ALL
            .into_iter()
            .map(|k| self.timeout_for(k))
            .max()
            .unwrap_or_default()
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Percentage for `resolved` of `total` resources while loading.
    pub fn loading_percentage(&self, resolved: usize, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        let ratio = resolved.min(total) as f64 / total as f64;
        (self.loading_base + ratio * self.loading_span).clamp(self.after_scan_percentage, 100.0)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn override_field<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *slot = value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value,
        expected: std::any::type_name::<T>(),
    })?;
    Ok(())
}
