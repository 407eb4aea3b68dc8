// Ladder configuration: defaults, layered loading and validation
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix, e.g. `LADDER_MAX_LOOPS=50`
pub const ENV_PREFIX: &str = "LADDER";

/// Target ladder shape and volatility thresholds
///
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LadderConfig {
    /// Size of every order placed
    pub quantity: f64,
    /// Instrument symbol, informational
    pub symbol: String,
    /// Target rung distances in bps, one slot per side per rung
    pub bps_ladder: Vec<f64>,
    /// Distance used for every top-up order
    pub replacement_bps: f64,
    /// Orders closer than this are cancelled (risk of execution)
    pub min_distance_bps: f64,
    /// Orders further than this are cancelled (risk of never filling)
    pub max_distance_bps: f64,
    /// Cycle limit; zero or negative runs forever
    pub max_loops: i64,
    /// Enables the volatility gate
    pub use_indicators: bool,
    /// Skip placement when ATR moves by more than this between cycles
    pub atr_change_threshold: f64,
    /// Skip placement when ATR is above this
    pub max_atr: f64,
    pub timing: TimingConfig,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            quantity: 0.001,
            symbol: "btc-usd".to_string(),
            bps_ladder: vec![6.0, 7.0, 8.0],
            replacement_bps: 6.0,
            min_distance_bps: 1.5,
            max_distance_bps: 10.0,
            max_loops: 1000,
            use_indicators: true,
            atr_change_threshold: 2.0,
            max_atr: 20.0,
            timing: TimingConfig::default(),
        }
    }
}

/// What to do when a tick fires while the previous cycle is still running
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start the new cycle anyway; cycles may race on venue state
    #[default]
    Allow,
    /// Skip the tick without counting it
    SkipIfBusy,
}

/// Schedule period, settle delays and element timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub cycle_interval_secs: u64,
    pub overlap_policy: OverlapPolicy,
    /// Pause after confirming a position close
    pub close_settle_ms: u64,
    /// Pause after the whole close pass, before reading orders
    pub post_close_settle_ms: u64,
    /// Pause after each cancellation
    pub cancel_settle_ms: u64,
    /// Pause after the cancellation pass, before re-reading orders
    pub post_cancel_settle_ms: u64,
    /// Pause after each placement attempt
    pub placement_delay_ms: u64,
    /// Pause after writing into an entry field
    pub input_settle_ms: u64,
    /// Pause before looking up the submit control
    pub pre_submit_ms: u64,
    /// Bound on every wait for an element to appear
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 30,
            overlap_policy: OverlapPolicy::Allow,
            close_settle_ms: 500,
            post_close_settle_ms: 2000,
            cancel_settle_ms: 500,
            post_cancel_settle_ms: 2000,
            placement_delay_ms: 500,
            input_settle_ms: 100,
            pre_submit_ms: 200,
            element_timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    /// Never zero; a zero period is rejected by validation anyway
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.max(1))
    }

    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }

    pub fn post_close_settle(&self) -> Duration {
        Duration::from_millis(self.post_close_settle_ms)
    }

    pub fn cancel_settle(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_ms)
    }

    pub fn post_cancel_settle(&self) -> Duration {
        Duration::from_millis(self.post_cancel_settle_ms)
    }

    pub fn placement_delay(&self) -> Duration {
        Duration::from_millis(self.placement_delay_ms)
    }

    pub fn input_settle(&self) -> Duration {
        Duration::from_millis(self.input_settle_ms)
    }

    pub fn pre_submit(&self) -> Duration {
        Duration::from_millis(self.pre_submit_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Zero delays everywhere, for tests that do not care about pacing
    pub fn immediate() -> Self {
        Self {
            cycle_interval_secs: 30,
            overlap_policy: OverlapPolicy::Allow,
            close_settle_ms: 0,
            post_close_settle_ms: 0,
            cancel_settle_ms: 0,
            post_cancel_settle_ms: 0,
            placement_delay_ms: 0,
            input_settle_ms: 0,
            pre_submit_ms: 0,
            element_timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl LadderConfig {
    /// Load from an optional file plus `LADDER_*` environment variables
    ///
    /// Missing keys fall back to [`LadderConfig::default`]. Nested timing keys use a
    /// double underscore: `LADDER_TIMING__CYCLE_INTERVAL_SECS=10`. The ladder is a
    /// comma-separated list: `LADDER_BPS_LADDER=5,7,9`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bps_ladder")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: LadderConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Number of target slots per side
    pub fn rungs(&self) -> usize {
        self.bps_ladder.len()
    }

    /// True when `max_loops` bounds the run
    pub fn is_bounded(&self) -> bool {
        self.max_loops > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bps_ladder.is_empty() {
            return Err(ConfigError::Invalid("bps_ladder must not be empty".into()));
        }
        if let Some(bad) = self
            .bps_ladder
            .iter()
            .find(|bps| !bps.is_finite() || **bps <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "bps_ladder rungs must be positive, got {}",
                bad
            )));
        }
        if !self.replacement_bps.is_finite() || self.replacement_bps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "replacement_bps must be positive, got {}",
                self.replacement_bps
            )));
        }
        if !(self.min_distance_bps < self.max_distance_bps) {
            return Err(ConfigError::Invalid(format!(
                "min_distance_bps ({}) must be below max_distance_bps ({})",
                self.min_distance_bps, self.max_distance_bps
            )));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        if self.max_atr <= 0.0 || self.atr_change_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_atr ({}) must be positive and atr_change_threshold ({}) non-negative",
                self.max_atr, self.atr_change_threshold
            )));
        }
        if self.timing.cycle_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.cycle_interval_secs must be at least 1".into(),
            ));
        }

        if self.replacement_bps < self.min_distance_bps
            || self.replacement_bps > self.max_distance_bps
        {
            tracing::warn!(
                "replacement_bps {} lies outside the resting band [{}, {}]; top-up orders will be cancelled next cycle",
                self.replacement_bps,
                self.min_distance_bps,
                self.max_distance_bps
            );
        }

        Ok(())
    }
}
