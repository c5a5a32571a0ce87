use likeguard_core::GuardConfig;
use serde::Deserialize;
use std::time::Duration;

/// Service settings, loaded from an optional `likeguard.yaml` next to the
/// binary plus `LIKEGUARD_`-prefixed environment overrides
/// (e.g. `LIKEGUARD_REDIS_URL`, `LIKEGUARD_GUARD__COOLDOWN_MS`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: String,
    /// When unset the service runs on the in-memory store (single node,
    /// state lost on restart).
    pub redis_url: Option<String>,
    /// Bearer token required by the admin bulk-clear endpoint. When unset the
    /// endpoint refuses to operate rather than defaulting open.
    pub admin_token: Option<String>,
    pub guard: GuardSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub window_secs: u64,
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    pub network_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            redis_url: None,
            admin_token: None,
            guard: GuardSettings::default(),
        }
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        let defaults = GuardConfig::default();
        Self {
            window_secs: defaults.window.as_secs(),
            max_attempts: defaults.max_attempts,
            cooldown_ms: defaults.cooldown.as_millis() as u64,
            network_ttl_secs: defaults.network_ttl.as_secs(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(::config::File::with_name("likeguard").required(false))
            .add_source(::config::Environment::with_prefix("LIKEGUARD").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            window: Duration::from_secs(self.guard.window_secs),
            max_attempts: self.guard.max_attempts,
            cooldown: Duration::from_millis(self.guard.cooldown_ms),
            network_ttl: Duration::from_secs(self.guard.network_ttl_secs),
        }
    }
}
