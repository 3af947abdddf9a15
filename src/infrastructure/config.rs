use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub operator: OperatorSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub endpoint: String,
    pub enable_simulation: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            enable_simulation: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
    pub randomization_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            timeout_ms: 20000,
            randomization_factor: 0.5,
        }
    }
}

impl ReconnectSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Exponential backoff for the given zero-based attempt, capped at `max_delay_ms`.
    /// `unit` is a sample in `[0, 1)` used for jitter.
    pub fn backoff_delay(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.initial_delay_ms as f64 * 2f64.powi(attempt.min(30) as i32);
        let deviation = unit * self.randomization_factor * base;
        // low half of the unit interval shortens the delay, high half lengthens it
        let jittered = if unit < 0.5 { base - deviation } else { base + deviation };
        Duration::from_millis(jittered.clamp(0.0, self.max_delay_ms as f64) as u64)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub grace_period_ms: u64,
    pub tick_ms: u64,
    pub origin_latitude: f64,
    pub origin_longitude: f64,
    pub max_step_deg: f64,
    pub half_extent_deg: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 3000,
            tick_ms: 5000,
            origin_latitude: 25.8010,
            origin_longitude: -80.1994,
            max_step_deg: 0.001,
            half_extent_deg: 0.01,
        }
    }
}

impl SimulationSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: SocketAddr,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OperatorSettings {
    /// Republish the last operator fix this often while broadcasting; 0 disables.
    pub auto_publish_secs: u64,
}

impl OperatorSettings {
    pub fn auto_publish_interval(&self) -> Option<Duration> {
        (self.auto_publish_secs > 0).then(|| Duration::from_secs(self.auto_publish_secs))
    }
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/channel").required(false))
        .add_source(config::Environment::with_prefix("LOCATION").separator("__"))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> anyhow::Result<()> {
    anyhow::ensure!(!config.server.endpoint.trim().is_empty(), "server.endpoint must not be empty");
    anyhow::ensure!(config.simulation.tick_ms > 0, "simulation.tick_ms must be positive");
    anyhow::ensure!(
        config.simulation.max_step_deg >= 0.0 && config.simulation.max_step_deg.is_finite(),
        "simulation.max_step_deg must be a non-negative number"
    );
    anyhow::ensure!(
        config.simulation.half_extent_deg > 0.0 && config.simulation.half_extent_deg.is_finite(),
        "simulation.half_extent_deg must be positive"
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&config.reconnect.randomization_factor),
        "reconnect.randomization_factor must be within [0, 1]"
    );
    Ok(())
}
