use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tracing::{info, warn};

use crate::optimizer::PlanningConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub planner: PlannerConfig,
    pub remote: RemoteConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            planner: PlannerConfig::from_env(),
            remote: RemoteConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("BEAM_STACKER_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse BEAM_STACKER_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("BEAM_STACKER_API_PORT") {
            Some(raw) => parse_port(&raw).unwrap_or(Self::DEFAULT_PORT),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            display_host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) => {
            warn!("⚠️ BEAM_STACKER_API_PORT must not be 0. Using default port.");
            None
        }
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "⚠️ Could not parse BEAM_STACKER_API_PORT ('{}'): {}. Using default port.",
                raw, err
            );
            None
        }
    }
}

/// Configuration for the planning heuristic.
#[derive(Clone, Debug, Default)]
pub struct PlannerConfig {
    planning: PlanningConfig,
}

impl PlannerConfig {
    const LARGE_THRESHOLD_VAR: &'static str = "BEAM_STACKER_PLANNER_LARGE_LENGTH_THRESHOLD";
    const MEDIUM_MIN_VAR: &'static str = "BEAM_STACKER_PLANNER_MEDIUM_MIN_LENGTH";
    const MEDIUM_MAX_RATIO_VAR: &'static str = "BEAM_STACKER_PLANNER_MEDIUM_MAX_RATIO";
    const LONG_RATIO_VAR: &'static str = "BEAM_STACKER_PLANNER_LONG_RATIO";
    const EPSILON_VAR: &'static str = "BEAM_STACKER_PLANNER_LENGTH_EPSILON";
    const BALANCE_ROWS_VAR: &'static str = "BEAM_STACKER_PLANNER_BALANCE_ROWS";

    fn from_env() -> Self {
        let large_length_threshold = load_f64_with_warning(
            Self::LARGE_THRESHOLD_VAR,
            PlanningConfig::DEFAULT_LARGE_LENGTH_THRESHOLD,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted large-length threshold changes bundle sizes",
        );

        let medium_min_length = load_f64_with_warning(
            Self::MEDIUM_MIN_VAR,
            PlanningConfig::DEFAULT_MEDIUM_MIN_LENGTH,
            |value| value >= 0.0,
            "must not be negative",
            "Adjusted medium band changes the placement order",
        );

        let medium_max_ratio = load_f64_with_warning(
            Self::MEDIUM_MAX_RATIO_VAR,
            PlanningConfig::DEFAULT_MEDIUM_MAX_RATIO,
            |value| value > 0.0 && value <= 1.0,
            "must be in (0, 1]",
            "Adjusted medium band changes the placement order",
        );

        let long_ratio = load_f64_with_warning(
            Self::LONG_RATIO_VAR,
            PlanningConfig::DEFAULT_LONG_RATIO,
            |value| value > 0.0 && value <= 1.0,
            "must be in (0, 1]",
            "Adjusted long-package ratio changes the placement order",
        );

        let length_epsilon = load_f64_with_warning(
            Self::EPSILON_VAR,
            PlanningConfig::DEFAULT_LENGTH_EPSILON,
            |value| value > 0.0 && value < 0.01,
            "must be in (0, 0.01)",
            "Adjusted length tolerance may overfill rows",
        );

        let balance_rows = env_string(Self::BALANCE_ROWS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::BALANCE_ROWS_VAR))
            .unwrap_or(PlanningConfig::DEFAULT_BALANCE_ROWS);

        let planning = PlanningConfig::builder()
            .large_length_threshold(large_length_threshold)
            .medium_min_length(medium_min_length)
            .medium_max_ratio(medium_max_ratio)
            .long_ratio(long_ratio)
            .length_epsilon(length_epsilon)
            .balance_rows(balance_rows)
            .build();

        Self { planning }
    }

    /// Returns the configured PlanningConfig.
    pub fn planning_config(&self) -> PlanningConfig {
        self.planning
    }
}

/// Configuration for the remote optimizer.
///
/// The remote path is disabled while no URL is set.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Duration,
}

impl RemoteConfig {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Remote configuration pointing at `url`, with defaults for the rest.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn from_env() -> Self {
        let timeout_secs = match env_string("BEAM_STACKER_REMOTE_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if value > 0 => value,
                _ => {
                    warn!(
                        "⚠️ BEAM_STACKER_REMOTE_TIMEOUT_SECS ('{}') must be a positive integer. Using {}s.",
                        raw,
                        Self::DEFAULT_TIMEOUT_SECS
                    );
                    Self::DEFAULT_TIMEOUT_SECS
                }
            },
            None => Self::DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            url: env_string("BEAM_STACKER_REMOTE_URL"),
            api_key: env_string("BEAM_STACKER_REMOTE_API_KEY"),
            model: env_string("BEAM_STACKER_REMOTE_MODEL"),
            timeout: Duration::from_secs(timeout_secs),
        };
        if let Some(url) = config.url() {
            info!("🌐 Remote optimizer enabled at {}", url);
        }
        config
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            model: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub(crate) fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_f64_checked(
    var_name: &str,
    raw: &str,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && validator(value) => Some(value),
        Ok(_) => {
            warn!(
                "⚠️ {} contains invalid value '{}': {}. Using default value.",
                var_name, raw, invalid_hint
            );
            None
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}') as number: {}. Using default value.",
                var_name, raw, err
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    let Some(raw) = env_string(var_name) else {
        return default;
    };
    let Some(value) = parse_f64_checked(var_name, &raw, validator, invalid_hint) else {
        return default;
    };
    let tolerance = (default.abs().max(1.0)) * 1e-9;
    if (value - default).abs() > tolerance {
        warn!("⚠️ {} ({} = {}).", warning, var_name, value);
    }
    value
}
