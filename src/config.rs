use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tracing::{info, warn};

use crate::genetic::{ChromosomeKind, GeneticConfig};
use crate::optimizer::PackingConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
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
    const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("LOAD_IT_NOW_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse LOAD_IT_NOW_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_BIND_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match env_string("LOAD_IT_NOW_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "⚠️ LOAD_IT_NOW_API_PORT must not be 0. Using {}.",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse LOAD_IT_NOW_API_PORT ('{}'): {}. Using {}.",
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
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

    /// Configured port.
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

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for placement scoring and the genetic search.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
    packing: PackingConfig,
    genetic: GeneticConfig,
}

impl OptimizerConfig {
    const CENTERING_WEIGHT_VAR: &'static str = "LOAD_IT_NOW_CENTERING_WEIGHT";
    const HEIGHT_EPSILON_VAR: &'static str = "LOAD_IT_NOW_HEIGHT_EPSILON";
    const GENERAL_EPSILON_VAR: &'static str = "LOAD_IT_NOW_GENERAL_EPSILON";
    const PREFER_FIRST_TIE_VAR: &'static str = "LOAD_IT_NOW_PREFER_FIRST_TIE";
    const POPULATION_VAR: &'static str = "LOAD_IT_NOW_GA_POPULATION";
    const GENERATIONS_VAR: &'static str = "LOAD_IT_NOW_GA_GENERATIONS";
    const MUTATION_RATE_VAR: &'static str = "LOAD_IT_NOW_GA_MUTATION_RATE";
    const GROUP_SHUFFLE_RATE_VAR: &'static str = "LOAD_IT_NOW_GA_GROUP_SHUFFLE_RATE";
    const VARIANT_VAR: &'static str = "LOAD_IT_NOW_GA_VARIANT";
    const SEED_VAR: &'static str = "LOAD_IT_NOW_GA_SEED";
    const PARALLEL_VAR: &'static str = "LOAD_IT_NOW_GA_PARALLEL";

    fn from_env() -> Self {
        let centering_weight = load_f64_with_warning(
            Self::CENTERING_WEIGHT_VAR,
            PackingConfig::DEFAULT_CENTERING_WEIGHT,
            |value| value >= 0.0,
            "must not be negative",
            "Adjusted centering weight may let the width balance dominate loading meters",
        );

        let height_epsilon = load_f64_with_warning(
            Self::HEIGHT_EPSILON_VAR,
            PackingConfig::DEFAULT_HEIGHT_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted height tolerance may accept uneven support",
        );

        let general_epsilon = load_f64_with_warning(
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted tolerances may cause numerical instabilities",
        );

        let prefer_first_tie = env_string(Self::PREFER_FIRST_TIE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PREFER_FIRST_TIE_VAR))
            .unwrap_or(PackingConfig::DEFAULT_PREFER_FIRST_TIE);

        let packing = PackingConfig::builder()
            .centering_weight(centering_weight)
            .height_epsilon(height_epsilon)
            .general_epsilon(general_epsilon)
            .prefer_first_tie(prefer_first_tie)
            .build();

        let population_size = load_parsed_with_warning(
            Self::POPULATION_VAR,
            GeneticConfig::DEFAULT_POPULATION_SIZE,
            |value: &usize| *value > 0,
            "must be greater than 0",
        );

        let generations = load_parsed_with_warning(
            Self::GENERATIONS_VAR,
            GeneticConfig::DEFAULT_GENERATIONS,
            |_: &usize| true,
            "",
        );

        let mutation_rate = load_f64_with_warning(
            Self::MUTATION_RATE_VAR,
            GeneticConfig::DEFAULT_MUTATION_RATE,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted mutation rate changes how fast load orders diverge",
        );

        let group_shuffle_rate = load_f64_with_warning(
            Self::GROUP_SHUFFLE_RATE_VAR,
            GeneticConfig::DEFAULT_GROUP_SHUFFLE_RATE,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted group shuffle rate changes how fast load orders diverge",
        );

        let kind = load_parsed_with_warning(
            Self::VARIANT_VAR,
            ChromosomeKind::default(),
            |_: &ChromosomeKind| true,
            "",
        );

        let seed = env_string(Self::SEED_VAR).and_then(|raw| match raw.parse::<u64>() {
            Ok(seed) => {
                info!("🎲 Using fixed seed {} for the genetic search", seed);
                Some(seed)
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using a random seed.",
                    Self::SEED_VAR,
                    raw,
                    err
                );
                None
            }
        });

        let parallel = env_string(Self::PARALLEL_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_VAR))
            .unwrap_or(GeneticConfig::DEFAULT_PARALLEL);

        let genetic = GeneticConfig::builder()
            .population_size(population_size)
            .generations(generations)
            .mutation_rate(mutation_rate)
            .group_shuffle_rate(group_shuffle_rate)
            .kind(kind)
            .seed(seed)
            .parallel(parallel)
            .build();

        Self { packing, genetic }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }

    /// Returns the configured GeneticConfig.
    pub fn genetic_config(&self) -> GeneticConfig {
        self.genetic
    }
}

fn env_string(name: &str) -> Option<String> {
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

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !value.is_finite() || !validator(value) {
                    warn!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        warn!("⚠️ {} ({} = {}).", warning, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

/// Parses any `FromStr` value, falling back to `default` with a warning.
fn load_parsed_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_string(var_name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(&value) => value,
        Ok(_) => {
            warn!(
                "⚠️ {} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}
