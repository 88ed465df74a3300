//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Reservation policy configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Same-day reservations cannot be cancelled this close to their start
    #[serde(default = "default_cancellation_window")]
    pub cancellation_window_minutes: i64,

    /// Upper bound on a single payment gateway call
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// Length of the slots offered by the availability listing
    #[serde(default = "default_slot_length")]
    pub slot_length_minutes: i64,
}

fn default_cancellation_window() -> i64 {
    120
}

fn default_gateway_timeout() -> u64 {
    10
}

fn default_slot_length() -> i64 {
    60
}

/// Completion sweeper configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    /// Seconds between two completion sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("booking.cancellation_window_minutes", 120)?
            .set_default("booking.gateway_timeout_secs", 10)?
            .set_default("booking.slot_length_minutes", 60)?
            .set_default("sweeper.interval_secs", 300)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with TURF_ prefix
            .add_source(
                Environment::with_prefix("TURF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            cancellation_window_minutes: default_cancellation_window(),
            gateway_timeout_secs: default_gateway_timeout(),
            slot_length_minutes: default_slot_length(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}
