//! Runtime configuration, read from the environment.

use std::{env, num::NonZeroUsize, str::FromStr};

use thiserror::Error;

use crate::statistics::StatisticsConfig;

pub const DEFAULT_OBJECT_STORE_PATH: &str = "./uploads";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Absent means tracks are kept in memory only.
    pub database_url: Option<String>,
    pub object_store_path: String,
    pub import_workers: usize,
    pub statistics: StatisticsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = StatisticsConfig::default();

        let statistics = StatisticsConfig {
            noise_threshold_meters: threshold(
                &lookup,
                "TRACKLOG_NOISE_THRESHOLD_M",
                defaults.noise_threshold_meters,
            )?,
            stillness_threshold_mps: threshold(
                &lookup,
                "TRACKLOG_STILLNESS_THRESHOLD_MPS",
                defaults.stillness_threshold_mps,
            )?,
        };

        let import_workers = match parsed::<usize>(&lookup, "TRACKLOG_IMPORT_WORKERS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "TRACKLOG_IMPORT_WORKERS",
                    value: "0".to_string(),
                });
            }
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            object_store_path: lookup("OBJECT_STORE_PATH")
                .unwrap_or_else(|| DEFAULT_OBJECT_STORE_PATH.to_string()),
            import_workers,
            statistics,
        })
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}

fn threshold(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    match parsed::<f64>(lookup, name)? {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(ConfigError::Invalid {
            name,
            value: v.to_string(),
        }),
        None => Ok(default),
    }
}
