use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::*;
use r2d2::Pool;
use serde::{Deserialize, Serialize};

use infra::persistence::DocumentConnectionManager;

const ENV_PREFIX: &str = "FOOD_MANAGER_";

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct Config {
    pub db: DbConfig,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct DbConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Throw the database away once the last handle is dropped.
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl DbConfig {
    pub fn temporary() -> Self {
        DbConfig {
            path: None,
            temporary: true,
        }
    }

    /// Reads `FOOD_MANAGER_PATH` / `FOOD_MANAGER_TEMPORARY`.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<DbConfig>()
            .context("read database config from environment")
    }

    pub(crate) fn build(&self) -> Result<Pool<DocumentConnectionManager>> {
        debug!("Build pool from {:?}", self);

        let mut sled_config = sled::Config::new().temporary(self.temporary);
        match self.path.as_ref() {
            Some(path) => sled_config = sled_config.path(path),
            None if self.temporary => {}
            None => bail!("No database path configured"),
        }
        let db = sled_config.open().context("open sled database")?;
        let manager = DocumentConnectionManager::new(db);

        let builder = r2d2::Pool::builder();

        debug!("Pool builder: {:?}", builder);
        let pool = builder.build(manager).context("build pool")?;

        Ok(pool)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}
