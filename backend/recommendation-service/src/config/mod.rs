use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::inference::{ModelSwitch, ProcessSettings};
use crate::services::recompute::EngineSettings;
use crate::services::registry::{ModelRegistry, DEFAULT_INFERENCE_MODELS};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardBackend {
    Local,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config
    pub http_host: String,
    pub http_port: u16,

    // PostgreSQL
    pub database_url: String,
    pub db_max_connections: u32,

    // Engine
    pub eligible_role: String,
    pub active_status: String,
    pub output_size: usize,

    // Inference process
    pub inference_enabled: bool,
    pub inference_program: String,
    pub inference_script: String,
    pub inference_workdir: Option<String>,
    pub inference_timeout_secs: u64,
    /// Comma-separated, in declaration order
    pub inference_models: String,
    pub inference_allowed_models: String,
    pub inference_disabled_models: String,
    pub inference_parallel: bool,

    // Concurrency guard
    pub guard_backend: GuardBackend,

    // Observability
    pub log_level: String,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8090)?
            .set_default("db_max_connections", 10)?
            .set_default("eligible_role", "R2")?
            .set_default("active_status", "S1")?
            .set_default("output_size", 10)?
            .set_default("inference_enabled", true)?
            .set_default("inference_program", "python3")?
            .set_default("inference_script", "models/recommend_api.py")?
            .set_default("inference_timeout_secs", 120)? // 2 minutes
            .set_default("inference_models", DEFAULT_INFERENCE_MODELS.join(","))?
            .set_default("inference_allowed_models", "")?
            .set_default("inference_disabled_models", "")?
            .set_default("inference_parallel", false)?
            .set_default("guard_backend", "local")?
            .set_default("log_level", "info")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.database_url.is_empty() {
            return Err(anyhow!("Database URL is required"));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow!("Database pool needs at least one connection"));
        }

        if self.eligible_role.trim().is_empty() {
            return Err(anyhow!("Eligible role is required"));
        }

        if self.output_size == 0 || self.output_size > 100 {
            return Err(anyhow!("Output size must be between 1 and 100"));
        }

        if self.inference_enabled {
            if self.inference_program.trim().is_empty() {
                return Err(anyhow!("Inference program is required when inference is enabled"));
            }
            if self.inference_timeout_secs == 0 {
                return Err(anyhow!("Inference timeout must be greater than 0"));
            }
        }

        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            output_size: self.output_size,
            eligible_role: self.eligible_role.trim().to_string(),
        }
    }

    pub fn model_registry(&self) -> ModelRegistry {
        ModelRegistry::new(split_list(&self.inference_models))
    }

    pub fn model_switch(&self) -> ModelSwitch {
        ModelSwitch::allow_all()
            .with_allowed(split_list(&self.inference_allowed_models))
            .with_denied(split_list(&self.inference_disabled_models))
    }

    pub fn inference_settings(&self) -> ProcessSettings {
        let mut args = Vec::new();
        let is_python = Path::new(&self.inference_program)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("python"));
        if is_python {
            args.push("-u".to_string());
        }
        if !self.inference_script.trim().is_empty() {
            args.push(self.inference_script.trim().to_string());
        }

        ProcessSettings {
            program: self.inference_program.clone(),
            args,
            workdir: self
                .inference_workdir
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            timeout: Duration::from_secs(self.inference_timeout_secs),
        }
    }
}
