//! Configuration loading for the Payflex gateway.
//!
//! Configuration is read from a TOML, JSON or YAML file (chosen by
//! extension), `${VAR}` references are substituted from the environment,
//! `PAYFLEX_`-prefixed variables override common settings, and the result is
//! validated before use.

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Self::Toml),
			Some("json") => Ok(Self::Json),
			Some("yaml") | Some("yml") => Ok(Self::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				path.display()
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "PAYFLEX_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		let mut config = self.load_from_file(file_path).await?;
		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		info!(
			gateway = %config.gateway.name,
			environment = %config.provider.environment,
			"Configuration loaded"
		);
		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}
		let format = ConfigFormat::from_path(path)?;
		let content = tokio::fs::read_to_string(path).await?;
		let substituted = self.substitute_env_vars(&content)?;
		parse_config(&substituted, format)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
		let mut result = content.to_string();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn var(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Some(log_level) = self.var("LOG_LEVEL") {
			config.gateway.log_level = log_level;
		}

		if let Some(http_port) = self.var("HTTP_PORT") {
			config.gateway.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Some(environment) = self.var("ENVIRONMENT") {
			debug!("Overriding provider environment from environment");
			config.provider.environment = environment;
		}

		if let Some(client_id) = self.var("CLIENT_ID") {
			debug!("Overriding client id from environment");
			config.provider.client_id = client_id;
		}

		if let Some(client_secret) = self.var("CLIENT_SECRET") {
			debug!("Overriding client secret from environment");
			config.provider.client_secret = client_secret;
		}

		if let Some(flag) = self.var("DEBUG") {
			config.gateway.debug = matches!(flag.as_str(), "1" | "true" | "yes");
		}

		Ok(())
	}
}

/// Parses configuration text in the given format without validating it.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
	match format {
		ConfigFormat::Toml => {
			toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Json => {
			serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Yaml => {
			serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
	}
}

/// Structural and cross-field validation.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	config
		.validate()
		.map_err(|e| ConfigError::ValidationError(e.to_string()))?;

	let Some(environment) = config.provider.active_environment() else {
		return Err(ConfigError::ValidationError(format!(
			"Provider environment '{}' not configured",
			config.provider.environment
		)));
	};
	environment
		.validate()
		.map_err(|e| ConfigError::ValidationError(e.to_string()))?;

	if !matches!(config.storage.backend.as_str(), "memory" | "file") {
		return Err(ConfigError::ValidationError(format!(
			"Unknown storage backend '{}'",
			config.storage.backend
		)));
	}

	if !matches!(config.orders.backend.as_str(), "memory" | "storage") {
		return Err(ConfigError::ValidationError(format!(
			"Unknown order store backend '{}'",
			config.orders.backend
		)));
	}

	if config.sweeper.new_order_minutes >= config.sweeper.max_age_minutes {
		return Err(ConfigError::ValidationError(
			"sweeper.new_order_minutes must be less than sweeper.max_age_minutes".to_string(),
		));
	}

	if config.provider.token_expiry_margin_secs >= 3600 {
		return Err(ConfigError::ValidationError(
			"provider.token_expiry_margin_secs must be under an hour".to_string(),
		));
	}

	Ok(())
}
