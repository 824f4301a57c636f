use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_LOG_LEVEL: &str = "listening_coach=info";

/// Main configuration structure loaded from listening_coach.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Settings for the generative service and the gateway's retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub retry_delay_secs: u64,
    /// Bearer token; never serialized back out
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            max_attempts: 3,
            attempt_timeout_secs: 180,
            retry_delay_secs: 3,
            api_key: None,
        }
    }
}

impl GatewayConfig {
    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retry_delay_secs)
    }
}

/// Attempt budgets and recommendation post-processing knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub feedback_attempts: u32,
    pub speaking_attempts: u32,
    pub max_recommendations: usize,
    pub default_match_score: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            feedback_attempts: 2,
            speaking_attempts: 2,
            max_recommendations: 3,
            default_match_score: 0.7,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn load_from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            synthesis: SynthesisConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses LISTENING_COACH_CONFIG or defaults to "listening_coach.toml"
    pub fn load() -> anyhow::Result<Self> {
        // 1) LC_ENV_FILE if set
        // 2) ./.env
        // 3) ../.env when the key is still missing
        if let Ok(env_path) = std::env::var("LC_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
            if std::env::var("DEEPSEEK_API_KEY").is_err() {
                let _ = dotenvy::from_path("../.env");
            }
        }

        let config_path = std::env::var("LISTENING_COACH_CONFIG")
            .unwrap_or_else(|_| "listening_coach.toml".to_string());

        let path = std::path::Path::new(&config_path);
        let mut config = if path.exists() {
            Self::from_path(path)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate();
        Ok(config)
    }

    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Env-first overrides for the gateway and synthesis sections
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY")
            && !key.trim().is_empty()
        {
            self.gateway.api_key = Some(key.trim().to_string());
        }
        if let Ok(endpoint) = std::env::var("LC_API_ENDPOINT") {
            self.gateway.endpoint = endpoint;
            tracing::debug!("LC_API_ENDPOINT env override applied");
        }
        if let Ok(model) = std::env::var("LC_MODEL") {
            self.gateway.model = model;
        }
        if let Some(v) = env_parse("LC_MAX_TOKENS") {
            self.gateway.max_tokens = v;
        }
        if let Some(v) = env_parse("LC_TEMPERATURE") {
            self.gateway.temperature = v;
        }
        if let Some(v) = env_parse("LC_MAX_ATTEMPTS") {
            self.gateway.max_attempts = v;
        }
        if let Some(v) = env_parse("LC_ATTEMPT_TIMEOUT_SECS") {
            self.gateway.attempt_timeout_secs = v;
        }
        if let Some(v) = env_parse("LC_RETRY_DELAY_SECS") {
            self.gateway.retry_delay_secs = v;
        }
        if let Some(v) = env_parse("LC_FEEDBACK_ATTEMPTS") {
            self.synthesis.feedback_attempts = v;
        }
        if let Some(v) = env_parse("LC_SPEAKING_ATTEMPTS") {
            self.synthesis.speaking_attempts = v;
        }
    }

    /// Clamp out-of-range values; nothing here is fatal
    pub fn validate(&mut self) {
        if !self.gateway.endpoint.starts_with("http://")
            && !self.gateway.endpoint.starts_with("https://")
        {
            tracing::warn!(
                "Endpoint '{}' doesn't start with http:// or https://",
                self.gateway.endpoint
            );
        }

        self.gateway.max_attempts = clamp_attempts("gateway.max_attempts", self.gateway.max_attempts);
        self.synthesis.feedback_attempts =
            clamp_attempts("synthesis.feedback_attempts", self.synthesis.feedback_attempts);
        self.synthesis.speaking_attempts =
            clamp_attempts("synthesis.speaking_attempts", self.synthesis.speaking_attempts);

        if !(0.0..=2.0).contains(&self.gateway.temperature) {
            tracing::warn!(
                "temperature {} outside 0.0..=2.0, clamping",
                self.gateway.temperature
            );
            self.gateway.temperature = self.gateway.temperature.clamp(0.0, 2.0);
        }
        if !(0.0..=1.0).contains(&self.synthesis.default_match_score) {
            self.synthesis.default_match_score = self.synthesis.default_match_score.clamp(0.0, 1.0);
        }
        if self.synthesis.max_recommendations == 0 {
            self.synthesis.max_recommendations = 1;
        }

        if self.gateway.api_key.is_none() {
            tracing::warn!("DEEPSEEK_API_KEY not set; responses will come from the mock table");
        }
    }
}

fn clamp_attempts(name: &str, value: u32) -> u32 {
    if value == 0 {
        1
    } else if value > 10 {
        tracing::warn!("{} {} exceeds max 10, clamping to 10", name, value);
        10
    } else {
        value
    }
}
