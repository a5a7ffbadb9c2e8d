use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use edibridge::agent::AssistantConfig;
use edibridge::documents::DocumentClientConfig;
use edibridge::providers::configs::{
    OpenAiProviderConfig, DEFAULT_HOST, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use edibridge::providers::utils::STREAM_DONE;
use serde::Deserialize;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3001,http://localhost:3002,\
http://127.0.0.1:3000,http://127.0.0.1:3001,http://127.0.0.1:3002";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated list of allowed browser origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            environment: default_environment(),
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdiSettings {
    #[serde(default = "default_edi_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_mock_data: bool,
}

impl Default for EdiSettings {
    fn default() -> Self {
        Self {
            base_url: default_edi_base_url(),
            username: None,
            password: None,
            use_mock_data: false,
        }
    }
}

impl EdiSettings {
    pub fn client_config(&self) -> DocumentClientConfig {
        DocumentClientConfig {
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            use_mock_data: self.use_mock_data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmSettings {
    pub fn provider_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_done_sentinel")]
    pub done_sentinel: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            done_sentinel: default_done_sentinel(),
        }
    }
}

impl AssistantSettings {
    pub fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            max_iterations: self.max_iterations,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub edi: EdiSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub assistant: AssistantSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("edi.base_url", default_edi_base_url())?
            .set_default("llm.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("EDIBRIDGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origins() -> String {
    DEFAULT_CORS_ORIGINS.to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_edi_base_url() -> String {
    "http://localhost:10680".to_string()
}

fn default_llm_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_iterations() -> usize {
    AssistantConfig::default().max_iterations
}

fn default_done_sentinel() -> String {
    STREAM_DONE.to_string()
}
