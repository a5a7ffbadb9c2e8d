use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets a settings path, e.g. `edi.base_url` ->
/// `EDIBRIDGE_EDI__BASE_URL`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "EDIBRIDGE_{}",
        field_path.to_uppercase().replace('.', "__")
    )
}
