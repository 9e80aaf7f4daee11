use autotune_core::env::{self, EnvError};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Externally reachable base URL of this service. Batch tasks call back
    /// into it when a job finishes.
    pub public_base_url: String,
    /// Shared secret the completion callback must present.
    pub results_callback_key: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `PUBLIC_BASE_URL`      | required                   |
    /// | `RESULTS_CALLBACK_KEY` | required                   |
    pub fn from_env() -> Result<Self, EnvError> {
        let cors_origins = env::parse_or("CORS_ORIGINS", "http://localhost:5173".to_string())?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env::parse_or("HOST", "0.0.0.0".to_string())?,
            port: env::parse_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: env::parse_or("REQUEST_TIMEOUT_SECS", 30)?,
            public_base_url: env::require("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            results_callback_key: env::require("RESULTS_CALLBACK_KEY")?,
        })
    }
}
