//! Account configuration for the storage and batch services.

use autotune_core::env::{self, EnvError};

/// Batch account settings.
///
/// | Env var              | Required | Description                            |
/// |----------------------|----------|----------------------------------------|
/// | `BATCH_ACCOUNT_URL`  | yes      | e.g. `https://acct.region.batch.azure.com` |
/// | `BATCH_ACCOUNT_NAME` | yes      | Account name used in Shared Key auth   |
/// | `BATCH_ACCOUNT_KEY`  | yes      | Base64 account key                     |
/// | `BATCH_POOL_ID`      | yes      | Pool the jobs run on                   |
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub account_url: String,
    pub account_name: String,
    pub account_key: String,
    pub pool_id: String,
}

impl BatchConfig {
    pub fn from_env() -> Result<Self, EnvError> {
        Ok(Self {
            account_url: env::require("BATCH_ACCOUNT_URL")?
                .trim_end_matches('/')
                .to_string(),
            account_name: env::require("BATCH_ACCOUNT_NAME")?,
            account_key: env::require("BATCH_ACCOUNT_KEY")?,
            pool_id: env::require("BATCH_POOL_ID")?,
        })
    }
}

/// Storage account settings.
///
/// | Env var                 | Required | Description                                  |
/// |-------------------------|----------|----------------------------------------------|
/// | `STORAGE_ACCOUNT_NAME`  | yes      | Account name                                 |
/// | `STORAGE_ACCOUNT_KEY`   | yes      | Base64 account key                           |
/// | `STORAGE_BLOB_ENDPOINT` | no       | Defaults to `https://{name}.blob.core.windows.net` |
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub account_name: String,
    pub account_key: String,
    pub blob_endpoint: String,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, EnvError> {
        let account_name = env::require("STORAGE_ACCOUNT_NAME")?;
        let default_endpoint = format!("https://{account_name}.blob.core.windows.net");
        let blob_endpoint = env::parse_or("STORAGE_BLOB_ENDPOINT", default_endpoint)?;

        Ok(Self {
            account_key: env::require("STORAGE_ACCOUNT_KEY")?,
            blob_endpoint: blob_endpoint.trim_end_matches('/').to_string(),
            account_name,
        })
    }
}
