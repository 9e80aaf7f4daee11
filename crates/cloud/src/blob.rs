//! Blob storage client for job containers.
//!
//! Each job gets its own container named after the job. The service
//! stages the profile there, batch tasks write their logs back through a
//! container-scoped signed URL, and the completion callback downloads them.

use std::sync::LazyLock;

use async_trait::async_trait;
use autotune_core::naming::{is_secondary_artifact, INPUT_BLOB_NAME};
use chrono::Utc;
use regex::Regex;
use reqwest::{Method, StatusCode, Url};

use crate::config::StorageConfig;
use crate::error::CloudError;
use crate::sas::{service_sas, SasPermissions, SasResource, SasWindow};
use crate::shared_key::{http_date, SharedKeyCredential};
use crate::{ArtifactStore, BlobRef};

/// Blob service REST version sent with every request.
pub const STORAGE_API_VERSION: &str = "2020-12-06";

static BLOB_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Blob>\s*<Name>([^<]*)</Name>").expect("blob name pattern is valid")
});

static NEXT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextMarker>([^<]+)</NextMarker>").expect("marker pattern is valid")
});

static XML_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("entity pattern is valid")
});

/// HTTP client for one storage account.
pub struct AzureBlobStore {
    client: reqwest::Client,
    credential: SharedKeyCredential,
    endpoint: String,
}

impl AzureBlobStore {
    pub fn new(config: &StorageConfig) -> Result<Self, CloudError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a store reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &StorageConfig) -> Result<Self, CloudError> {
        Ok(Self {
            client,
            credential: SharedKeyCredential::new(&config.account_name, &config.account_key)?,
            endpoint: config.blob_endpoint.clone(),
        })
    }

    /// URL of a container, or of a blob inside it.
    fn resource_url(&self, container: &str, blob: Option<&str>) -> Result<Url, CloudError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|e| CloudError::InvalidUrl(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CloudError::InvalidUrl(self.endpoint.clone()))?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.push(blob);
            }
        }
        Ok(url)
    }

    fn signed_url(
        &self,
        resource: SasResource<'_>,
        permissions: SasPermissions,
    ) -> Result<String, CloudError> {
        let (container, blob) = match resource {
            SasResource::Container(container) => (container, None),
            SasResource::Blob { container, name } => (container, Some(name)),
        };
        let mut url = self.resource_url(container, blob)?;
        let query = service_sas(
            &self.credential,
            resource,
            permissions,
            SasWindow::issued_at(Utc::now()),
        );
        url.query_pairs_mut().extend_pairs(query);
        Ok(url.into())
    }

    async fn list_blob_names(&self, container: &str) -> Result<Vec<String>, CloudError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.resource_url(container, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container").append_pair("comp", "list");
                if let Some(marker) = &marker {
                    query.append_pair("marker", marker);
                }
            }

            let response = self.execute(Method::GET, url, None).await?;
            let body = Self::ensure_success(response).await?.text().await?;
            let (page, next) = parse_blob_list(&body);
            names.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => return Ok(names),
            }
        }
    }

    // ---- private helpers ----

    /// Sign and send a request. `body` is uploaded as a block blob.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> Result<reqwest::Response, CloudError> {
        let mut builder = self
            .client
            .request(method, url)
            .header("x-ms-date", http_date(Utc::now()))
            .header("x-ms-version", STORAGE_API_VERSION);
        if let Some((content_type, bytes)) = body {
            builder = builder
                .header("x-ms-blob-type", "BlockBlob")
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes);
        }

        let mut request = builder.build()?;
        self.credential.authorize(&mut request, "x-ms-")?;
        Ok(self.client.execute(request).await?)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CloudError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(CloudError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ArtifactStore for AzureBlobStore {
    async fn create_container(&self, container: &str) -> Result<(), CloudError> {
        let mut url = self.resource_url(container, None)?;
        url.query_pairs_mut().append_pair("restype", "container");

        let response = self.execute(Method::PUT, url, None).await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(CloudError::ContainerExists(container.to_string()));
        }
        Self::ensure_success(response).await?;
        tracing::debug!(container, "Storage container created");
        Ok(())
    }

    async fn stage_input(&self, container: &str, profile_json: &str) -> Result<String, CloudError> {
        let url = self.resource_url(container, Some(INPUT_BLOB_NAME))?;
        let body = ("application/json", profile_json.as_bytes().to_vec());
        let response = self.execute(Method::PUT, url, Some(body)).await?;
        Self::ensure_success(response).await?;

        self.signed_url(
            SasResource::Blob {
                container,
                name: INPUT_BLOB_NAME,
            },
            SasPermissions::Read,
        )
    }

    fn container_write_url(&self, container: &str) -> Result<String, CloudError> {
        self.signed_url(SasResource::Container(container), SasPermissions::ReadWrite)
    }

    async fn list_secondary_artifacts(&self, container: &str) -> Result<Vec<BlobRef>, CloudError> {
        Ok(self
            .list_blob_names(container)
            .await?
            .into_iter()
            .filter(|name| is_secondary_artifact(name))
            .map(|name| BlobRef::new(container, name))
            .collect())
    }

    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>, CloudError> {
        let url = self.resource_url(&blob.container, Some(&blob.name))?;
        let response = self.execute(Method::GET, url, None).await?;
        let bytes = Self::ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Blob names and the continuation marker from a List Blobs response.
pub fn parse_blob_list(xml: &str) -> (Vec<String>, Option<String>) {
    let names = BLOB_NAME_RE
        .captures_iter(xml)
        .map(|caps| unescape_xml(&caps[1]))
        .collect();
    let next = NEXT_MARKER_RE
        .captures(xml)
        .map(|caps| unescape_xml(&caps[1]));
    (names, next)
}

/// Decode the predefined entities and numeric character references in one
/// pass, so `&amp;lt;` stays `&lt;`. References to invalid code points are
/// kept verbatim.
fn unescape_xml(text: &str) -> String {
    XML_ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse::<u32>())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
