//! Shared Key request signing.
//!
//! Both the Blob and Batch REST services authenticate a request by an
//! HMAC-SHA256 over a canonical rendering of it, keyed with the base64
//! account key. They differ only in the prefix of the headers that take
//! part in the signature (`x-ms-` for storage, `ocp-` for batch).

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use sha2::Sha256;

use crate::error::CloudError;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers, in the order they appear in the string to sign.
const SIGNED_STANDARD_HEADERS: &[&str] = &[
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Account name and decoded key for one storage or batch account.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    pub fn new(account: impl Into<String>, base64_key: &str) -> Result<Self, CloudError> {
        let key = BASE64
            .decode(base64_key.trim())
            .map_err(|e| CloudError::InvalidKey(e.to_string()))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Base64 HMAC-SHA256 of `string_to_sign` under the account key.
    pub fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(string_to_sign.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Add the `Authorization: SharedKey` header to a fully built request.
    pub fn authorize(
        &self,
        request: &mut reqwest::Request,
        header_prefix: &str,
    ) -> Result<(), CloudError> {
        let signature = self.sign(&string_to_sign(request, &self.account, header_prefix));
        let value = HeaderValue::from_str(&format!("SharedKey {}:{signature}", self.account))
            .map_err(|e| CloudError::InvalidKey(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Date format used by the `x-ms-date` and `ocp-date` headers.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Canonical string signed for `request`.
pub fn string_to_sign(request: &reqwest::Request, account: &str, header_prefix: &str) -> String {
    let headers = request.headers();
    let mut out = String::new();

    out.push_str(request.method().as_str());
    out.push('\n');

    for name in SIGNED_STANDARD_HEADERS {
        let value = if *name == "content-length" {
            request
                .body()
                .and_then(|body| body.as_bytes())
                .map(|bytes| bytes.len())
                .filter(|len| *len > 0)
                .map(|len| len.to_string())
                .unwrap_or_default()
        } else {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        out.push_str(&value);
        out.push('\n');
    }

    let mut prefixed: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(header_prefix))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default().trim()))
        .collect();
    prefixed.sort();
    for (name, value) in prefixed {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push_str(&canonicalized_resource(request.url(), account));
    out
}

fn canonicalized_resource(url: &reqwest::Url, account: &str) -> String {
    let mut out = format!("/{account}{}", url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }
    out
}
