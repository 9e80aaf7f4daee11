//! Batch service client.
//!
//! Wraps the three operations the job service needs from the scheduler:
//! submitting a job with its task graph, reading a task's execution info
//! and counting active jobs.

use async_trait::async_trait;
use autotune_core::types::Timestamp;
use chrono::Utc;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::error::CloudError;
use crate::shared_key::{http_date, SharedKeyCredential};
use crate::task_graph::{compute_task, job_spec, upload_task, JobSubmission};
use crate::{BatchScheduler, TaskStatus};

/// Batch REST version sent with every request.
pub const BATCH_API_VERSION: &str = "2023-05-01.17.0";

const BATCH_CONTENT_TYPE: &str = "application/json; odata=minimalmetadata";

/// HTTP client for one batch account.
pub struct AzureBatchScheduler {
    client: reqwest::Client,
    credential: SharedKeyCredential,
    account_url: String,
    pool_id: String,
}

/// Subset of a task resource returned by `GET /jobs/{job}/tasks/{task}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResource {
    execution_info: Option<ExecutionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionInfo {
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    exit_code: Option<i32>,
}

/// One page of `GET /jobs`.
#[derive(Debug, Deserialize)]
struct JobListPage {
    #[serde(default)]
    value: Vec<serde_json::Value>,
    #[serde(rename = "odata.nextLink")]
    next_link: Option<String>,
}

impl TaskResource {
    fn into_status(self) -> TaskStatus {
        match self.execution_info {
            Some(info) => TaskStatus {
                exit_code: info.exit_code,
                start_time: info.start_time,
                end_time: info.end_time,
            },
            None => TaskStatus::default(),
        }
    }
}

impl AzureBatchScheduler {
    pub fn new(config: &BatchConfig) -> Result<Self, CloudError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a scheduler reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &BatchConfig) -> Result<Self, CloudError> {
        Ok(Self {
            client,
            credential: SharedKeyCredential::new(&config.account_name, &config.account_key)?,
            account_url: config.account_url.clone(),
            pool_id: config.pool_id.clone(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CloudError> {
        let mut url = Url::parse(&format!("{}{path}", self.account_url))
            .map_err(|e| CloudError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api-version", BATCH_API_VERSION)
            .extend_pairs(query);
        Ok(url)
    }

    async fn post_json<T: Serialize>(&self, url: Url, body: &T) -> Result<(), CloudError> {
        let bytes = serde_json::to_vec(body).map_err(|e| CloudError::Decode(e.to_string()))?;
        let response = self.execute(Method::POST, url, Some(bytes)).await?;
        Self::check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CloudError> {
        let response = self.execute(Method::GET, url, None).await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, CloudError> {
        let mut builder = self
            .client
            .request(method, url)
            .header("ocp-date", http_date(Utc::now()));
        if let Some(bytes) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, BATCH_CONTENT_TYPE)
                .body(bytes);
        }

        let mut request = builder.build()?;
        self.credential.authorize(&mut request, "ocp-")?;
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

    async fn check_status(response: reqwest::Response) -> Result<(), CloudError> {
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CloudError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BatchScheduler for AzureBatchScheduler {
    async fn submit(&self, submission: &JobSubmission) -> Result<usize, CloudError> {
        // Build every payload first so an unsafe value never leaves a
        // half-created job behind.
        let job = job_spec(submission, &self.pool_id);
        let compute = compute_task(submission)?;
        let upload = upload_task(submission)?;

        self.post_json(self.url("/jobs", &[])?, &job).await?;

        let tasks_path = format!("/jobs/{}/tasks", submission.job_name);
        self.post_json(self.url(&tasks_path, &[])?, &compute).await?;
        self.post_json(self.url(&tasks_path, &[])?, &upload).await?;

        tracing::info!(job_name = %submission.job_name, pool_id = %self.pool_id, "Batch job submitted");

        self.active_job_count().await
    }

    async fn task_status(&self, job_name: &str, task_id: &str) -> Result<TaskStatus, CloudError> {
        let url = self.url(&format!("/jobs/{job_name}/tasks/{task_id}"), &[])?;
        let task: TaskResource = self.get_json(url).await?;
        Ok(task.into_status())
    }

    async fn active_job_count(&self) -> Result<usize, CloudError> {
        let mut url = self.url("/jobs", &[("$filter", "state eq 'active'"), ("$select", "id")])?;
        let mut count = 0;

        loop {
            let page: JobListPage = self.get_json(url).await?;
            count += page.value.len();

            match page.next_link {
                Some(next) => {
                    url = Url::parse(&next).map_err(|e| CloudError::InvalidUrl(e.to_string()))?;
                }
                None => return Ok(count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler() -> AzureBatchScheduler {
        AzureBatchScheduler::new(&BatchConfig {
            account_url: "https://acct.westeurope.batch.azure.com".to_string(),
            account_name: "acct".to_string(),
            account_key: "YXV0b3R1bmUtdGVzdC1rZXktMDEyMzQ1Njc4OWFiY2RlZg==".to_string(),
            pool_id: "autotune".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn urls_carry_api_version_and_filter() {
        let url = scheduler()
            .url("/jobs", &[("$filter", "state eq 'active'"), ("$select", "id")])
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/jobs");
        assert_eq!(
            pairs,
            vec![
                ("api-version".to_string(), BATCH_API_VERSION.to_string()),
                ("$filter".to_string(), "state eq 'active'".to_string()),
                ("$select".to_string(), "id".to_string()),
            ]
        );
    }

    #[test]
    fn finished_task_reports_exit_code_and_times() {
        let task: TaskResource = serde_json::from_str(
            r#"{
                "id": "Autotune",
                "state": "completed",
                "executionInfo": {
                    "startTime": "2024-03-01T10:00:00Z",
                    "endTime": "2024-03-01T10:20:00Z",
                    "exitCode": 1,
                    "retryCount": 0
                }
            }"#,
        )
        .unwrap();

        let status = task.into_status();
        assert_eq!(status.exit_code, Some(1));
        assert!(!status.succeeded());
        assert_eq!(status.start_time, Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()));
        assert_eq!(status.end_time, Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 0).unwrap()));
    }

    #[test]
    fn task_without_execution_info_has_no_exit_code() {
        let task: TaskResource = serde_json::from_str(r#"{"id":"Autotune","state":"active"}"#).unwrap();
        assert_eq!(task.into_status(), TaskStatus::default());
    }

    #[test]
    fn job_list_page_exposes_next_link() {
        let page: JobListPage = serde_json::from_str(
            r#"{
                "odata.metadata": "https://acct/$metadata#jobs",
                "value": [{"id": "autotune-job-1"}, {"id": "autotune-job-2"}],
                "odata.nextLink": "https://acct/jobs?api-version=x&$skiptoken=abc"
            }"#,
        )
        .unwrap();

        assert_eq!(page.value.len(), 2);
        assert!(page.next_link.is_some());
    }
}
