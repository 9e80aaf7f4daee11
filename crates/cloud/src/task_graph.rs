//! The two-task graph submitted for every tuning job.
//!
//! `Autotune` runs the tuning tool against the staged profile and uploads
//! its logs to the job container when it finishes, whatever the outcome.
//! `Upload` depends on it and calls back into this service so the results
//! can be processed. Exit code 1 from `Autotune` still satisfies the
//! dependency, so tool failures are reported to the user too.
//!
//! Builders here are pure; [`crate::batch`] only serializes and posts them.

use autotune_core::naming::{
    COMPUTE_TASK_ID, INPUT_BLOB_NAME, PRIMARY_RESULT_PATTERN, SECONDARY_LOG_PATTERN,
    SOFT_FAILURE_EXIT_CODE, UPLOAD_TASK_ID, UPLOAD_TASK_MAX_RETRIES,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::CloudError;

/// Directory holding the tuning tool's checkout on pool nodes.
pub const TOOL_CHECKOUT_DIR: &str = "/usr/src/oref0";

/// Characters that would break out of the quoting used in command lines.
const SHELL_UNSAFE: &[char] = &['\'', '"', '`', '$', '\\', '\n', '\r'];

// ---------------------------------------------------------------------------
// Submission input
// ---------------------------------------------------------------------------

/// Arguments of the tuning tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeCommand {
    pub target_url: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub uam_as_basal: bool,
}

impl ComputeCommand {
    /// Shell command run by the compute task.
    ///
    /// The staged profile is also copied to the pump-profile and
    /// autotune-profile names the tool expects to find.
    pub fn to_command_line(&self) -> Result<String, CloudError> {
        ensure_shell_safe("target URL", &self.target_url)?;

        Ok(format!(
            "/bin/sh -c '\
             cd \"$AZ_BATCH_TASK_WORKING_DIR\" && \
             mkdir -p settings && \
             mv {INPUT_BLOB_NAME} settings && \
             cp settings/profile.json settings/pumpprofile.json && \
             cp settings/profile.json settings/autotune.json && \
             oref0-autotune --dir=$AZ_BATCH_TASK_WORKING_DIR --ns-host={} \
             --start-date={} --end-date={} --categorize-uam-as-basal={}'",
            self.target_url,
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d"),
            self.uam_as_basal,
        ))
    }
}

/// Everything the scheduler needs to run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubmission {
    pub job_name: String,
    pub compute: ComputeCommand,
    /// IANA timezone the tool runs in.
    pub timezone: String,
    /// Read-only signed URL of the staged profile.
    pub input_url: String,
    /// Read/write signed URL of the job container.
    pub output_container_url: String,
    /// Completion callback, including the job id and shared key. The upload
    /// task appends the tool's commit.
    pub callback_url: String,
}

// ---------------------------------------------------------------------------
// REST payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub id: String,
    pub pool_info: PoolInfo,
    pub uses_task_dependencies: bool,
    pub on_all_tasks_complete: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub pool_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_files: Vec<OutputFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment_settings: Vec<EnvironmentSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_conditions: Option<ExitConditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<TaskDependencies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<TaskConstraints>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    pub http_url: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputFile {
    pub file_pattern: String,
    pub destination: OutputDestination,
    pub upload_options: UploadOptions,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputDestination {
    pub container: ContainerDestination,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDestination {
    pub container_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub upload_condition: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExitConditions {
    pub exit_codes: Vec<ExitCodeMapping>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExitCodeMapping {
    pub code: i32,
    pub exit_options: ExitOptions,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExitOptions {
    pub dependency_action: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependencies {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskConstraints {
    pub max_task_retry_count: i32,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// The job: tasks may depend on each other, and the job terminates once
/// every task has completed.
pub fn job_spec(submission: &JobSubmission, pool_id: &str) -> JobSpec {
    JobSpec {
        id: submission.job_name.clone(),
        pool_info: PoolInfo {
            pool_id: pool_id.to_string(),
        },
        uses_task_dependencies: true,
        on_all_tasks_complete: "terminatejob".to_string(),
    }
}

pub fn compute_task(submission: &JobSubmission) -> Result<TaskSpec, CloudError> {
    let output = |pattern: &str| OutputFile {
        file_pattern: pattern.to_string(),
        destination: OutputDestination {
            container: ContainerDestination {
                container_url: submission.output_container_url.clone(),
            },
        },
        upload_options: UploadOptions {
            upload_condition: "taskcompletion".to_string(),
        },
    };

    Ok(TaskSpec {
        id: COMPUTE_TASK_ID.to_string(),
        command_line: submission.compute.to_command_line()?,
        resource_files: vec![ResourceFile {
            http_url: submission.input_url.clone(),
            file_path: INPUT_BLOB_NAME.to_string(),
        }],
        output_files: vec![output(PRIMARY_RESULT_PATTERN), output(SECONDARY_LOG_PATTERN)],
        environment_settings: vec![EnvironmentSetting {
            name: "TZ".to_string(),
            value: submission.timezone.clone(),
        }],
        exit_conditions: Some(ExitConditions {
            exit_codes: vec![ExitCodeMapping {
                code: SOFT_FAILURE_EXIT_CODE,
                exit_options: ExitOptions {
                    dependency_action: "satisfy".to_string(),
                },
            }],
        }),
        depends_on: None,
        constraints: None,
    })
}

/// The callback task. It resolves the tool's commit on the node so the
/// service can record which version produced the results.
pub fn upload_task(submission: &JobSubmission) -> Result<TaskSpec, CloudError> {
    ensure_shell_safe("callback URL", &submission.callback_url)?;

    Ok(TaskSpec {
        id: UPLOAD_TASK_ID.to_string(),
        command_line: format!(
            "/bin/sh -c 'cd {TOOL_CHECKOUT_DIR} && \
             wget -O /dev/null -o /dev/null \"{}&commit=$(git rev-parse --short HEAD)\"'",
            submission.callback_url
        ),
        resource_files: Vec::new(),
        output_files: Vec::new(),
        environment_settings: Vec::new(),
        exit_conditions: None,
        depends_on: Some(TaskDependencies {
            task_ids: vec![COMPUTE_TASK_ID.to_string()],
        }),
        constraints: Some(TaskConstraints {
            max_task_retry_count: UPLOAD_TASK_MAX_RETRIES,
        }),
    })
}

fn ensure_shell_safe(what: &str, value: &str) -> Result<(), CloudError> {
    if value.contains(SHELL_UNSAFE) || value.chars().any(char::is_whitespace) {
        return Err(CloudError::InvalidSubmission(format!(
            "{what} contains characters that cannot be passed to a task: {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> JobSubmission {
        JobSubmission {
            job_name: "autotune-job-7".to_string(),
            compute: ComputeCommand {
                target_url: "https://ns.example".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                uam_as_basal: false,
            },
            timezone: "Europe/London".to_string(),
            input_url: "https://acct.blob/autotune-job-7/profile.json?sig=r".to_string(),
            output_container_url: "https://acct.blob/autotune-job-7?sig=rw".to_string(),
            callback_url: "https://tune.example/api/v1/results/job-finished?id=7&key=k3y"
                .to_string(),
        }
    }

    #[test]
    fn job_terminates_when_tasks_complete() {
        let value = serde_json::to_value(job_spec(&submission(), "pool-a")).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "autotune-job-7",
                "poolInfo": { "poolId": "pool-a" },
                "usesTaskDependencies": true,
                "onAllTasksComplete": "terminatejob",
            })
        );
    }

    #[test]
    fn compute_task_maps_exit_code_one_to_satisfy() {
        let value = serde_json::to_value(compute_task(&submission()).unwrap()).unwrap();

        assert_eq!(value["id"], "Autotune");
        assert_eq!(
            value["exitConditions"],
            json!({ "exitCodes": [{ "code": 1, "exitOptions": { "dependencyAction": "satisfy" } }] })
        );
        assert_eq!(
            value["resourceFiles"],
            json!([{ "httpUrl": "https://acct.blob/autotune-job-7/profile.json?sig=r", "filePath": "profile.json" }])
        );
        assert_eq!(value["environmentSettings"], json!([{ "name": "TZ", "value": "Europe/London" }]));
        assert!(value.get("dependsOn").is_none());
    }

    #[test]
    fn compute_task_uploads_both_log_patterns_on_completion() {
        let task = compute_task(&submission()).unwrap();
        let patterns: Vec<_> = task.output_files.iter().map(|f| f.file_pattern.as_str()).collect();
        assert_eq!(
            patterns,
            ["autotune/autotune_recommendations.log", "autotune/autotune.*.log"]
        );
        for file in &task.output_files {
            assert_eq!(file.upload_options.upload_condition, "taskcompletion");
            assert_eq!(
                file.destination.container.container_url,
                "https://acct.blob/autotune-job-7?sig=rw"
            );
        }
    }

    #[test]
    fn compute_command_carries_window_and_flags() {
        let line = submission().compute.to_command_line().unwrap();
        assert!(line.starts_with("/bin/sh -c '"));
        assert!(line.contains("cp settings/profile.json settings/pumpprofile.json"));
        assert!(line.contains("cp settings/profile.json settings/autotune.json"));
        assert!(line.contains("--ns-host=https://ns.example "));
        assert!(line.contains("--start-date=2024-02-15 --end-date=2024-03-15"));
        assert!(line.ends_with("--categorize-uam-as-basal=false'"));
    }

    #[test]
    fn upload_task_depends_on_compute_and_retries_twice() {
        let task = upload_task(&submission()).unwrap();
        assert_eq!(task.id, "Upload");
        assert_eq!(
            task.depends_on,
            Some(TaskDependencies {
                task_ids: vec!["Autotune".to_string()]
            })
        );
        assert_eq!(task.constraints.unwrap().max_task_retry_count, 2);
        assert!(task.command_line.contains("cd /usr/src/oref0 && "));
        assert!(task.command_line.contains(
            "\"https://tune.example/api/v1/results/job-finished?id=7&key=k3y&commit=$(git rev-parse --short HEAD)\""
        ));
    }

    #[test]
    fn unsafe_values_are_refused() {
        let mut bad = submission();
        bad.compute.target_url = "https://x.example/'; reboot".to_string();
        assert!(matches!(compute_task(&bad), Err(CloudError::InvalidSubmission(_))));

        let mut bad = submission();
        bad.callback_url.push_str("$(id)");
        assert!(matches!(upload_task(&bad), Err(CloudError::InvalidSubmission(_))));
    }
}
