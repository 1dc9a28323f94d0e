use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::VerificationError;

/// Named job types offered by the verification platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// "Has anyone done X?" precedent search.
    #[default]
    Owl,
    Crow,
    Falcon,
    Phoenix,
}

impl JobKind {
    pub fn job_name(&self) -> &'static str {
        match self {
            JobKind::Owl => "job-futurehouse-hasanyone",
            JobKind::Crow => "job-futurehouse-paperqa2",
            JobKind::Falcon => "job-futurehouse-paperqa2-deep",
            JobKind::Phoenix => "job-futurehouse-phoenix",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Owl => "OWL",
            JobKind::Crow => "CROW",
            JobKind::Falcon => "FALCON",
            JobKind::Phoenix => "PHOENIX",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub query: String,
}

/// Batch verification capability: answers come back aligned with `jobs`,
/// and only once every job has finished.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn run_batch(&self, jobs: &[Job]) -> Result<Vec<String>, VerificationError>;
}

pub const DEFAULT_BASE_URL: &str = "https://api.platform.futurehouse.org";

#[derive(Serialize)]
struct TaskRequest<'a> {
    name: &'a str,
    query: &'a str,
}

#[derive(Deserialize)]
struct TaskCreated {
    trajectory_id: String,
}

#[derive(Clone)]
pub struct FutureHouseClient {
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    timeout: Duration,
    client: reqwest::Client,
}

impl FutureHouseClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, VerificationError> {
        if api_key.trim().is_empty() {
            return Err(VerificationError::MissingApiKey);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1200),
            client: reqwest::Client::new(),
        })
    }

    pub fn with_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    async fn submit(&self, job: &Job) -> Result<String, VerificationError> {
        let url = format!("{}/v0.1/crows", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&TaskRequest {
                name: job.kind.job_name(),
                query: &job.query,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        let created: TaskCreated = response.json().await?;
        debug!(trajectory_id = %created.trajectory_id, job = job.kind.job_name(), "Submitted job");
        Ok(created.trajectory_id)
    }

    async fn wait_for(&self, trajectory_id: &str) -> Result<String, VerificationError> {
        let url = format!("{}/v0.1/trajectories/{}", self.base_url, trajectory_id);
        loop {
            let trajectory: Value = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let status = trajectory["status"].as_str().unwrap_or("").to_lowercase();
            match status.as_str() {
                "success" => {
                    return extract_answer(&trajectory).ok_or_else(|| VerificationError::MissingAnswer {
                        trajectory_id: trajectory_id.to_string(),
                    });
                }
                "fail" | "failed" | "cancelled" | "error" => {
                    return Err(VerificationError::JobFailed {
                        trajectory_id: trajectory_id.to_string(),
                        status,
                    });
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// The answer text sits in different places depending on the job type.
fn extract_answer(trajectory: &Value) -> Option<String> {
    let response = &trajectory["environment_frame"]["state"]["state"]["response"];
    [
        &trajectory["answer"],
        &response["answer"]["answer"],
        &response["answer"]["formatted_answer"],
        &response["answer"],
        &trajectory["formatted_answer"],
    ]
    .into_iter()
    .find_map(|v| v.as_str().map(str::to_string))
}

#[async_trait]
impl VerificationService for FutureHouseClient {
    async fn run_batch(&self, jobs: &[Job]) -> Result<Vec<String>, VerificationError> {
        info!(jobs = jobs.len(), "Sending batch to FutureHouse");

        let batch = async {
            let ids = try_join_all(jobs.iter().map(|job| self.submit(job))).await?;
            try_join_all(ids.iter().map(|id| self.wait_for(id))).await
        };

        tokio::time::timeout(self.timeout, batch)
            .await
            .map_err(|_| VerificationError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_kinds_map_to_platform_names() {
        assert_eq!(JobKind::Owl.job_name(), "job-futurehouse-hasanyone");
        assert_eq!(JobKind::Falcon.job_name(), "job-futurehouse-paperqa2-deep");
        assert_eq!(JobKind::default(), JobKind::Owl);
        assert_eq!(JobKind::Crow.to_string(), "CROW");
    }

    #[test]
    fn job_kind_parses_lowercase() {
        let kind: JobKind = serde_json::from_str("\"phoenix\"").unwrap();
        assert_eq!(kind, JobKind::Phoenix);
    }

    #[test]
    fn answer_is_found_in_nested_state() {
        let trajectory = json!({
            "status": "success",
            "environment_frame": {"state": {"state": {"response": {"answer": {"answer": "Yes, Staffel (1889)."}}}}}
        });
        assert_eq!(extract_answer(&trajectory).as_deref(), Some("Yes, Staffel (1889)."));
    }

    #[test]
    fn top_level_answer_wins() {
        let trajectory = json!({"status": "success", "answer": "No prior work."});
        assert_eq!(extract_answer(&trajectory).as_deref(), Some("No prior work."));
        assert_eq!(extract_answer(&json!({"status": "success"})), None);
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(matches!(
            FutureHouseClient::new(DEFAULT_BASE_URL.to_string(), "  ".to_string()),
            Err(VerificationError::MissingApiKey)
        ));
    }
}
