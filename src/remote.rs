//! Remote generation service
//!
//! [`RemoteApi`] is the seam between the orchestrator and the service: one call
//! creates a job, the other reads its status. [`HttpRemote`] implements it
//! against a Runway-style REST API (`POST /image_to_video`, `GET /tasks/{id}`).

use crate::config::{ApiConfig, GenerationConfig};
use crate::error::{Error, PollError, Result, SubmissionError};
use crate::types::{JobId, RemoteJob};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the service needs to create one job
#[derive(Clone, Debug, PartialEq)]
pub struct CreateJobRequest {
    /// Source asset: local path, `http(s)://` URL, or `data:` URI
    pub input_ref: String,
    /// Text directive
    pub prompt: String,
    /// Model name
    pub model: String,
    /// Output aspect ratio
    pub ratio: String,
    /// Clip length in seconds
    pub duration: u32,
    /// Fixed seed, if any
    pub seed: Option<u64>,
}

impl CreateJobRequest {
    /// Build a request from the generation settings
    pub fn new(
        input_ref: impl Into<String>,
        prompt: impl Into<String>,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            input_ref: input_ref.into(),
            prompt: prompt.into(),
            model: generation.model.clone(),
            ratio: generation.ratio.clone(),
            duration: generation.duration,
            seed: generation.seed,
        }
    }
}

/// Asynchronous job service
///
/// `create_job` is not idempotent: a call that reached the service may have
/// created a job even when the response was lost. `get_job` is read-only and
/// may be called any number of times.
///
/// # Examples
///
/// ```no_run
/// use genbatch::config::Config;
/// use genbatch::remote::{CreateJobRequest, HttpRemote, RemoteApi};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let remote = HttpRemote::new(&config.api, config.api_key()?)?;
///
/// let request = CreateJobRequest::new("images/beach.png", "waves roll in", &config.generation);
/// let id = remote.create_job(&request).await?;
/// let job = remote.get_job(&id).await?;
/// println!("{id}: {}", job.status);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a job and return the id the service assigned to it
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> std::result::Result<JobId, SubmissionError>;

    /// Read a job's current status
    async fn get_job(&self, job_id: &JobId) -> std::result::Result<RemoteJob, PollError>;

    /// Name of this implementation
    fn name(&self) -> &str;
}

/// Request body for `POST /image_to_video`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoBody<'a> {
    model: &'a str,
    prompt_image: String,
    prompt_text: &'a str,
    ratio: &'a str,
    duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    #[serde(default)]
    id: String,
}

/// Response body of `GET /tasks/{id}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<TaskBody> for RemoteJob {
    fn from(body: TaskBody) -> Self {
        RemoteJob {
            id: body.id,
            status: body.status,
            output: body.output.unwrap_or_default(),
            failure_reason: body.failure.or(body.failure_reason),
            failure_code: body.failure_code,
            progress: body.progress,
            created_at: body.created_at,
        }
    }
}

/// [`RemoteApi`] over HTTP
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl HttpRemote {
    /// Build a client with the configured timeouts
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: config.api_version.clone(),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", &self.api_version)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> std::result::Result<JobId, SubmissionError> {
        let body = ImageToVideoBody {
            model: &request.model,
            prompt_image: prompt_image(&request.input_ref).await?,
            prompt_text: &request.prompt,
            ratio: &request.ratio,
            duration: request.duration,
            seed: request.seed,
        };

        let url = format!("{}/image_to_video", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => SubmissionError::Auth {
                    status: status.as_u16(),
                    message,
                },
                code => SubmissionError::Rejected {
                    status: code,
                    message,
                },
            });
        }

        let created: CreatedTask = response
            .json()
            .await
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;
        if created.id.trim().is_empty() {
            return Err(SubmissionError::MalformedResponse(
                "response carried no task id".to_string(),
            ));
        }

        tracing::debug!(job_id = %created.id, input = %request.input_ref, "Job created");
        Ok(JobId::new(created.id))
    }

    async fn get_job(&self, job_id: &JobId) -> std::result::Result<RemoteJob, PollError> {
        let url = format!("{}/tasks/{}", self.base_url, job_id);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PollError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let mut body: TaskBody = response
            .json()
            .await
            .map_err(|e| PollError::MalformedResponse(e.to_string()))?;
        if body.id.is_empty() {
            body.id = job_id.to_string();
        }
        Ok(body.into())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// A connect failure means the request never left this machine.
fn classify_send_error(e: reqwest::Error) -> SubmissionError {
    if e.is_connect() {
        SubmissionError::Unreachable(e.to_string())
    } else {
        SubmissionError::Transport(e.to_string())
    }
}

/// `promptImage` value for an input reference
///
/// URLs and data URIs pass through; local files are inlined as base64 data URIs.
async fn prompt_image(input_ref: &str) -> std::result::Result<String, SubmissionError> {
    let lower = input_ref.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
    {
        return Ok(input_ref.to_string());
    }

    let path = Path::new(input_ref);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SubmissionError::InvalidInput {
            input_ref: input_ref.to_string(),
            reason: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(SubmissionError::InvalidInput {
            input_ref: input_ref.to_string(),
            reason: "file is empty".to_string(),
        });
    }

    Ok(format!(
        "data:{};base64,{}",
        image_mime(path),
        BASE64.encode(bytes)
    ))
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}
