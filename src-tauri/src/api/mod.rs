// Job backend REST client
// All calls are blocking; async callers go through spawn_blocking.
use crate::file_manager::{read_json_file, StoreError};
use crate::models::{EntityId, Job, NewJob, ReportRecord, StoredCredential};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound for a run archive held in memory
pub const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("not authorized (HTTP {0})")]
    Unauthorized(u16),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("no usable API credential: {0}")]
    Credential(String),
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("download exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Coarse buckets for user-facing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Transport,
    Auth,
    Ineligible,
    UnknownStatus,
    Local,
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::Credential(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Unauthorized(_) | ApiError::Credential(_) => ErrorCategory::Auth,
            ApiError::NotFound(_) => ErrorCategory::Ineligible,
            ApiError::InvalidUrl(_) => ErrorCategory::Local,
            ApiError::Transport(_)
            | ApiError::Server { .. }
            | ApiError::Decode(_)
            | ApiError::TooLarge { .. } => ErrorCategory::Transport,
        }
    }
}

/// Supplies the bearer token for each request
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, ApiError>;
}

/// Fixed token, mostly for tests and scripted use
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Reads `auth.json` on every call so a token refreshed by the front-end is picked up at once
pub struct StoredCredentials {
    path: PathBuf,
}

impl StoredCredentials {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialProvider for StoredCredentials {
    fn bearer_token(&self) -> Result<String, ApiError> {
        let credential: StoredCredential = read_json_file(&self.path).map_err(|e| match e {
            StoreError::NotFound(_) => ApiError::Credential("no API token stored".to_string()),
            other => ApiError::Credential(other.to_string()),
        })?;
        if credential.is_usable() {
            Ok(credential.token)
        } else {
            Err(ApiError::Credential("stored API token is empty".to_string()))
        }
    }
}

/// Backend operations the dashboard relies on
pub trait JobApi: Send + Sync {
    fn list_jobs(&self) -> Result<Vec<Job>, ApiError>;
    fn get_job(&self, job_id: &EntityId) -> Result<Job, ApiError>;
    fn get_report(&self, job_id: &EntityId) -> Result<Vec<ReportRecord>, ApiError>;
    fn create_job(&self, job: &NewJob) -> Result<Job, ApiError>;
    fn cancel_job(&self, job_id: &EntityId) -> Result<(), ApiError>;
    fn delete_job(&self, job_id: &EntityId) -> Result<(), ApiError>;
    fn download_run(&self, job_id: &EntityId, run_name: &str) -> Result<Vec<u8>, ApiError>;
}

pub struct HttpJobApi {
    agent: ureq::Agent,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    max_download_bytes: u64,
}

impl HttpJobApi {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();

        Ok(Self {
            agent,
            base_url,
            credentials,
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn with_download_limit(mut self, limit: u64) -> Self {
        self.max_download_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v1/job/{segments..}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", "job"])
            .extend(segments);
        Ok(url)
    }

    fn make_request(&self, method: &str, url: &Url) -> Result<ureq::Request, ApiError> {
        // Fetched per call; never cached here
        let token = self.credentials.bearer_token()?;
        debug!("{} {}", method, url.path());
        Ok(self
            .agent
            .request_url(method, url)
            .set("Authorization", &format!("Bearer {}", token))
            .set("Accept", "application/json"))
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self
            .make_request("GET", &url)?
            .call()
            .map_err(|e| map_error(&url, e))?;
        handle_response(response)
    }

    fn post_empty(&self, segments: &[&str]) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.make_request("POST", &url)?
            .send_json(json!({}))
            .map_err(|e| map_error(&url, e))?;
        Ok(())
    }
}

fn handle_response<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ApiError> {
    response
        .into_json::<T>()
        .map_err(|e| ApiError::Decode(e.to_string()))
}

fn map_error(url: &Url, err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status @ (401 | 403), _) => ApiError::Unauthorized(status),
        ureq::Error::Status(404, _) => ApiError::NotFound(url.path().to_string()),
        ureq::Error::Status(status, response) => {
            let body = response
                .into_string()
                .unwrap_or_else(|_| "Unknown error".to_string());
            ApiError::Server {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            }
        }
        ureq::Error::Transport(transport) => ApiError::Transport(transport.to_string()),
    }
}

impl JobApi for HttpJobApi {
    fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.get_json(&[])
    }

    fn get_job(&self, job_id: &EntityId) -> Result<Job, ApiError> {
        self.get_json(&[job_id.as_str()])
    }

    fn get_report(&self, job_id: &EntityId) -> Result<Vec<ReportRecord>, ApiError> {
        self.get_json(&[job_id.as_str(), "report"])
    }

    fn create_job(&self, job: &NewJob) -> Result<Job, ApiError> {
        let url = self.endpoint(&[])?;
        let response = self
            .make_request("POST", &url)?
            .send_json(json!({ "job": job }))
            .map_err(|e| map_error(&url, e))?;
        handle_response(response)
    }

    fn cancel_job(&self, job_id: &EntityId) -> Result<(), ApiError> {
        self.post_empty(&[job_id.as_str(), "cancel"])
    }

    fn delete_job(&self, job_id: &EntityId) -> Result<(), ApiError> {
        self.post_empty(&[job_id.as_str(), "delete"])
    }

    fn download_run(&self, job_id: &EntityId, run_name: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint(&[job_id.as_str(), run_name, "download"])?;
        let response = self
            .make_request("GET", &url)?
            .call()
            .map_err(|e| map_error(&url, e))?;

        let limit = self.max_download_bytes;
        if let Some(length) = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok())
        {
            if length > limit {
                return Err(ApiError::TooLarge { limit });
            }
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(limit + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if bytes.len() as u64 > limit {
            return Err(ApiError::TooLarge { limit });
        }
        debug!("Downloaded {} bytes for {}/{}", bytes.len(), job_id, run_name);
        Ok(bytes)
    }
}


#[cfg(test)]
mod tests {
    use super::stub::{serve, StubResponse};
    use super::*;
    use crate::file_manager::json_ops::scratch_dir;
    use crate::file_manager::write_json_file;
    use crate::models::JobType;

    const JOB_JSON: &str = r#"{
        "jobId": 7,
        "designName": "spm",
        "repoURL": "https://github.com/example/spm",
        "pdkVariant": "sky130_fd_sc_hd",
        "type": "normal",
        "status": "running",
        "createdAt": "2024-03-01T12:00:00Z",
        "updatedAt": "2024-03-01T12:10:00Z",
        "completedAt": null
    }"#;

    fn client(base: &str) -> HttpJobApi {
        HttpJobApi::new(base, Arc::new(StaticToken("secret-token".to_string()))).unwrap()
    }

    struct NoToken;

    impl CredentialProvider for NoToken {
        fn bearer_token(&self) -> Result<String, ApiError> {
            Err(ApiError::Credential("signed out".to_string()))
        }
    }

    #[test]
    fn test_list_jobs_sends_bearer() {
        let (base, requests) = serve(vec![StubResponse::json(200, &format!("[{JOB_JSON}]"))]);
        let jobs = client(&base).list_jobs().unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id.as_str(), "7");
        assert!(jobs[0].runs.is_empty());

        let request = requests.recv().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/v1/job");
        assert_eq!(request.header("authorization"), Some("Bearer secret-token"));
    }

    #[test]
    fn test_create_job_wraps_payload() {
        let (base, requests) = serve(vec![StubResponse::json(201, JOB_JSON)]);
        let new_job = NewJob {
            design_name: "spm".to_string(),
            repo_url: "https://github.com/example/spm".to_string(),
            job_type: JobType::Exploratory,
            ..NewJob::default()
        };
        let created = client(&base).create_job(&new_job).unwrap();
        assert_eq!(created.design_name, "spm");

        let request = requests.recv().unwrap();
        assert_eq!(request.method, "POST");
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["job"]["designName"], "spm");
        assert_eq!(body["job"]["type"], "exploratory");
    }

    #[test]
    fn test_cancel_and_delete_post_empty_object() {
        let (base, requests) = serve(vec![
            StubResponse::json(200, "{}"),
            StubResponse::json(200, ""),
        ]);
        let api = client(&base);
        api.cancel_job(&EntityId::new("7")).unwrap();
        api.delete_job(&EntityId::new("7")).unwrap();

        let cancel = requests.recv().unwrap();
        assert_eq!(cancel.path, "/v1/job/7/cancel");
        assert_eq!(cancel.body, b"{}");
        assert_eq!(requests.recv().unwrap().path, "/v1/job/7/delete");
    }

    #[test]
    fn test_status_mapping() {
        let (base, _requests) = serve(vec![
            StubResponse::json(401, ""),
            StubResponse::json(404, ""),
            StubResponse::json(500, "scheduler down"),
            StubResponse::json(200, "not json"),
        ]);
        let api = client(&base);
        let id = EntityId::new("9");

        assert_eq!(api.get_job(&id).unwrap_err(), ApiError::Unauthorized(401));
        assert_eq!(
            api.get_job(&id).unwrap_err(),
            ApiError::NotFound("/v1/job/9".to_string())
        );
        assert_eq!(
            api.get_report(&id).unwrap_err(),
            ApiError::Server {
                status: 500,
                body: "scheduler down".to_string()
            }
        );
        assert!(matches!(api.get_job(&id), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_download_encodes_segments_and_caps_size() {
        let (base, requests) = serve(vec![
            StubResponse::json(200, "PK-archive"),
            StubResponse::json(200, "0123456789abcdef"),
        ]);
        let api = client(&base).with_download_limit(12);
        let id = EntityId::new("7");

        let bytes = api.download_run(&id, "run a/b").unwrap();
        assert_eq!(bytes, b"PK-archive");
        assert_eq!(requests.recv().unwrap().path, "/v1/job/7/run%20a%2Fb/download");

        assert_eq!(
            api.download_run(&id, "big").unwrap_err(),
            ApiError::TooLarge { limit: 12 }
        );
    }

    #[test]
    fn test_missing_credential_skips_request() {
        let api = HttpJobApi::new("http://127.0.0.1:9", Arc::new(NoToken)).unwrap();
        let err = api.list_jobs().unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err, ApiError::Credential("signed out".to_string()));
    }

    #[test]
    fn test_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let api = client(&format!("http://127.0.0.1:{port}"));
        assert!(matches!(api.list_jobs(), Err(ApiError::Transport(_))));
    }

    #[test]
    fn test_base_url_with_path() {
        let api = client("https://jobs.example.org/api/");
        let url = api.endpoint(&["12", "report"]).unwrap();
        assert_eq!(url.as_str(), "https://jobs.example.org/api/v1/job/12/report");
        assert!(matches!(
            HttpJobApi::new("mailto:ops@example.org", Arc::new(NoToken)),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_stored_credentials_are_read_per_call() {
        let dir = scratch_dir("auth");
        let path = dir.join("auth.json");
        let provider = StoredCredentials::new(path.clone());
        assert!(matches!(provider.bearer_token(), Err(ApiError::Credential(_))));

        write_json_file(&path, &StoredCredential::new("first")).unwrap();
        assert_eq!(provider.bearer_token().unwrap(), "first");
        write_json_file(&path, &StoredCredential::new("second")).unwrap();
        assert_eq!(provider.bearer_token().unwrap(), "second");
        std::fs::remove_dir_all(dir).ok();
    }
}
