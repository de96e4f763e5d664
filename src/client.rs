//! TestRail API client
//!
//! Records case results for a run, attaches screenshots to results and closes
//! runs. All requests use HTTP Basic auth built from [`TestRailConfig`].

use std::path::Path;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TestRailConfig;
use crate::extract::{CaseResult, Extraction};

/// TestRail status id of a test that has no result yet
pub const STATUS_UNTESTED: u8 = 3;

/// Error recording results or closing a run
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("TestRail returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("invalid response from {url}: {source}")]
    InvalidResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "run {run_id} still has {untested} untested tests, set TESTRAIL_ALLOW_CLOSING_PARTIAL_RUN to close it anyway"
    )]
    UntestedCases { run_id: u64, untested: usize },
}

/// Error uploading a screenshot. Never propagated past [`AttachmentOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("attachment upload failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("TestRail returned {status} for attachment upload: {body}")]
    Status { status: StatusCode, body: String },
}

/// Result of a best-effort screenshot upload
#[must_use]
#[derive(Debug)]
pub enum AttachmentOutcome {
    Uploaded,
    /// The screenshot file does not exist
    Skipped,
    Failed(AttachmentError),
}

impl AttachmentOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, AttachmentOutcome::Uploaded)
    }
}

/// Body returned by `add_results_for_cases`
#[derive(Debug, Clone, PartialEq)]
pub struct AddResultsResponse(pub Value);

impl AddResultsResponse {
    /// Id of the first created result, when the body is a non-empty array
    pub fn first_result_id(&self) -> Option<u64> {
        self.0.as_array()?.first()?.get("id")?.as_u64()
    }
}

/// Outcome of reporting one spec
#[derive(Debug)]
pub struct Submission {
    pub response: AddResultsResponse,
    /// `None` when there was no screenshot or no result id to attach it to
    pub attachment: Option<AttachmentOutcome>,
}

#[derive(Debug, Serialize)]
struct AddResultsRequest<'a> {
    results: &'a [CaseResult],
}

/// A test within a run, as returned by `get_tests`
#[derive(Debug, Clone, Deserialize)]
pub struct RunTest {
    pub id: u64,
    #[serde(default)]
    pub case_id: Option<u64>,
    pub status_id: u8,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GetTestsResponse {
    Page {
        tests: Vec<RunTest>,
        #[serde(default, rename = "_links")]
        links: Option<Links>,
    },
    Bare(Vec<RunTest>),
}

#[derive(Debug, Deserialize)]
struct Links {
    next: Option<String>,
}

/// Client for the TestRail REST API v2
#[derive(Debug, Clone)]
pub struct TestRailClient {
    http: reqwest::Client,
    config: TestRailConfig,
}

impl TestRailClient {
    pub fn new(config: TestRailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &TestRailConfig {
        &self.config
    }

    /// Record all results of a spec in one request
    pub async fn add_results_for_cases(
        &self,
        run_id: u64,
        results: &[CaseResult],
    ) -> Result<AddResultsResponse, SubmissionError> {
        debug!(
            count = results.len(),
            run_id, "sending test results to TestRail"
        );
        let url = self
            .config
            .api_url(&format!("add_results_for_cases/{run_id}"));
        let request = self.http.post(&url).json(&AddResultsRequest { results });

        let json = self.send_json(request, url).await?;
        debug!(response = %json, "TestRail response");

        Ok(AddResultsResponse(json))
    }

    /// Upload a screenshot to an existing result.
    ///
    /// A missing file is skipped. Failures are logged and returned, not raised.
    pub async fn add_attachment_to_result(
        &self,
        result_id: u64,
        path: &Path,
    ) -> AttachmentOutcome {
        if !path.exists() {
            debug!(path = %path.display(), "screenshot not found, skipping attachment");
            return AttachmentOutcome::Skipped;
        }

        match self.upload_attachment(result_id, path).await {
            Ok(()) => {
                debug!(result_id, path = %path.display(), "attachment uploaded");
                AttachmentOutcome::Uploaded
            }
            Err(e) => {
                warn!(result_id, path = %path.display(), error = %e, "Attachment upload failed");
                AttachmentOutcome::Failed(e)
            }
        }
    }

    async fn upload_attachment(&self, result_id: u64, path: &Path) -> Result<(), AttachmentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AttachmentError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "screenshot.png".to_string());
        let form = Form::new().part("attachment", Part::bytes(bytes).file_name(file_name));

        let url = self
            .config
            .api_url(&format!("add_attachment_to_result/{result_id}"));
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, self.config.authorization())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttachmentError::Status { status, body });
        }

        Ok(())
    }

    /// Record a spec's results, then attach its screenshot to the first
    /// created result.
    pub async fn submit(
        &self,
        run_id: u64,
        extraction: &Extraction,
    ) -> Result<Submission, SubmissionError> {
        let response = self
            .add_results_for_cases(run_id, &extraction.results)
            .await?;
        info!(
            count = extraction.results.len(),
            run_id, "recorded TestRail results"
        );

        let attachment = match (response.first_result_id(), &extraction.screenshot) {
            (Some(result_id), Some(path)) => {
                Some(
                    self.add_attachment_to_result(result_id, Path::new(path))
                        .await,
                )
            }
            _ => None,
        };

        Ok(Submission {
            response,
            attachment,
        })
    }

    /// All tests of a run, following pagination links
    pub async fn get_tests(&self, run_id: u64) -> Result<Vec<RunTest>, SubmissionError> {
        let mut url = self.config.api_url(&format!("get_tests/{run_id}"));
        let mut tests = Vec::new();

        loop {
            let json = self.send_json(self.http.get(&url), url.clone()).await?;
            let page: GetTestsResponse =
                serde_json::from_value(json).map_err(|source| SubmissionError::InvalidResponse {
                    url: url.clone(),
                    source,
                })?;

            match page {
                GetTestsResponse::Bare(page) => {
                    tests.extend(page);
                    break;
                }
                GetTestsResponse::Page { tests: page, links } => {
                    tests.extend(page);
                    match links.and_then(|l| l.next) {
                        // next is relative to index.php, e.g. "/api/v2/get_tests/1&offset=250"
                        Some(next) => url = format!("{}/index.php?{next}", self.config.host),
                        None => break,
                    }
                }
            }
        }

        debug!(run_id, count = tests.len(), "fetched run tests");
        Ok(tests)
    }

    /// Close a run unconditionally
    pub async fn close_run(&self, run_id: u64) -> Result<Value, SubmissionError> {
        let url = self.config.api_url(&format!("close_run/{run_id}"));
        let request = self.http.post(&url).json(&serde_json::json!({}));
        self.send_json(request, url).await
    }

    /// Close a run, refusing while any of its tests is untested unless
    /// `allow_partial` is set
    pub async fn close_run_checked(
        &self,
        run_id: u64,
        allow_partial: bool,
    ) -> Result<Value, SubmissionError> {
        if !allow_partial {
            let untested = self
                .get_tests(run_id)
                .await?
                .iter()
                .filter(|t| t.status_id == STATUS_UNTESTED)
                .count();
            if untested > 0 {
                return Err(SubmissionError::UntestedCases { run_id, untested });
            }
        }

        info!(run_id, allow_partial, "closing TestRail run");
        self.close_run(run_id).await
    }

    async fn send_json(
        &self,
        request: RequestBuilder,
        url: String,
    ) -> Result<Value, SubmissionError> {
        let response = request
            .header(AUTHORIZATION, self.config.authorization())
            .send()
            .await
            .map_err(|source| SubmissionError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| SubmissionError::Transport {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(SubmissionError::Status { url, status, body });
        }

        serde_json::from_str(&body).map_err(|source| SubmissionError::InvalidResponse { url, source })
    }
}
