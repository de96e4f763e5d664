//! Test runner lifecycle integration
//!
//! Binds a [`SpecReporter`] to the runner's `after:spec` event. Registration
//! is a no-op when the plugin is skipped or no TestRail variables are set, so
//! the plugin can stay installed in environments without TestRail.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::client::{Submission, SubmissionError, TestRailClient};
use crate::config::{self, ConfigError, Env, TestRailConfig};
use crate::extract::{self, CaseResult, Spec, SpecResults};

/// Name of the event fired when a spec file finishes
pub const AFTER_SPEC: &str = "after:spec";

/// Payload of one `after:spec` event
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AfterSpecEvent {
    pub spec: Spec,
    pub results: SpecResults,
}

/// Host side of the event subscription
pub trait EventRegistrar {
    /// Bind `reporter` to [`AFTER_SPEC`]. The host must await the future
    /// returned by [`SpecReporter::on_after_spec`] before moving on.
    fn on_after_spec(&mut self, reporter: Arc<SpecReporter>);
}

/// What [`register`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The caller disabled the plugin
    Skipped,
    /// No TestRail variables are set
    NotConfigured,
    Registered { run_id: u64 },
}

/// Register the reporter with the test runner.
///
/// Credentials and the run id are resolved once, here. A missing run id
/// aborts registration.
pub fn register<R: EventRegistrar + ?Sized>(
    registrar: &mut R,
    env: &Env,
    cwd: &Path,
    skip: bool,
) -> Result<Registration, ConfigError> {
    if skip {
        debug!("the user explicitly disabled the plugin");
        return Ok(Registration::Skipped);
    }

    if !config::has_config(env) {
        debug!("TestRail env variables are not set");
        return Ok(Registration::NotConfigured);
    }

    let testrail = TestRailConfig::from_env(env)?;
    let run_id = config::resolve_run_id(env, cwd)?.ok_or(ConfigError::MissingRunId)?;

    debug!(run_id, host = %testrail.host, event = AFTER_SPEC, "registering TestRail reporter");
    let reporter = SpecReporter::new(TestRailClient::new(testrail), run_id);
    registrar.on_after_spec(Arc::new(reporter));

    Ok(Registration::Registered { run_id })
}

/// Reports the results of finished specs to one TestRail run
#[derive(Debug)]
pub struct SpecReporter {
    client: TestRailClient,
    run_id: u64,
}

impl SpecReporter {
    pub fn new(client: TestRailClient, run_id: u64) -> Self {
        Self { client, run_id }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Handle `after:spec`.
    ///
    /// Returns `Ok(None)` without touching the network when no test in the
    /// spec references a TestRail case.
    pub async fn on_after_spec(
        &self,
        spec: &Spec,
        results: &SpecResults,
    ) -> Result<Option<Submission>, SubmissionError> {
        debug!(spec = %spec.relative, tests = results.tests.len(), "after:spec");

        let extraction = extract::extract(&results.tests, results.screenshots.as_deref());
        if extraction.is_empty() {
            debug!(spec = %spec.relative, "no TestRail cases in spec");
            return Ok(None);
        }

        info!("TestRail results in {}", spec.relative);
        println!("{}", results_table(&extraction.results));

        self.client.submit(self.run_id, &extraction).await.map(Some)
    }
}

/// Render the `case_id`/`status_id` summary printed before submitting
pub fn results_table(results: &[CaseResult]) -> String {
    const HEADERS: [&str; 2] = ["case_id", "status_id"];

    let rows: Vec<[String; 2]> = results
        .iter()
        .map(|r| [r.case_id.to_string(), r.status_id.id().to_string()])
        .collect();
    let widths = [0, 1].map(|col| {
        rows.iter()
            .map(|row| row[col].len())
            .chain([HEADERS[col].len()])
            .max()
            .unwrap_or(0)
    });

    let line = |cells: [&str; 2]| {
        format!(
            "| {:<w0$} | {:<w1$} |",
            cells[0],
            cells[1],
            w0 = widths[0],
            w1 = widths[1]
        )
    };

    let mut out = vec![
        line(HEADERS),
        format!("|-{}-|-{}-|", "-".repeat(widths[0]), "-".repeat(widths[1])),
    ];
    out.extend(rows.iter().map(|row| line([row[0].as_str(), row[1].as_str()])));
    out.join("\n")
}

/// In-process registrar that keeps the handler and dispatches events to it
#[derive(Debug, Default)]
pub struct LocalEvents {
    after_spec: Option<Arc<SpecReporter>>,
}

impl LocalEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_after_spec(&self) -> bool {
        self.after_spec.is_some()
    }

    /// Fire `after:spec`; `Ok(None)` when nothing is subscribed
    pub async fn emit_after_spec(
        &self,
        spec: &Spec,
        results: &SpecResults,
    ) -> Result<Option<Submission>, SubmissionError> {
        match &self.after_spec {
            Some(reporter) => reporter.on_after_spec(spec, results).await,
            None => Ok(None),
        }
    }
}

impl EventRegistrar for LocalEvents {
    fn on_after_spec(&mut self, reporter: Arc<SpecReporter>) {
        self.after_spec = Some(reporter);
    }
}
