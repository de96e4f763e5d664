//! Mapping of finished tests to TestRail case results
//!
//! Only tests whose own title carries a `C<id>` marker followed by whitespace
//! are reported. Suite titles are never inspected.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

static CASE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"C([0-9]+)\s").unwrap());

/// Spec file descriptor sent with the `after:spec` event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Spec {
    pub name: String,
    /// Path relative to the project root
    pub relative: String,
    pub absolute: String,
}

/// Results of one spec file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecResults {
    #[serde(default)]
    pub tests: Vec<TestOutcome>,
    #[serde(default)]
    pub screenshots: Option<Vec<Screenshot>>,
}

/// A single finished test as reported by the runner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestOutcome {
    /// Suite titles followed by the test's own title
    #[serde(default)]
    pub title: Vec<String>,
    /// Terminal state: "passed", "failed", "pending", ...
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "displayError")]
    pub display_error: Option<String>,
}

/// Screenshot captured during the spec
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Screenshot {
    pub path: String,
}

/// TestRail result status.
///
/// TestRail also knows Blocked (2), Untested (3) and Retest (4); every
/// non-passed runner state currently collapses to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed,
}

impl Status {
    pub fn id(self) -> u8 {
        match self {
            Status::Passed => 1,
            Status::Failed => 5,
        }
    }

    pub fn from_state(state: &str) -> Self {
        if state == "passed" {
            Status::Passed
        } else {
            Status::Failed
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

/// One entry of the `add_results_for_cases` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub case_id: u64,
    pub status_id: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Case results for one spec plus the screenshot to attach, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub results: Vec<CaseResult>,
    pub screenshot: Option<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Extract the case id from a test title, e.g. `"C123 logs in"` gives 123
pub fn case_id(title: &str) -> Option<u64> {
    let caps = CASE_ID.captures(title)?;
    let digits = &caps[1];
    match digits.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(title, error = %e, "case id out of range, skipping test");
            None
        }
    }
}

/// Build the TestRail results for a finished spec.
///
/// Input order is preserved. For failed tracked tests the last screenshot
/// whose path contains `C<id>` becomes the batch screenshot, replacing the
/// one picked for an earlier failure.
pub fn extract(tests: &[TestOutcome], screenshots: Option<&[Screenshot]>) -> Extraction {
    let mut extraction = Extraction::default();

    for test in tests {
        // only the test name, not the suite titles
        let Some(name) = test.title.last() else {
            continue;
        };
        let Some(case_id) = case_id(name) else {
            continue;
        };

        let status_id = Status::from_state(&test.state);
        let mut result = CaseResult {
            case_id,
            status_id,
            comment: None,
        };

        if status_id != Status::Passed {
            result.comment = failure_comment(test);

            if let Some(shot) = screenshots.and_then(|s| find_screenshot(s, case_id)) {
                debug!(case_id, path = %shot.path, "matched screenshot");
                extraction.screenshot = Some(shot.path.clone());
            }
        }

        extraction.results.push(result);
    }

    extraction
}

fn find_screenshot(screenshots: &[Screenshot], case_id: u64) -> Option<&Screenshot> {
    let marker = format!("C{case_id}");
    screenshots.iter().rev().find(|s| s.path.contains(&marker))
}

/// Comment recorded with a failed result, when the runner gave enough detail
fn failure_comment(test: &TestOutcome) -> Option<String> {
    let body = test.body.as_deref().filter(|b| !b.is_empty())?;
    let error = test.display_error.as_deref().filter(|e| !e.is_empty())?;
    if test.title.is_empty() {
        return None;
    }

    Some(format!(
        "Error Message:\n{} failed.\n\nError body:\n{body}.\n\nError stacktrace:\n{error}",
        test.title.join("--")
    ))
}
