//! Step definitions for extract.feature

use cucumber::{given, then, when};
use testrail_simple::extract::{self, CaseResult, Screenshot, Status, TestOutcome};

use crate::world::ReporterWorld;

fn case_result(world: &ReporterWorld, case_id: u64) -> &CaseResult {
    world
        .extraction
        .as_ref()
        .expect("Results should be extracted")
        .results
        .iter()
        .find(|r| r.case_id == case_id)
        .unwrap_or_else(|| panic!("No result for case {case_id}"))
}

// ============================================================================
// Given steps
// ============================================================================

#[given(expr = "a {string} test titled {string}")]
fn given_test(world: &mut ReporterWorld, state: String, title: String) {
    world.tests.push(TestOutcome {
        title: vec!["suite".to_string(), title],
        state,
        ..TestOutcome::default()
    });
}

#[given(expr = "a test titled {string} inside suite {string}")]
fn given_test_in_suite(world: &mut ReporterWorld, title: String, suite: String) {
    world.tests.push(TestOutcome {
        title: vec![suite, title],
        state: "passed".to_string(),
        ..TestOutcome::default()
    });
}

#[given(expr = "a failed test titled {string} with body {string} and error {string}")]
fn given_failed_test(world: &mut ReporterWorld, title: String, body: String, error: String) {
    world.tests.push(TestOutcome {
        title: vec!["suite".to_string(), title],
        state: "failed".to_string(),
        body: Some(body),
        display_error: Some(error),
    });
}

#[given(expr = "a screenshot at {string}")]
fn given_screenshot(world: &mut ReporterWorld, path: String) {
    world.screenshots.push(Screenshot { path });
}

// ============================================================================
// When steps
// ============================================================================

#[when("the results are extracted")]
fn when_extracted(world: &mut ReporterWorld) {
    let screenshots = (!world.screenshots.is_empty()).then_some(world.screenshots.as_slice());
    world.extraction = Some(extract::extract(&world.tests, screenshots));
}

// ============================================================================
// Then steps
// ============================================================================

#[then(expr = "there are {int} case results")]
fn then_result_count(world: &mut ReporterWorld, count: usize) {
    let extraction = world.extraction.as_ref().expect("Results should be extracted");
    assert_eq!(extraction.results.len(), count);
}

#[then(expr = "case {int} has status {int} and no comment")]
fn then_status_no_comment(world: &mut ReporterWorld, case_id: u64, status: u8) {
    let result = case_result(world, case_id);
    assert_eq!(result.status_id.id(), status);
    assert_eq!(result.comment, None);
}

#[then(expr = "case {int} has status {int}")]
fn then_status(world: &mut ReporterWorld, case_id: u64, status: u8) {
    assert_eq!(case_result(world, case_id).status_id.id(), status);
}

#[then(expr = "the comment for case {int} contains {string}")]
fn then_comment_contains(world: &mut ReporterWorld, case_id: u64, text: String) {
    let comment = case_result(world, case_id)
        .comment
        .as_deref()
        .expect("Failed case should have a comment");
    assert!(comment.contains(&text), "{comment:?} should contain {text:?}");
}

#[then(expr = "all case results are failures")]
fn then_all_failed(world: &mut ReporterWorld) {
    let extraction = world.extraction.as_ref().expect("Results should be extracted");
    assert!(extraction.results.iter().all(|r| r.status_id == Status::Failed));
}

#[then(expr = "the selected screenshot is {string}")]
fn then_screenshot(world: &mut ReporterWorld, path: String) {
    let extraction = world.extraction.as_ref().expect("Results should be extracted");
    assert_eq!(extraction.screenshot.as_deref(), Some(path.as_str()));
}

#[then("no screenshot is selected")]
fn then_no_screenshot(world: &mut ReporterWorld) {
    let extraction = world.extraction.as_ref().expect("Results should be extracted");
    assert_eq!(extraction.screenshot, None);
}
