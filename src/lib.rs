//! testrail-simple - TestRail reporter for test runner specs
//!
//! Matches finished tests to TestRail cases by the `C<id>` marker in their
//! title and records pass/fail results for a TestRail run.

pub mod client;
pub mod config;
pub mod extract;
pub mod plugin;
