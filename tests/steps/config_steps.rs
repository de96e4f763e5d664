//! Step definitions for config.feature

use cucumber::{given, then, when};
use testrail_simple::config::{self, Env, RUN_ID_FILE, TestRailConfig};
use testrail_simple::plugin::{self, LocalEvents, Registration};

use crate::world::ReporterWorld;

// ============================================================================
// Helper functions
// ============================================================================

fn env(world: &ReporterWorld) -> Env {
    world.env_vars.iter().cloned().collect()
}

fn set_var(world: &mut ReporterWorld, key: &str, value: &str) {
    world.env_vars.retain(|(k, _)| k != key);
    world.env_vars.push((key.to_string(), value.to_string()));
}

// ============================================================================
// Given steps
// ============================================================================

#[given("an environment without TestRail variables")]
fn given_no_testrail_env(world: &mut ReporterWorld) {
    world.env_vars = vec![
        ("HOME".to_string(), "/home/ci".to_string()),
        ("CI".to_string(), "true".to_string()),
    ];
}

#[given("a complete TestRail environment")]
fn given_complete_env(world: &mut ReporterWorld) {
    set_var(world, config::TESTRAIL_HOST, "https://example.testrail.io");
    set_var(world, config::TESTRAIL_USERNAME, "bot@example.com");
    set_var(world, config::TESTRAIL_PASSWORD, "api-key");
    set_var(world, config::TESTRAIL_PROJECTID, "7");
}

#[given(expr = "a complete TestRail environment with username {string} and password {string}")]
fn given_env_with_credentials(world: &mut ReporterWorld, username: String, password: String) {
    given_complete_env(world);
    set_var(world, config::TESTRAIL_USERNAME, &username);
    set_var(world, config::TESTRAIL_PASSWORD, &password);
}

#[given(expr = "the variable {string} is removed")]
fn given_variable_removed(world: &mut ReporterWorld, key: String) {
    world.env_vars.retain(|(k, _)| *k != key);
}

#[given(expr = "the variable {string} is {string}")]
fn given_variable(world: &mut ReporterWorld, key: String, value: String) {
    set_var(world, &key, &value);
}

#[given(expr = "a runId.txt file containing {string}")]
fn given_run_id_file(world: &mut ReporterWorld, content: String) {
    let path = world.cwd().join(RUN_ID_FILE);
    std::fs::write(path, content).expect("Failed to write runId.txt");
}

// ============================================================================
// When steps
// ============================================================================

#[when("the configuration is resolved")]
fn when_config_resolved(world: &mut ReporterWorld) {
    match TestRailConfig::from_env(&env(world)) {
        Ok(config) => world.authorization = Some(config.authorization()),
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when("the run id is resolved")]
fn when_run_id_resolved(world: &mut ReporterWorld) {
    let env = env(world);
    let resolved = config::resolve_run_id(&env, world.cwd());
    match resolved {
        Ok(run_id) => world.run_id = run_id,
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when("the plugin is registered")]
fn when_plugin_registered(world: &mut ReporterWorld) {
    let env = env(world);
    let mut events = LocalEvents::new();
    let registered = plugin::register(&mut events, &env, world.cwd(), false);
    match registered {
        Ok(registration) => world.registration = Some(registration),
        Err(e) => world.last_error = Some(e.to_string()),
    }
    world.subscribed = events.has_after_spec();
}

// ============================================================================
// Then steps
// ============================================================================

#[then("the plugin is not configured")]
fn then_not_configured(world: &mut ReporterWorld) {
    assert_eq!(world.registration, Some(Registration::NotConfigured));
    assert!(!world.subscribed, "No handler should be subscribed");
}

#[then(expr = "the plugin is registered for run {int}")]
fn then_registered(world: &mut ReporterWorld, run_id: u64) {
    assert_eq!(world.registration, Some(Registration::Registered { run_id }));
    assert!(world.subscribed, "after:spec handler should be subscribed");
}

#[then(expr = "the error message is {string}")]
fn then_error_message(world: &mut ReporterWorld, message: String) {
    assert_eq!(world.last_error.as_deref(), Some(message.as_str()));
}

#[then(expr = "registration fails with {string}")]
fn then_registration_fails(world: &mut ReporterWorld, message: String) {
    assert!(world.registration.is_none(), "Registration should fail");
    assert!(!world.subscribed);
    assert_eq!(world.last_error.as_deref(), Some(message.as_str()));
}

#[then(expr = "the run id is {int}")]
fn then_run_id(world: &mut ReporterWorld, run_id: u64) {
    assert_eq!(world.last_error, None);
    assert_eq!(world.run_id, Some(run_id));
}

#[then("no run id is found")]
fn then_no_run_id(world: &mut ReporterWorld) {
    assert_eq!(world.last_error, None);
    assert_eq!(world.run_id, None);
}

#[then(expr = "the authorization header is {string}")]
fn then_authorization(world: &mut ReporterWorld, expected: String) {
    assert_eq!(world.authorization.as_deref(), Some(expected.as_str()));
}
