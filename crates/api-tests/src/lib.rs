//! Scheduler API Scenario Suite
//!
//! End-to-end scenarios for the scheduling service, run by the
//! `scheduler_harness` scenario runner against one provisioned stack.
//!
//! # Features
//!
//! - `smoke`: listing, creation and auth primitives
//! - `flows`: create, update and delete workflows
//! - `all`: enable all scenario categories
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 scenarios (no default features)
//! cargo test
//!
//! # Against a service already listening on BASE_URL
//! BASE_URL=http://localhost:8080/v1 cargo test -p api-tests --features all
//!
//! # Start the stores and the service image in containers
//! IS_CONTAINERS=true SERVER_TAG=main cargo test -p api-tests --features all
//!
//! # Replay a failing run's random fixtures, one scenario only
//! FIXTURE_SEED=1234 cargo test -p api-tests --features all -- update
//! ```
//!
//! The helpers below panic with a descriptive message; that is how a
//! scenario reports failure to the runner.

use scheduler_harness::fixtures::{ActivityClient, ApiResponse, SessionClient};
use scheduler_harness::models::{ActivityFields, ActivityType};
use scheduler_harness::runner::ScenarioContext;

/// Register and log in a fresh user, or fail the scenario.
pub async fn session(context: &ScenarioContext) -> SessionClient {
    context
        .session()
        .await
        .expect("Session setup should succeed - is the service reachable?")
}

/// Assert the status and return the body as one activity.
pub fn activity_body(response: ApiResponse, expected: u16) -> ActivityType {
    let response = response
        .expect_status(status(expected))
        .unwrap_or_else(|e| panic!("{}", e));
    response
        .json()
        .unwrap_or_else(|e| panic!("Body should be an activity: {}", e))
}

/// Assert the status and return the body as a list of activities.
pub fn activity_list(response: ApiResponse) -> Vec<ActivityType> {
    let response = response
        .expect_status(status(200))
        .unwrap_or_else(|e| panic!("{}", e));
    response
        .json()
        .unwrap_or_else(|e| panic!("Body should be an activity list: {}", e))
}

/// List the session user's activities.
pub async fn list(activity: &ActivityClient) -> Vec<ActivityType> {
    activity_list(
        activity
            .get_all(None)
            .await
            .expect("List request should complete"),
    )
}

/// Create an activity and return the persisted record as listed.
///
/// The record is found by its title and content, so this does not rely on
/// the listing order.
pub async fn create_persisted(activity: &ActivityClient, fields: ActivityFields) -> ActivityType {
    let response = activity
        .create(fields)
        .await
        .expect("Create request should complete");
    let created = activity_body(response, 201);

    let listed = list(activity)
        .await
        .into_iter()
        .find(|a| a.title == created.title && a.content == created.content)
        .unwrap_or_else(|| panic!("Created activity should be listed: {:?}", created));
    assert!(listed.id.is_some(), "Listed activity has no id: {:?}", listed);
    listed
}

/// Assert `actual` carries the submitted fields, with `time` normalized by
/// the run's policy.
pub fn assert_matches_submitted(
    context: &ScenarioContext,
    actual: &ActivityType,
    title: &str,
    content: &str,
    time: i64,
) {
    assert_eq!(actual.title, title, "title should round-trip verbatim");
    assert_eq!(actual.content, content, "content should round-trip verbatim");
    assert_eq!(
        actual.time,
        context.time_policy().expected(time),
        "time {} should follow the {:?} policy",
        time,
        context.time_policy()
    );
}

fn status(code: u16) -> reqwest::StatusCode {
    reqwest::StatusCode::from_u16(code).expect("valid status code")
}
