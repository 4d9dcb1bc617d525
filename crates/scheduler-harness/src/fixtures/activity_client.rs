//! Activity client fixture for CRUD on `/activity`.

use crate::config::TimePolicy;
use crate::fixtures::http_client::{ApiResponse, Auth, ClientError, HttpClient};
use crate::models::{ActivityFields, ActivityType, ListParams, Validate};
use crate::random::FixtureGenerator;
use reqwest::StatusCode;

/// Activity collection endpoint, relative to the base URL.
const ACTIVITY_PATH: &str = "activity";

/// Client for the authenticated activity endpoints.
///
/// Fields omitted from create and update requests are filled with random
/// values so that concurrent tests never assert on colliding data.
#[derive(Debug)]
pub struct ActivityClient {
    http: HttpClient,
    generator: FixtureGenerator,
    auth_override: Option<Auth>,
    time_policy: TimePolicy,
}

impl ActivityClient {
    /// Create a client bound to a session token.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        generator: FixtureGenerator,
    ) -> Self {
        Self {
            http: HttpClient::with_token(base_url, token),
            generator,
            auth_override: None,
            time_policy: TimePolicy::default(),
        }
    }

    /// Set how the service normalizes `time`, used to send stored values back.
    pub fn with_time_policy(mut self, time_policy: TimePolicy) -> Self {
        self.time_policy = time_policy;
        self
    }

    /// A copy of this client that sends `auth` instead of the bound token.
    ///
    /// The copy draws random fields from a fork of this client's generator.
    pub fn with_auth(&self, auth: Auth) -> Self {
        Self {
            http: self.http.clone(),
            generator: self.generator.fork(),
            auth_override: Some(auth),
            time_policy: self.time_policy,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Fill omitted fields with random values.
    pub fn resolve(&self, fields: ActivityFields) -> ActivityType {
        ActivityType {
            title: fields.title.unwrap_or_else(|| self.generator.title()),
            content: fields.content.unwrap_or_else(|| self.generator.content()),
            time: fields.time.unwrap_or_else(|| self.generator.time()),
            id: None,
        }
    }

    /// `POST /activity`.
    pub async fn create(&self, fields: ActivityFields) -> Result<ApiResponse, ClientError> {
        let activity = self.resolve(fields);
        self.http
            .post(ACTIVITY_PATH, &activity, self.auth_override.as_ref())
            .await
    }

    /// `GET /activity/{id}`.
    pub async fn get_one(&self, id: i64) -> Result<ApiResponse, ClientError> {
        let path = format!("{}/{}", ACTIVITY_PATH, id);
        self.http
            .get(&path, None, self.auth_override.as_ref())
            .await
    }

    /// `GET /activity`, optionally windowed.
    pub async fn get_all(&self, params: Option<ListParams>) -> Result<ApiResponse, ClientError> {
        let query = params.map(|p| [("start", p.start.to_string()), ("end", p.end.to_string())]);
        self.http
            .get(
                ACTIVITY_PATH,
                query.as_ref().map(|q| q.as_slice()),
                self.auth_override.as_ref(),
            )
            .await
    }

    /// Last element of the listing, as ordered by the service.
    ///
    /// Returns `None` for an empty listing. This is not a server-side "most
    /// recent" query.
    pub async fn get_last_added(&self) -> Result<Option<ActivityType>, ClientError> {
        let activities: Vec<ActivityType> = self
            .get_all(None)
            .await?
            .expect_status(StatusCode::OK)?
            .json()?;

        match activities.into_iter().last() {
            Some(activity) => {
                activity.validate()?;
                Ok(Some(activity))
            }
            None => Ok(None),
        }
    }

    /// `PUT /activity/{id}`; omitted fields are randomized.
    pub async fn update(&self, id: i64, fields: ActivityFields) -> Result<ApiResponse, ClientError> {
        let activity = self.resolve(fields);
        self.http
            .put(ACTIVITY_PATH, id, &activity, self.auth_override.as_ref())
            .await
    }

    /// `PUT /activity/{id}` for an existing record; omitted fields keep the
    /// record's current values.
    ///
    /// `existing` is a service response, so its `time` is already normalized;
    /// an omitted `time` is converted back before it is resent.
    pub async fn update_from(
        &self,
        existing: &ActivityType,
        changes: ActivityFields,
    ) -> Result<ApiResponse, ClientError> {
        let id = existing.persisted_id()?;
        let activity = ActivityType {
            title: changes.title.unwrap_or_else(|| existing.title.clone()),
            content: changes.content.unwrap_or_else(|| existing.content.clone()),
            time: changes
                .time
                .unwrap_or_else(|| self.time_policy.submitted_for(existing.time)),
            id: None,
        };
        self.http
            .put(ACTIVITY_PATH, id, &activity, self.auth_override.as_ref())
            .await
    }

    /// `DELETE /activity/{id}`.
    pub async fn delete(&self, id: i64) -> Result<ApiResponse, ClientError> {
        self.http
            .delete(ACTIVITY_PATH, id, self.auth_override.as_ref())
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::random::{CONTENT_LEN, MAX_TIME, TITLE_LEN};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client(server: &MockServer) -> ActivityClient {
        ActivityClient::new(
            format!("{}/v1", server.uri()),
            "session-token",
            FixtureGenerator::from_seed(1),
        )
    }

    fn stored(id: i64, title: &str) -> serde_json::Value {
        serde_json::json!({"id": id, "title": title, "content": "c", "time": 60})
    }

    #[test]
    fn test_resolve_keeps_explicit_fields() {
        let client = ActivityClient::new("http://unused/v1", "t", FixtureGenerator::from_seed(1));
        let activity = client.resolve(ActivityFields::new("t1", "c1", 0));

        assert_eq!(activity.title, "t1");
        assert_eq!(activity.content, "c1");
        assert_eq!(activity.time, 0, "explicit zero must not be replaced");
        assert_eq!(activity.id, None);
    }

    #[test]
    fn test_resolve_randomizes_each_omitted_field_independently() {
        let client = ActivityClient::new("http://unused/v1", "t", FixtureGenerator::from_seed(1));
        let activity = client.resolve(ActivityFields::default().with_content("fixed"));

        assert_eq!(activity.title.len(), TITLE_LEN);
        assert_eq!(activity.content, "fixed");
        assert!((0..=MAX_TIME).contains(&activity.time));

        let other = client.resolve(ActivityFields::default());
        assert_eq!(other.content.len(), CONTENT_LEN);
        assert_ne!(activity.title, other.title);
    }

    #[tokio::test]
    async fn test_create_posts_resolved_activity_with_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/activity"))
            .and(header("Authorization", "session-token"))
            .and(body_json(serde_json::json!({"title": "t1", "content": "c1", "time": 10})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 1, "title": "t1", "content": "c1", "time": 600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client(&mock_server)
            .create(ActivityFields::new("t1", "c1", 10))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: ActivityType = response.model().unwrap();
        assert_eq!(created.id, Some(1));
    }

    #[tokio::test]
    async fn test_get_last_added_empty_listing_returns_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/activity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&mock_server)
            .await;

        let last = client(&mock_server).get_last_added().await.unwrap();
        assert_eq!(last, None);
    }

    #[tokio::test]
    async fn test_get_last_added_returns_structurally_last_element() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/activity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                stored(9, "newest-by-id"),
                stored(2, "listed-last"),
            ])))
            .mount(&mock_server)
            .await;

        let last = client(&mock_server).get_last_added().await.unwrap().unwrap();
        assert_eq!(last.id, Some(2));
        assert_eq!(last.title, "listed-last");
    }

    #[tokio::test]
    async fn test_get_last_added_rejects_non_ok_listing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/activity"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).get_last_added().await;
        assert!(matches!(result, Err(ClientError::UnexpectedStatus { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_update_from_keeps_unchanged_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/activity/4"))
            .and(body_json(serde_json::json!({"title": "t2", "content": "c1", "time": 10})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 4, "title": "t2", "content": "c1", "time": 600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let existing = ActivityType {
            title: "t1".to_string(),
            content: "c1".to_string(),
            time: 600,
            id: Some(4),
        };

        let response = client(&mock_server)
            .update_from(&existing, ActivityFields::default().with_title("t2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_update_from_resends_stored_time_in_submitted_units() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/activity/4"))
            .respond_with(|request: &Request| {
                let mut stored: serde_json::Value = request.body_json().unwrap();
                let submitted = stored["time"].as_i64().unwrap();
                stored["time"] = serde_json::json!(submitted * 60);
                stored["id"] = serde_json::json!(4);
                ResponseTemplate::new(201).set_body_json(stored)
            })
            .expect(1)
            .mount(&mock_server)
            .await;

        let existing = ActivityType {
            title: "t1".to_string(),
            content: "c1".to_string(),
            time: TimePolicy::MinutesToSeconds.expected(10),
            id: Some(4),
        };

        let response = client(&mock_server)
            .with_time_policy(TimePolicy::MinutesToSeconds)
            .update_from(&existing, ActivityFields::default().with_title("t2"))
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let sent: serde_json::Value = requests.first().unwrap().body_json().unwrap();
        assert_eq!(sent["time"], 10);

        let updated: ActivityType = response.model().unwrap();
        assert_eq!(updated.title, "t2");
        assert_eq!(updated.time, existing.time, "omitted time should keep its stored value");
    }

    #[tokio::test]
    async fn test_update_from_sends_explicit_time_unchanged() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v1/activity/4"))
            .and(body_json(serde_json::json!({"title": "t1", "content": "c1", "time": 7})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let existing = ActivityType {
            title: "t1".to_string(),
            content: "c1".to_string(),
            time: 600,
            id: Some(4),
        };

        client(&mock_server)
            .update_from(&existing, ActivityFields::default().with_time(7))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_from_requires_persisted_id() {
        let mock_server = MockServer::start().await;
        let unsaved = ActivityType {
            title: "t".to_string(),
            content: "c".to_string(),
            time: 1,
            id: None,
        };

        let result = client(&mock_server)
            .update_from(&unsaved, ActivityFields::default())
            .await;
        assert!(matches!(result, Err(ClientError::SchemaError(_))));
    }

    #[tokio::test]
    async fn test_with_auth_anonymous_drops_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/activity/5"))
            .respond_with(|request: &Request| {
                if request.headers.contains_key("authorization") {
                    ResponseTemplate::new(200)
                } else {
                    ResponseTemplate::new(401)
                }
            })
            .mount(&mock_server)
            .await;

        let anonymous = client(&mock_server).with_auth(Auth::Anonymous);
        let response = anonymous.delete(5).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
