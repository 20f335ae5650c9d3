//! reqwest-backed admin session.
//!
//! The access token lives in an immutable [`TokenSnapshot`] published through
//! a `watch` sender. Requests read the current snapshot without locking and a
//! refresh replaces it wholesale. Two workers refreshing at the same time only
//! cost one redundant token request; a worker that raced with a refresh and
//! used the stale token gets another 401 and refreshes again.

use crate::api::{AdminApi, AdminConnector};
use crate::error::ApiError;
use crate::model::{ComponentRepresentation, RealmRepresentation, SyncAction, UserQuery};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Connection parameters of an admin session.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    /// Base URL of the server, including any context path (e.g. `/auth/`).
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub realm: String,
    pub client_id: String,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl AdminCredentials {
    pub fn new(server_url: &str, username: &str, password: &str, realm: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            realm: realm.to_string(),
            client_id: "admin-cli".to_string(),
            timeout: Duration::from_secs(10),
            verify_tls: false,
        }
    }
}

#[async_trait]
impl AdminConnector for AdminCredentials {
    async fn connect(&self) -> anyhow::Result<Arc<dyn AdminApi>> {
        let admin = KeycloakAdmin::login(self.clone()).await.with_context(|| {
            format!(
                "Failed to authenticate as '{}' against {}",
                self.username, self.server_url
            )
        })?;
        Ok(Arc::new(admin))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Immutable token pair published by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl From<TokenResponse> for TokenSnapshot {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
        }
    }
}

/// Authenticated admin API session.
pub struct KeycloakAdmin {
    http: Client,
    credentials: AdminCredentials,
    token: watch::Sender<Arc<TokenSnapshot>>,
}

impl KeycloakAdmin {
    /// Authenticates with the password grant and returns a ready session.
    pub async fn login(credentials: AdminCredentials) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(credentials.timeout)
            .danger_accept_invalid_certs(!credentials.verify_tls)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let (token, _) = watch::channel(Arc::new(TokenSnapshot {
            access_token: String::new(),
            refresh_token: None,
        }));
        let admin = Self {
            http,
            credentials,
            token,
        };

        let snapshot = admin.password_grant().await?;
        admin.token.send_replace(Arc::new(snapshot));
        tracing::info!(
            "Authenticated to {} as '{}' (realm {})",
            admin.credentials.server_url,
            admin.credentials.username,
            admin.credentials.realm
        );
        Ok(admin)
    }

    /// Current token snapshot.
    pub fn token(&self) -> Arc<TokenSnapshot> {
        self.token.borrow().clone()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.credentials.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn admin_url(&self, path: &str) -> String {
        self.url(&format!(
            "admin/realms/{}/{}",
            self.credentials.realm,
            path.trim_start_matches('/')
        ))
    }

    fn token_url(&self) -> String {
        self.url(&format!(
            "realms/{}/protocol/openid-connect/token",
            self.credentials.realm
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token();
        request.bearer_auth(&token.access_token)
    }

    async fn password_grant(&self) -> Result<TokenSnapshot, ApiError> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        self.token_request(&form).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenSnapshot, ApiError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSnapshot, ApiError> {
        let response = self.http.post(self.token_url()).form(form).send().await?;
        let response = check(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }
}

/// Turns a non-success response into [`ApiError::Status`].
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Parses a JSON body, tolerating the empty bodies some endpoints return.
async fn json_or_null(response: Response) -> Result<serde_json::Value, ApiError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl AdminApi for KeycloakAdmin {
    fn realm_name(&self) -> &str {
        &self.credentials.realm
    }

    async fn get_realm(&self, name: &str) -> Result<RealmRepresentation, ApiError> {
        let url = self.url(&format!("admin/realms/{name}"));
        let response = self.authorized(self.http.get(url)).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_components(&self) -> Result<Vec<ComponentRepresentation>, ApiError> {
        let response = self
            .authorized(self.http.get(self.admin_url("components")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create_component(
        &self,
        component: &ComponentRepresentation,
    ) -> Result<(), ApiError> {
        let response = self
            .authorized(self.http.post(self.admin_url("components")))
            .json(component)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_component(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .authorized(self.http.delete(self.admin_url(&format!("components/{id}"))))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn query_users(&self, query: &UserQuery) -> Result<Vec<serde_json::Value>, ApiError> {
        let response = self
            .authorized(self.http.get(self.admin_url("users")))
            .query(&query.to_pairs())
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn trigger_sync(
        &self,
        component_id: &str,
        action: SyncAction,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .authorized(
                self.http
                    .post(self.admin_url(&format!("user-storage/{component_id}/sync"))),
            )
            .query(&[("action", action.as_str())])
            .send()
            .await?;
        json_or_null(check(response).await?).await
    }

    async fn refresh_token(&self) -> Result<(), ApiError> {
        let current = self.token();
        let refreshed = match current.refresh_token.as_deref() {
            Some(refresh_token) => match self.refresh_grant(refresh_token).await {
                Ok(snapshot) => snapshot,
                Err(ApiError::Status { status, .. }) if status == 400 || status == 401 => {
                    tracing::debug!("Refresh token rejected ({status}), logging in again");
                    self.password_grant().await?
                }
                Err(e) => return Err(e),
            },
            None => self.password_grant().await?,
        };
        self.token.send_replace(Arc::new(refreshed));
        tracing::debug!("Access token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LDAP_PROVIDER_ID;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer, grant: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/realms/master/protocol/openid-connect/token"))
            .and(body_string_contains(format!("grant_type={grant}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": format!("refresh-{access_token}"),
                "expires_in": 60
            })))
            .mount(server)
            .await;
    }

    fn credentials(server: &MockServer) -> AdminCredentials {
        AdminCredentials::new(&format!("{}/auth/", server.uri()), "admin", "admin", "master")
    }

    #[tokio::test]
    async fn test_login_and_list_components() {
        let server = MockServer::start().await;
        mount_token(&server, "password", "first").await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/master/components"))
            .and(header("authorization", "Bearer first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "1", "name": "ldap-10389", "providerId": "ldap", "parentId": "r"},
                {"id": "2", "name": "hmac", "providerId": "hmac-generated", "parentId": "r"}
            ])))
            .mount(&server)
            .await;

        let admin = KeycloakAdmin::login(credentials(&server)).await.unwrap();
        assert_eq!(admin.token().access_token, "first");

        let ldaps = crate::components_of_kind(&admin, LDAP_PROVIDER_ID)
            .await
            .unwrap();
        assert_eq!(ldaps.len(), 1);
        assert_eq!(ldaps[0].name, "ldap-10389");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_status_error() {
        let server = MockServer::start().await;
        mount_token(&server, "password", "first").await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/realms/master/users"))
            .and(query_param("max", "1"))
            .and(query_param("username", "unknown"))
            .respond_with(ResponseTemplate::new(401).set_body_string("HTTP 401 Unauthorized"))
            .mount(&server)
            .await;

        let admin = KeycloakAdmin::login(credentials(&server)).await.unwrap();
        let err = admin
            .query_users(&UserQuery::unknown_user())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "401: HTTP 401 Unauthorized");
    }

    #[tokio::test]
    async fn test_refresh_uses_refresh_grant() {
        let server = MockServer::start().await;
        mount_token(&server, "password", "first").await;
        mount_token(&server, "refresh_token", "second").await;

        let admin = KeycloakAdmin::login(credentials(&server)).await.unwrap();
        admin.refresh_token().await.unwrap();
        assert_eq!(admin.token().access_token, "second");
        assert_eq!(
            admin.token().refresh_token.as_deref(),
            Some("refresh-second")
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_password_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/realms/master/protocol/openid-connect/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token is not active"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/realms/master/protocol/openid-connect/token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "again",
                "refresh_token": "r"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let admin = KeycloakAdmin::login(credentials(&server)).await.unwrap();
        admin.refresh_token().await.unwrap();
        assert_eq!(admin.token().access_token, "again");
    }

    #[tokio::test]
    async fn test_sync_empty_body_and_server_error() {
        let server = MockServer::start().await;
        mount_token(&server, "password", "first").await;
        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/master/user-storage/ok/sync"))
            .and(query_param("action", "triggerChangedUsersSync"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/admin/realms/master/user-storage/broken/sync"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string("{\"error\":\"unknown_error\"}"),
            )
            .mount(&server)
            .await;

        let admin = KeycloakAdmin::login(credentials(&server)).await.unwrap();
        let value = admin
            .trigger_sync("ok", SyncAction::ChangedUsers)
            .await
            .unwrap();
        assert!(value.is_null());

        let err = admin
            .trigger_sync("broken", SyncAction::ChangedUsers)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().starts_with("500:"));
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_connect() {
        // Port 1 is never listening in the test environment.
        let credentials = AdminCredentials::new("http://127.0.0.1:1/auth/", "admin", "admin", "master");
        let err = match KeycloakAdmin::login(credentials).await {
            Ok(_) => panic!("login against a closed port must fail"),
            Err(e) => e,
        };
        assert!(err.is_connect(), "unexpected error: {err:?}");
    }
}
