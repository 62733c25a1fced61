//! HTTP client for the safety backend.

use std::sync::Arc;

use async_trait::async_trait;
use guardian_core::AlertStatus;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{SafetyBackend, StaticToken, TokenProvider};
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::types::{ContactPayload, LocationUpdate, NewAlert, RemoteAlert, RemoteContact};

type Form = Vec<(&'static str, String)>;

/// Client for the PHP safety backend.
///
/// Requests are form-encoded; every response is a JSON object with a
/// `success` flag and a `message`.
#[derive(Clone)]
pub struct SafetyClient {
    http: Client,
    config: BackendConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl SafetyClient {
    /// Build a client using the token from `config`.
    pub fn new(config: BackendConfig) -> Result<Self, ApiError> {
        let tokens = Arc::new(StaticToken(config.auth_token.clone()));
        Self::with_token_provider(config, tokens)
    }

    /// Build a client that asks `tokens` for the bearer credential on each request.
    pub fn with_token_provider(
        config: BackendConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::Config("backend base URL is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_form(&self, script: &str, form: &Form) -> Result<Value, ApiError> {
        let url = self.config.endpoint(script);
        debug!("POST {}", url);

        let request = self.authorize(self.http.post(&url).form(form));
        let response = request.send().await.map_err(ApiError::Http)?;
        read_envelope(response).await
    }

    async fn get(&self, script: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.config.endpoint(script);
        debug!("GET {}", url);

        let request = self.authorize(self.http.get(&url).query(query));
        let response = request.send().await.map_err(ApiError::Http)?;
        read_envelope(response).await
    }
}

#[async_trait]
impl SafetyBackend for SafetyClient {
    async fn create_alert(&self, user_id: &str, alert: &NewAlert) -> Result<String, ApiError> {
        let (latitude, longitude) = match alert.point {
            Some(p) => (p.latitude.to_string(), p.longitude.to_string()),
            None => (String::new(), String::new()),
        };

        let form: Form = vec![
            ("user_id", user_id.to_string()),
            ("latitude", latitude),
            ("longitude", longitude),
            ("address", alert.address.clone().unwrap_or_default()),
            ("type", alert.alert_type.as_str().to_string()),
            ("status", alert.status.as_str().to_string()),
        ];

        let body = self.post_form("create_alert.php", &form).await?;
        nested_id(&body, "alert", "alert.id")
    }

    async fn update_alert_status(
        &self,
        alert_id: &str,
        status: AlertStatus,
        user_id: &str,
    ) -> Result<(), ApiError> {
        let form: Form = vec![
            ("alert_id", alert_id.to_string()),
            ("status", status.as_str().to_string()),
            ("user_id", user_id.to_string()),
        ];

        self.post_form("update_alert_status.php", &form).await?;
        Ok(())
    }

    async fn alert_history(&self, user_id: &str) -> Result<Vec<RemoteAlert>, ApiError> {
        let body = self
            .get("get_alert_history.php", &[("user_id", user_id)])
            .await?;
        list_field(body, "alerts")
    }

    async fn add_contact(&self, contact: &ContactPayload) -> Result<String, ApiError> {
        let body = self
            .post_form("add_contact.php", &contact_form(contact))
            .await?;
        nested_id(&body, "contact", "contact.id")
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        contact: &ContactPayload,
    ) -> Result<(), ApiError> {
        let mut form = contact_form(contact);
        form.push(("contact_id", contact_id.to_string()));

        self.post_form("update_contact.php", &form).await?;
        Ok(())
    }

    async fn delete_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        let form: Form = vec![("contact_id", contact_id.to_string())];
        self.post_form("delete_contact.php", &form).await?;
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<RemoteContact>, ApiError> {
        let body = self.get("get_contacts.php", &[]).await?;
        list_field(body, "contacts")
    }

    async fn update_location(
        &self,
        user_id: &str,
        update: &LocationUpdate,
    ) -> Result<(), ApiError> {
        let form: Form = vec![
            ("user_id", user_id.to_string()),
            ("latitude", update.latitude.to_string()),
            ("longitude", update.longitude.to_string()),
            ("accuracy", update.accuracy.to_string()),
            ("timestamp", update.timestamp.to_string()),
            ("address", update.address.clone().unwrap_or_default()),
        ];

        self.post_form("update_location.php", &form).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = self.config.health_url();
        debug!("Health check: {}", url);

        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(ApiError::Http)?;

        // Any answer short of a server error means the backend is up.
        Ok(!response.status().is_server_error())
    }
}

impl std::fmt::Debug for SafetyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

fn contact_form(contact: &ContactPayload) -> Form {
    vec![
        ("name", contact.name.clone()),
        ("phone", contact.phone.clone()),
        ("relationship", contact.relationship.clone()),
        ("is_primary", if contact.is_primary { "1" } else { "0" }.to_string()),
    ]
}

async fn read_envelope(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(ApiError::Http)?;

    if !status.is_success() {
        warn!("Backend returned HTTP {}", status);
        return Err(ApiError::Status {
            code: status.as_u16(),
            body,
        });
    }

    parse_envelope(&body)
}

/// Parse a response body and check its `success` flag.
pub(crate) fn parse_envelope(body: &str) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_str(body)?;

    if !value.get("success").map(truthy).unwrap_or(false) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        return Err(ApiError::Rejected { message });
    }

    Ok(value)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}

fn nested_id(body: &Value, object: &str, field: &'static str) -> Result<String, ApiError> {
    match body.get(object).and_then(|o| o.get("id")) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ApiError::MissingField(field)),
    }
}

fn list_field<T: serde::de::DeserializeOwned>(
    mut body: Value,
    field: &'static str,
) -> Result<Vec<T>, ApiError> {
    match body.get_mut(field).map(Value::take) {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(list) => Ok(serde_json::from_value(list)?),
    }
}
