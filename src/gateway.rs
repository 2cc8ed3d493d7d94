use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::row::{Row, Value};

pub const CONNECTION_FAILED: &str = "Could not connect to the server.";

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network, DNS, TLS, timeout or HTTP status failure
    #[error("Could not connect to the server.")]
    Connection(#[source] reqwest::Error),

    /// The backend answered but refused the request
    #[error("{0}")]
    Rejected(String),

    /// The backend answered with something that is not a usable reply
    #[error("Malformed reply from server: {0}")]
    Malformed(String),

    #[error("Could not encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Backend actions, named as the service expects them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Me,
    ListLeads,
    SaveLead,
    DeleteLead,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Me => "me",
            Action::ListLeads => "listLeads",
            Action::SaveLead => "saveLead",
            Action::DeleteLead => "deleteLead",
        }
    }

    /// Message shown when a refusal carries no message of its own
    pub fn fallback_message(self) -> &'static str {
        match self {
            Action::Me => "Could not validate session.",
            Action::ListLeads => "Could not load leads.",
            Action::SaveLead => "Could not save.",
            Action::DeleteLead => "Could not delete.",
        }
    }
}

/// Decoded reply of one action
#[derive(Clone, Debug, PartialEq)]
pub enum Reply<T> {
    Success(T),
    Failure { message: Option<String> },
}

impl<T: DeserializeOwned> Reply<T> {
    /// Interpret a reply body
    ///
    /// Only an object whose `ok` is exactly `true` is a success; `null`,
    /// non-objects and `ok: false` are all failures.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let ok = value.get("ok").and_then(serde_json::Value::as_bool) == Some(true);
        if !ok {
            let message = value
                .get("message")
                .map(|m| Value::from(m.clone()).display())
                .filter(|m| !m.is_empty());
            return Ok(Reply::Failure { message });
        }
        serde_json::from_value(value).map(Reply::Success)
    }
}

impl<T> Reply<T> {
    pub fn into_result(self, fallback: &str) -> Result<T, GatewayError> {
        match self {
            Reply::Success(payload) => Ok(payload),
            Reply::Failure { message } => Err(GatewayError::Rejected(
                message.unwrap_or_else(|| fallback.to_string()),
            )),
        }
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(|v| v.display())
}

fn lenient_headers<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .iter()
        .map(Value::display)
        .collect())
}

fn lenient_rows<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Row>, D::Error> {
    let rows: Option<Vec<Row>> = Option::deserialize(deserializer)?;
    Ok(rows.unwrap_or_default())
}

/// Signed-in user, as reported by `me`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, deserialize_with = "lenient_text")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub role: String,
}

impl Identity {
    /// `email • ROLE`, as shown in the top bar
    pub fn banner(&self) -> String {
        format!("{} • {}", self.email, self.role.to_uppercase())
    }
}

/// Column headers and rows of one company's sheet
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LeadSheet {
    #[serde(default, deserialize_with = "lenient_headers")]
    pub headers: Vec<String>,
    #[serde(default, deserialize_with = "lenient_rows")]
    pub rows: Vec<Row>,
}

/// Result of `saveLead`: whether a row was inserted or updated, and its ID
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    #[serde(default, deserialize_with = "lenient_text")]
    pub mode: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,
}

#[derive(Deserialize)]
struct Ack {}

/// The four operations the dashboard needs from the backend
pub trait LeadsBackend {
    fn authenticate(&self, token: &str)
    -> impl Future<Output = Result<Identity, GatewayError>> + Send;

    fn list_rows(
        &self,
        token: &str,
        company: &str,
    ) -> impl Future<Output = Result<LeadSheet, GatewayError>> + Send;

    /// Insert or update; the backend decides by whether the row carries an ID
    fn save_row(
        &self,
        token: &str,
        company: &str,
        row: &Row,
    ) -> impl Future<Output = Result<SaveOutcome, GatewayError>> + Send;

    fn delete_row(
        &self,
        token: &str,
        company: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Fresh callback name for a JSONP-style call
pub fn callback_name() -> String {
    format!("cb_{}", Uuid::new_v4().simple())
}

/// Turn a response body into JSON, unwrapping a `callback(...)` wrapper
///
/// When `expected_callback` is set the body must be wrapped in exactly that
/// callback. Without it a wrapped body is still accepted.
pub fn decode_body(
    body: &str,
    expected_callback: Option<&str>,
) -> Result<serde_json::Value, GatewayError> {
    let body = body.trim();
    let payload = match split_callback(body) {
        Some((name, inner)) => {
            if let Some(expected) = expected_callback {
                if name != expected {
                    return Err(GatewayError::Malformed(format!(
                        "reply addressed to callback {} instead of {}",
                        name, expected
                    )));
                }
            }
            inner
        }
        None if expected_callback.is_some() => {
            return Err(GatewayError::Malformed("reply is not wrapped in a callback".into()));
        }
        None => body,
    };

    serde_json::from_str(payload).map_err(|e| GatewayError::Malformed(e.to_string()))
}

fn split_callback(body: &str) -> Option<(&str, &str)> {
    let open = body.find('(')?;
    let name = body[..open].trim();
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid_name {
        return None;
    }
    let rest = body[open + 1..].trim_end().trim_end_matches(';').trim_end();
    let inner = rest.strip_suffix(')')?;
    Some((name, inner))
}

/// HTTP implementation of [`LeadsBackend`]
///
/// The service exposes four actions on a single URL, all plain GET requests
/// with URL-encoded parameters. Every reply is a JSON object with an `ok`
/// flag. Older deployments only answer in JSONP form.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    jsonp: bool,
}

impl HttpGateway {
    /// Client with reqwest's default settings
    ///
    /// # Arguments
    /// * `base_url` - The script URL every action is sent to
    ///
    /// # Examples
    /// ```
    /// use nexcard_panel::gateway::HttpGateway;
    ///
    /// let gateway = HttpGateway::new("https://example.com/exec").jsonp(true);
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            jsonp: false,
        }
    }

    /// Client with a per-request timeout
    ///
    /// # Arguments
    /// * `base_url` - The script URL every action is sent to
    /// * `timeout` - Per-request limit; `None` waits indefinitely
    ///
    /// # Returns
    /// * `Result<Self, GatewayError>` - Fails only if the TLS backend cannot start
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build().map_err(GatewayError::Client)?,
            base_url: base_url.into(),
            jsonp: false,
        })
    }

    /// Ask for `callback(...)` wrapped replies and insist on them
    pub fn jsonp(mut self, enabled: bool) -> Self {
        self.jsonp = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: Action,
        params: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let callback = self.jsonp.then(callback_name);
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 2);
        query.push(("action", action.as_str()));
        query.extend_from_slice(params);
        if let Some(name) = callback.as_deref() {
            query.push(("callback", name));
        }

        debug!("Calling {} on {}", action.as_str(), self.base_url);
        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("{} failed to reach the server: {}", action.as_str(), e);
                GatewayError::Connection(e)
            })?;
        let body = response.text().await.map_err(GatewayError::Connection)?;

        let value = decode_body(&body, callback.as_deref())?;
        let reply = Reply::<T>::from_json(value).map_err(|e| {
            GatewayError::Malformed(format!("{} payload: {}", action.as_str(), e))
        })?;
        if let Reply::Failure { message } = &reply {
            debug!("{} refused: {:?}", action.as_str(), message);
        }
        reply.into_result(action.fallback_message())
    }
}

impl LeadsBackend for HttpGateway {
    async fn authenticate(&self, token: &str) -> Result<Identity, GatewayError> {
        self.call(Action::Me, &[("token", token)]).await
    }

    async fn list_rows(&self, token: &str, company: &str) -> Result<LeadSheet, GatewayError> {
        self.call(Action::ListLeads, &[("token", token), ("empresa_id", company)])
            .await
    }

    async fn save_row(
        &self,
        token: &str,
        company: &str,
        row: &Row,
    ) -> Result<SaveOutcome, GatewayError> {
        let data = serde_json::to_string(row)?;
        self.call(
            Action::SaveLead,
            &[("token", token), ("empresa_id", company), ("data", &data)],
        )
        .await
    }

    async fn delete_row(&self, token: &str, company: &str, id: &str) -> Result<(), GatewayError> {
        self.call::<Ack>(
            Action::DeleteLead,
            &[("token", token), ("empresa_id", company), ("id", id)],
        )
        .await
        .map(|_| ())
    }
}
