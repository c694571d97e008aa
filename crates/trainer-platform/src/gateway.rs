//! REST session gateway.
//!
//! Talks to the training backend under `/api/v1` with browser `fetch()`
//! via gloo-net. Non-2xx replies are mapped onto `SessionError` from the
//! status code and the `detail` field of the error body.

use async_trait::async_trait;
use gloo_net::http::{Request, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use trainer_core::ports::SessionGateway;
use trainer_types::{
    Result, SessionError,
    config::ApiConfig,
    session::{CreateSessionPayload, Session, SessionId, SurveyAnswers},
    state::SessionState,
};

/// Which endpoint a reply came from; the same status means different
/// things on different calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Create,
    Fetch,
    Transition,
    Survey,
}

pub struct HttpSessionGateway {
    config: ApiConfig,
}

impl HttpSessionGateway {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.header("Authorization", &format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, call: Call, request: Request) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;

        if !response.ok() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = error_for_status(call, status, &body);
            log::warn!("{:?} request failed with HTTP {}: {}", call, status, err);
            return Err(err);
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, call: Call, request: Request) -> Result<T> {
        self.send(call, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SessionError::Serialization(e.to_string()))
    }
}

#[async_trait(?Send)]
impl SessionGateway for HttpSessionGateway {
    async fn create_session(&self, payload: &CreateSessionPayload) -> Result<Session> {
        let request = self
            .authorize(Request::post(&self.config.endpoint("/sessions")))
            .json(payload)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.send_json(Call::Create, request).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session> {
        let request = self
            .authorize(Request::get(&self.config.endpoint(&session_path(id))))
            .build()
            .map_err(|e| SessionError::Network(e.to_string()))?;
        self.send_json(Call::Fetch, request).await
    }

    async fn set_session_state(&self, id: &SessionId, state: SessionState) -> Result<Session> {
        let url = self.config.endpoint(&format!("{}/state", session_path(id)));
        let request = self
            .authorize(Request::patch(&url))
            .json(&transition_body(state))
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        log::debug!("Requesting {} for session {}", state, id);
        self.send_json(Call::Transition, request).await
    }

    async fn submit_survey(&self, id: &SessionId, answers: &SurveyAnswers) -> Result<()> {
        let url = self.config.endpoint(&format!("{}/survey", session_path(id)));
        let request = self
            .authorize(Request::post(&url))
            .json(&survey_body(answers))
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        // The reply is the stored survey record; nothing in it is needed here.
        self.send(Call::Survey, request).await.map(|_| ())
    }
}

// ─── Request helpers ─────────────────────────────────────────

pub fn session_path(id: &SessionId) -> String {
    format!("/sessions/{}", encode_segment(id.as_str()))
}

fn encode_segment(raw: &str) -> String {
    String::from(js_sys::encode_uri_component(raw))
}

pub fn transition_body(state: SessionState) -> Value {
    json!({ "new_state": state.as_wire() })
}

pub fn survey_body(answers: &SurveyAnswers) -> Value {
    json!({ "respuestas_json": answers })
}

// ─── Error mapping ───────────────────────────────────────────

/// Map a non-2xx reply onto the error taxonomy.
pub fn error_for_status(call: Call, status: u16, body: &str) -> SessionError {
    let detail = extract_detail(body);
    let message = detail.clone().unwrap_or_else(|| format!("HTTP {}", status));
    match (status, call) {
        (404, _) => SessionError::NotFound(message),
        (400, Call::Transition) => SessionError::IllegalTransition(message),
        (400, Call::Create | Call::Survey) | (422, _) => SessionError::Validation(message),
        _ => match detail {
            Some(d) => SessionError::Network(format!("HTTP {}: {}", status, d)),
            None => SessionError::Network(message),
        },
    }
}

/// Human-readable `detail` from an error body.
///
/// Handlers send a plain string; request validation sends a list of
/// `{loc, msg}` objects.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let text = body.trim();
            return (!text.is_empty()).then(|| text.to_string());
        }
    };

    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg")?.as_str()?;
                    let field = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .and_then(Value::as_str);
                    Some(match field {
                        Some(f) => format!("{}: {}", f, msg),
                        None => msg.to_string(),
                    })
                })
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        other => Some(other.to_string()),
    }
}
