use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::session::Record;
use crate::upstream::NOT_LOGGED_IN_MESSAGE;

#[derive(Serialize)]
pub struct SessionRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `POST /sessions` response, only the token path is read
#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub api_auth_token: Option<String>,
}

impl SessionResponse {
    pub fn token(self) -> Option<String> {
        self.user
            .and_then(|user| user.api_auth_token)
            .filter(|token| !token.is_empty())
    }
}

/// `GET /grades` response
#[derive(Debug, Deserialize)]
pub struct GradesResponse {
    #[serde(default)]
    pub grades: Option<Vec<Record>>,
    /// string or array of strings
    #[serde(default)]
    pub messages: Option<Value>,
}

impl GradesResponse {
    pub fn is_not_logged_in(&self) -> bool {
        match &self.messages {
            Some(Value::String(message)) => message.contains(NOT_LOGGED_IN_MESSAGE),
            Some(Value::Array(messages)) => messages
                .iter()
                .filter_map(Value::as_str)
                .any(|message| message.contains(NOT_LOGGED_IN_MESSAGE)),
            _ => false,
        }
    }
}
