//! The JSON envelope every webhook call is answered with.
//!
//! Serialised, a response has the shape an API gateway proxy integration
//! expects: `{"statusCode":200,"body":"{\"response\":\"...\"}","headers":{...}}`.
//! Served directly over HTTP, only `body` is sent.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize, Serializer};

pub const ACCEPTED: &str = "Alright, alright, alright.";
pub const PING: &str = "I see you have the machine that goes PING!";
pub const MISSING_SIGNATURE: &str = "No signature header found on request.";
pub const BAD_SIGNATURE: &str = "Request signature could not be verified.";
pub const MISSING_EVENT: &str = "No event type header found on request.";
pub const UNWANTED_EVENT: &str = "Only push events are accepted.";
pub const UNWANTED_BRANCH: &str = "Pushes to this branch are not deployed.";
pub const BAD_NOTIFICATION: &str = "Push notification could not be read.";
pub const BAD_DESCRIPTOR: &str = "Could not retrieve or validate deploy.json.";
pub const NOT_QUEUED: &str = "Deploy could not be queued.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerResponse {
    pub status_code: u16,
    #[serde(serialize_with = "body_as_string")]
    pub body: ResponseBody,
    pub headers: BTreeMap<String, String>,
}

fn body_as_string<S: Serializer>(body: &ResponseBody, serializer: S) -> Result<S::Ok, S::Error> {
    let text = serde_json::to_string(body).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

impl ListenerResponse {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            body: ResponseBody {
                response: message.into(),
            },
            headers: BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn message(&self) -> &str {
        &self.body.response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl IntoResponse for ListenerResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_body_as_json_text() {
        let value = serde_json::to_value(ListenerResponse::ok(ACCEPTED)).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["body"], r#"{"response":"Alright, alright, alright."}"#);
        assert_eq!(value["headers"]["Content-Type"], "application/json");
    }

    #[test]
    fn test_rejections_are_bad_request() {
        let response = ListenerResponse::rejected(UNWANTED_BRANCH);
        assert_eq!(response.status_code, 400);
        assert!(!response.is_success());
        assert_eq!(response.message(), UNWANTED_BRANCH);
    }

    #[test]
    fn test_into_response_status() {
        let response = ListenerResponse::rejected(BAD_SIGNATURE).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }
}
