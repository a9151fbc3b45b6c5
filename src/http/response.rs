//! Responses produced by dispatch.
//!
//! # Responsibilities
//! - Map status codes to reason phrases (100-504)
//! - Carry action output (body, status, headers) to the server
//! - Turn errors into plain-text responses

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db::OrmError;

const STATUS_PHRASES: &[(u16, &str)] = &[
    (100, "Continue"),
    (101, "Switching Protocols"),
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (203, "Non-Authoritative Information"),
    (204, "No Content"),
    (205, "Reset Content"),
    (206, "Partial Content"),
    (300, "Multiple Choices"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (303, "See Other"),
    (304, "Not Modified"),
    (305, "Use Proxy"),
    (307, "Temporary Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (402, "Payment Required"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (407, "Proxy Authentication Required"),
    (408, "Request Time-out"),
    (409, "Conflict"),
    (410, "Gone"),
    (411, "Length Required"),
    (412, "Precondition Failed"),
    (413, "Request Entity Too Large"),
    (414, "Request-URI Too Large"),
    (415, "Unsupported Media Type"),
    (416, "Requested range not satisfiable"),
    (417, "Expectation Failed"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Time-out"),
];

/// Reason phrase for a known status code.
pub fn status_phrase(code: u16) -> Option<&'static str> {
    STATUS_PHRASES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, phrase)| *phrase)
}

/// An error with an HTTP status. Codes outside the phrase table become 404.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status} {phrase}: {message}")]
pub struct HttpError {
    pub status: u16,
    pub phrase: &'static str,
    pub message: String,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        let (status, phrase) = match status_phrase(status) {
            Some(phrase) => (status, phrase),
            None => (404, "Not Found"),
        };
        Self {
            status,
            phrase,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    pub fn into_reply(self) -> Reply {
        let body = if self.message.is_empty() {
            self.phrase.to_string()
        } else {
            self.message
        };
        Reply {
            status: self.status,
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: Vec::new(),
            body: body.into_bytes(),
        }
    }
}

impl From<OrmError> for HttpError {
    fn from(err: OrmError) -> Self {
        match err {
            OrmError::Invalid(errors) => HttpError::bad_request(errors.to_string()),
            missing @ (OrmError::NotPersisted | OrmError::EmptyConditions) => HttpError::not_found(missing.to_string()),
            other => {
                tracing::error!(error = %other, "Persistence error during dispatch");
                HttpError::internal("Internal Server Error")
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_reply().into_response()
    }
}

/// A finished response, independent of the HTTP stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::NOT_FOUND);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid response header"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(status_phrase(404), Some("Not Found"));
        assert_eq!(status_phrase(504), Some("Gateway Time-out"));
        assert_eq!(status_phrase(306), None);
        assert_eq!(status_phrase(418), None);
    }

    #[test]
    fn test_unknown_codes_degrade_to_404() {
        let err = HttpError::new(418, "teapot");
        assert_eq!(err.status, 404);
        assert_eq!(err.phrase, "Not Found");
        assert_eq!(err.to_string(), "404 Not Found: teapot");

        let reply = HttpError::new(403, "").into_reply();
        assert_eq!(reply.status, 403);
        assert_eq!(reply.text(), "Forbidden");
    }

    #[test]
    fn test_reply_into_response() {
        let reply = Reply {
            status: 201,
            content_type: "application/json".into(),
            headers: vec![("X-Thing".into(), "1".into()), ("bad name".into(), "x".into())],
            body: b"{}".to_vec(),
        };
        assert_eq!(reply.header("x-thing"), Some("1"));
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["x-thing"], "1");
    }
}
