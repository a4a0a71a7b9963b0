use std::collections::HashMap;

/// HTTP status codes emitted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Returns the standard reason phrase.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// A complete HTTP response ready for serialization.
///
/// Handlers set status, headers and body; the writer injects
/// `Content-Length`, `Connection: close` and the `Server` header on the
/// wire, so those never appear here.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Builder for constructing responses in a fluent style.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: String,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// 200 response with a JSON body serialized from `value`.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::json_with_status(StatusCode::Ok, value)
    }

    /// JSON response with an explicit status code.
    pub fn json_with_status(status: StatusCode, value: &serde_json::Value) -> Self {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());

        ResponseBuilder::new(status)
            .header("Content-Type", "application/json")
            .body(body)
            .build()
    }

    /// JSON error body `{"error": "<message>"}` with the given status.
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json_with_status(status, &serde_json::json!({ "error": message }))
    }

    /// 200 response with an HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body)
            .build()
    }

    /// 204 response with no body.
    pub fn no_content() -> Self {
        ResponseBuilder::new(StatusCode::NoContent).build()
    }
}
