use std::collections::HashMap;

/// A parsed HTTP/1.1 request, immutable after parse.
///
/// `method` is kept as the token received (the router, not the parser,
/// decides whether it is meaningful). `path` has the query string stripped;
/// the decoded pairs live in `params`. Header names are case-sensitive and
/// stored as received, last occurrence winning.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub body: String,
}

impl Request {
    /// Returns a header value by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// Returns a query parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    /// The `"METHOD PATH"` key under which this request is tracked in the
    /// metrics registry.
    pub fn endpoint_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Builder for synthetic requests (tests, the job executor adapter).
pub struct RequestBuilder {
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    params: HashMap<String, String>,
    body: String,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            params: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        Request {
            method: self.method,
            path: self.path,
            version: self.version,
            headers: self.headers,
            params: self.params,
            body: self.body,
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
