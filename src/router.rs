use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// A registered request handler.
///
/// Handlers are pure in `req`: shared state they need is captured by the
/// factory closure that produced them. They must not retain the request
/// past return.
pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Exact-match request router keyed by method, then path.
///
/// Registration is allowed at any time (writers are exclusive); dispatch
/// takes a read lock so concurrent requests do not contend. Registering the
/// same `(method, path)` twice replaces the handler.
pub struct Router {
    routes: RwLock<HashMap<String, HashMap<String, Handler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `handler` for `method` + `path` (exact match only).
    pub fn register(&self, method: &str, path: &str, handler: Handler) {
        let mut routes = self.routes.write().unwrap();
        routes
            .entry(method.to_string())
            .or_default()
            .insert(path.to_string(), handler);
    }

    /// Dispatches a request, falling back to a canned 404 page that echoes
    /// the method and path.
    pub fn handle(&self, req: &Request) -> Response {
        let handler = {
            let routes = self.routes.read().unwrap();
            routes
                .get(&req.method)
                .and_then(|paths| paths.get(&req.path))
                .cloned()
        };

        match handler {
            Some(handler) => handler(req),
            None => not_found(req),
        }
    }

    /// Lists registered `(method, path)` pairs, for the help page and tests.
    pub fn routes(&self) -> Vec<(String, String)> {
        let routes = self.routes.read().unwrap();
        let mut out = Vec::new();
        for (method, paths) in routes.iter() {
            for path in paths.keys() {
                out.push((method.clone(), path.clone()));
            }
        }
        out
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(req: &Request) -> Response {
    let body = format!(
        "<html><body><h1>404 Not Found</h1><p>{} {}</p></body></html>",
        req.method, req.path
    );

    ResponseBuilder::new(StatusCode::NotFound)
        .header("Content-Type", "text/html")
        .body(body)
        .build()
}
