use std::sync::Arc;

use anvil::http::request::{Request, RequestBuilder};
use anvil::http::response::{Response, StatusCode};
use anvil::router::Router;

#[test]
fn test_dispatch_exact_match() {
    let router = Router::new();
    router.register("GET", "/ping", Arc::new(|_req: &Request| Response::html("pong")));

    let req = RequestBuilder::new().method("GET").path("/ping").build();
    let resp = router.handle(&req);

    assert_eq!(resp.status, StatusCode::Ok);
    assert_eq!(resp.body, "pong");
}

#[test]
fn test_unknown_path_returns_404_echoing_method_and_path() {
    let router = Router::new();
    router.register("GET", "/x", Arc::new(|_req: &Request| Response::html("x")));

    let req = RequestBuilder::new().method("GET").path("/y").build();
    let resp = router.handle(&req);

    assert_eq!(resp.status, StatusCode::NotFound);
    assert_eq!(resp.headers.get("Content-Type").unwrap(), "text/html");
    assert!(resp.body.contains("GET"));
    assert!(resp.body.contains("/y"));
}

#[test]
fn test_method_mismatch_is_a_404() {
    let router = Router::new();
    router.register("GET", "/thing", Arc::new(|_req: &Request| Response::html("ok")));

    let req = RequestBuilder::new().method("POST").path("/thing").build();
    assert_eq!(router.handle(&req).status, StatusCode::NotFound);
}

#[test]
fn test_no_prefix_or_pattern_matching() {
    let router = Router::new();
    router.register("GET", "/a", Arc::new(|_req: &Request| Response::html("a")));

    let req = RequestBuilder::new().method("GET").path("/a/b").build();
    assert_eq!(router.handle(&req).status, StatusCode::NotFound);
}

#[test]
fn test_duplicate_registration_replaces() {
    let router = Router::new();
    router.register("GET", "/v", Arc::new(|_req: &Request| Response::html("old")));
    router.register("GET", "/v", Arc::new(|_req: &Request| Response::html("new")));

    let req = RequestBuilder::new().method("GET").path("/v").build();
    assert_eq!(router.handle(&req).body, "new");
}

#[test]
fn test_handler_sees_request_params() {
    let router = Router::new();
    router.register(
        "GET",
        "/greet",
        Arc::new(|req| Response::html(format!("hi {}", req.param("name").unwrap_or("?")))),
    );

    let req = RequestBuilder::new()
        .method("GET")
        .path("/greet")
        .param("name", "ada")
        .build();

    assert_eq!(router.handle(&req).body, "hi ada");
}

#[test]
fn test_routes_lists_registrations() {
    let router = Router::new();
    router.register("GET", "/a", Arc::new(|_req: &Request| Response::html("")));
    router.register("POST", "/b", Arc::new(|_req: &Request| Response::html("")));

    let mut routes = router.routes();
    routes.sort();

    assert_eq!(
        routes,
        vec![
            ("GET".to_string(), "/a".to_string()),
            ("POST".to_string(), "/b".to_string()),
        ]
    );
}
