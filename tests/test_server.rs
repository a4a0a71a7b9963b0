use std::sync::Arc;
use std::time::Duration;

use anvil::config::Config;
use anvil::http::response::Response;
use anvil::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn test_config(pool_size: usize, queue_capacity: usize) -> Config {
    Config {
        listen_addr: "127.0.0.1:0".to_string(),
        pool_size,
        queue_capacity,
        persistence_file: None,
        files_dir: std::env::temp_dir(),
        ..Config::default()
    }
}

async fn started_server(config: Config) -> Server {
    let server = Server::new(config);
    server.register("GET", "/ping", Arc::new(anvil::handlers::basic::ping));
    server.register("GET", "/sleep", Arc::new(anvil::handlers::basic::sleep));
    server.start().await.expect("server should start");
    server
}

/// Sends raw bytes, half-closes the write side, and reads the full reply.
async fn roundtrip(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..300 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_pings_all_succeed_and_drain() {
    let server = started_server(test_config(2, 1000)).await;
    let addr = server.local_addr().unwrap();

    const CLIENTS: usize = 100;
    let mut handles = Vec::with_capacity(CLIENTS);
    for _ in 0..CLIENTS {
        handles.push(tokio::spawn(async move {
            roundtrip(addr, b"GET /ping HTTP/1.1\r\n\r\n").await
        }));
    }

    for handle in handles {
        let reply = handle.await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "reply: {reply}");
        assert!(reply.contains("Content-Length: 4\r\n"));
        assert!(reply.ends_with("pong"));
    }

    wait_until(|| {
        let stats = server.stats();
        stats["active_connections"] == 0 && stats["total_connections"] == CLIENTS as i64
    })
    .await;

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_route_is_404_with_echoed_method_and_path() {
    let server = started_server(test_config(2, 100)).await;
    let addr = server.local_addr().unwrap();

    let reply = roundtrip(addr, b"GET /nowhere HTTP/1.1\r\n\r\n").await;

    assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(reply.contains("GET"));
    assert!(reply.contains("/nowhere"));

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_input_gets_400() {
    let server = started_server(test_config(2, 100)).await;
    let addr = server.local_addr().unwrap();

    let reply = roundtrip(addr, b"\x00\x01\x02 garbage without structure").await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "reply: {reply}");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_request_head_is_rejected() {
    let mut config = test_config(2, 100);
    config.max_header_bytes = 1024;
    let server = started_server(config).await;
    let addr = server.local_addr().unwrap();

    // The whole head, terminator included, arrives in one write and is
    // already over the limit; it must still be rejected.
    let mut raw = b"GET /ping HTTP/1.1\r\nX-Padding: ".to_vec();
    raw.extend(std::iter::repeat(b'a').take(4096));
    raw.extend_from_slice(b"\r\n\r\n");

    let reply = roundtrip(addr, &raw).await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "reply: {reply}");

    // A head under the limit still goes through.
    let reply = roundtrip(addr, b"GET /ping HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_body_is_not_capped_by_the_header_limit() {
    let mut config = test_config(2, 100);
    config.max_header_bytes = 1024;
    let server = started_server(config).await;
    server.register("POST", "/echo", Arc::new(anvil::handlers::basic::echo));
    let addr = server.local_addr().unwrap();

    // Head is tiny; the 8 KiB body must not trip the head-size check.
    let body = "b".repeat(8192);
    let raw = format!(
        "POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );

    let reply = roundtrip(addr, raw.as_bytes()).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "reply: {reply}");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_body_underrun_gets_400_and_worker_survives() {
    let server = started_server(test_config(1, 100)).await;
    let addr = server.local_addr().unwrap();

    // Promise five body bytes, deliver three, then close.
    let reply = roundtrip(addr, b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc").await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "reply: {reply}");

    // The single worker must still be alive to answer this.
    let reply = roundtrip(addr, b"GET /ping HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_handler_yields_500_and_worker_survives() {
    let server = started_server(test_config(1, 100)).await;
    server.register("GET", "/boom", Arc::new(|_req: &anvil::http::request::Request| -> Response { panic!("kaboom") }));
    let addr = server.local_addr().unwrap();

    let reply = roundtrip(addr, b"GET /boom HTTP/1.1\r\n\r\n").await;
    assert!(
        reply.starts_with("HTTP/1.1 500 Internal Server Error\r\n"),
        "reply: {reply}"
    );

    let reply = roundtrip(addr, b"GET /ping HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overflowing_the_task_queue_drops_the_connection() {
    // One worker, a queue of one: the third concurrent connection has
    // nowhere to go and is closed without a response.
    let server = started_server(test_config(1, 1)).await;
    let addr = server.local_addr().unwrap();

    let busy = tokio::spawn(async move {
        roundtrip(addr, b"GET /sleep?seconds=2 HTTP/1.1\r\n\r\n").await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let queued = tokio::spawn(async move {
        roundtrip(addr, b"GET /sleep?seconds=1 HTTP/1.1\r\n\r\n").await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The server may reset this socket before the write even lands, so
    // errors on either side are expected; only "no response" matters.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(b"GET /ping HTTP/1.1\r\n\r\n").await;
    let _ = stream.shutdown().await;
    let mut dropped = Vec::new();
    let _ = stream.read_to_end(&mut dropped).await;
    assert!(
        dropped.is_empty(),
        "dropped connection got: {}",
        String::from_utf8_lossy(&dropped)
    );

    assert!(busy.await.unwrap().starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(queued.await.unwrap().starts_with("HTTP/1.1 200 OK\r\n"));

    server.shutdown(Duration::from_secs(10)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_responses_carry_the_server_headers() {
    let server = started_server(test_config(2, 100)).await;
    let addr = server.local_addr().unwrap();

    let reply = roundtrip(addr, b"GET /ping HTTP/1.1\r\n\r\n").await;
    assert!(reply.contains("Connection: close\r\n"));
    assert!(reply.contains("Server: CustomHTTPServer/1.0\r\n"));

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_twice_is_a_noop() {
    let server = started_server(test_config(2, 100)).await;

    server.shutdown(Duration::from_secs(5)).await.unwrap();
    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_jobs_api_end_to_end() {
    let config = test_config(2, 100);
    let server = Server::new(config);
    let manager = server.job_manager();

    server.register(
        "POST",
        "/jobs/submit",
        anvil::handlers::jobs::submit_handler(manager.clone()),
    );
    server.register(
        "GET",
        "/jobs/status",
        anvil::handlers::jobs::status_handler(manager),
    );
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();

    let reply = roundtrip(addr, b"POST /jobs/submit?task=whatever HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));

    let body = reply.split("\r\n\r\n").nth(1).unwrap();
    let doc: serde_json::Value = serde_json::from_str(body).unwrap();
    let job_id = doc["job_id"].as_str().unwrap();

    let status_req = format!("GET /jobs/status?id={job_id} HTTP/1.1\r\n\r\n");
    let reply = roundtrip(addr, status_req.as_bytes()).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));

    // The fallback executor steps the job to done in about a second.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let reply = roundtrip(addr, status_req.as_bytes()).await;
        let body = reply.split("\r\n\r\n").nth(1).unwrap();
        let doc: serde_json::Value = serde_json::from_str(body).unwrap();
        if doc["status"] == "done" {
            assert_eq!(doc["progress"], 100);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "job never completed: {doc}"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}
