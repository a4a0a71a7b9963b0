use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::handlers::{file_path, lcg_next};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::Handler;
use crate::server::StatsHandle;

/// `GET /`: landing page.
pub fn hello(_req: &Request) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Anvil</title></head>\n<body>\n\
         <h1>Hello from Anvil</h1>\n\
         <p>A from-scratch HTTP server: hand-rolled parser, bounded worker pool, priority job manager.</p>\n\
         <p>Server time: {}</p>\n\
         <p>See <a href=\"/help\">/help</a> for the endpoint list.</p>\n\
         </body>\n</html>",
        Utc::now().to_rfc2822()
    );
    Response::html(body)
}

/// `GET /ping`
pub fn ping(_req: &Request) -> Response {
    ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .body("pong")
        .build()
}

/// `GET|POST /echo`: reflects the request back as HTML.
pub fn echo(req: &Request) -> Response {
    let mut body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Echo</title></head>\n<body>\n\
         <h1>Echo Request</h1>\n\
         <h2>Method: {}</h2>\n<h2>Path: {}</h2>\n<h2>Version: {}</h2>\n\
         <h3>Headers:</h3>\n<ul>",
        req.method, req.path, req.version
    );

    for (name, value) in &req.headers {
        body.push_str(&format!("<li><strong>{name}:</strong> {value}</li>"));
    }
    body.push_str("</ul>");

    if !req.body.is_empty() {
        body.push_str(&format!("<h3>Body:</h3><pre>{}</pre>", req.body));
    }
    body.push_str("</body></html>");

    Response::html(body)
}

/// `GET /time`: the current time in several formats.
pub fn time(_req: &Request) -> Response {
    let now = Utc::now();
    Response::json(&json!({
        "unix": now.timestamp(),
        "rfc3339": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "rfc2822": now.to_rfc2822(),
        "formatted": now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }))
}

/// `GET /favicon.ico`: 204 so browser probes stay out of the logs.
pub fn favicon(_req: &Request) -> Response {
    Response::no_content()
}

/// `GET /help`: endpoint catalog.
pub fn help(_req: &Request) -> Response {
    let body = r#"<!DOCTYPE html>
<html>
<head><title>Help</title></head>
<body>
<h1>API Help</h1>
<ul>
<li>/ping</li>
<li>/echo</li>
<li>/time</li>
<li>/status</li>
<li>/metrics</li>
<li>/fibonacci?n=N</li>
<li>/reverse?text=yourtext</li>
<li>/toupper?text=yourtext</li>
<li>/random?min=x&amp;max=y</li>
<li>/hash?text=yourtext</li>
<li>/sleep?seconds=s</li>
<li>/createfile?name=filename&amp;content=text&amp;repeat=x</li>
<li>/deletefile?name=filename</li>
<li>/isprime?num=N</li>
<li>/factor?num=N</li>
<li>/pi?digits=N</li>
<li>/mandelbrot?width=W&amp;height=H&amp;max_iter=I</li>
<li>/matrixmul?size=N&amp;seed=S</li>
<li>/sortfile?name=FILE&amp;algo=merge|quick</li>
<li>/wordcount?name=FILE</li>
<li>/grep?name=FILE&amp;pattern=REGEX</li>
<li>/compress?name=FILE&amp;codec=gzip|xz</li>
<li>/hashfile?name=FILE&amp;algo=sha256</li>
<li>/jobs/submit?task=NAME&amp;prio=low|normal|high</li>
<li>/jobs/status?id=JOB</li>
<li>/jobs/result?id=JOB</li>
<li>/jobs/cancel?id=JOB</li>
</ul>
</body>
</html>"#;

    Response::html(body)
}

/// `GET /status`: liveness plus the connection counters.
pub fn status_handler(stats: StatsHandle) -> Handler {
    Arc::new(move |_req: &Request| {
        Response::json(&json!({
            "status": "ok",
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "stats": stats.server_stats(),
        }))
    })
}

/// `GET /metrics`: per-endpoint latency stats plus pool/queue/job state.
pub fn metrics_handler(stats: StatsHandle, jobs: Arc<crate::jobs::JobManager>) -> Handler {
    Arc::new(move |_req: &Request| {
        let mut doc = match stats.endpoint_stats() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        doc.insert("worker_pool".into(), stats.worker_pool_stats());
        doc.insert("global".into(), stats.global_stats());
        doc.insert("jobs".into(), jobs.queue_stats());

        Response::json(&serde_json::Value::Object(doc))
    })
}

/// `GET /fibonacci?n=N`: the first `n` Fibonacci numbers.
pub fn fibonacci(req: &Request) -> Response {
    let raw = match req.param("n") {
        Some(v) if !v.is_empty() => v,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "missing required query parameter 'n'",
            )
        }
    };

    let n: i64 = raw.parse().unwrap_or(0);

    const MAX_N: i64 = 1000;
    if n > MAX_N {
        return Response::error(
            StatusCode::PayloadTooLarge,
            "n too large; maximum allowed is 1000",
        );
    }
    if n <= 0 {
        return Response::error(StatusCode::BadRequest, "n must be greater than 0");
    }

    let mut seq = Vec::with_capacity(n as usize);
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 0..n {
        seq.push(a);
        // Values past the 92nd wrap, same as the fixed-width original.
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }

    Response::json(&json!(seq))
}

/// `GET /reverse?text=...`
pub fn reverse(req: &Request) -> Response {
    let Some(text) = req.param("text") else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameter 'text'",
        );
    };

    let reversed: String = text.chars().rev().collect();
    Response::json(&json!({ "reversed": reversed }))
}

/// `GET /toupper?text=...`
pub fn toupper(req: &Request) -> Response {
    let Some(text) = req.param("text") else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameter 'text'",
        );
    };

    Response::json(&json!({ "upper": text.to_uppercase() }))
}

/// `GET /random?min=x&max=y`: LCG-backed random integer in `[min, max]`.
pub fn random(req: &Request) -> Response {
    let (Some(min_raw), Some(max_raw)) = (req.param("min"), req.param("max")) else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameters 'min' and 'max'",
        );
    };

    let Ok(min) = min_raw.parse::<i64>() else {
        return Response::error(
            StatusCode::BadRequest,
            "invalid 'min' parameter - must be an integer",
        );
    };
    let Ok(max) = max_raw.parse::<i64>() else {
        return Response::error(
            StatusCode::BadRequest,
            "invalid 'max' parameter - must be an integer",
        );
    };

    const MAX_RANGE: i64 = 1_000_000;
    if max - min > MAX_RANGE {
        return Response::error(
            StatusCode::BadRequest,
            "range too large - maximum allowed range is 1,000,000",
        );
    }

    let (min, max) = if min > max { (max, min) } else { (min, max) };
    let span = (max - min + 1) as u64;
    let mut seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let value = min + (lcg_next(&mut seed) % span) as i64;

    Response::json(&json!({
        "random": value,
        "min": min,
        "max": max,
        "range": span,
        "algorithm": "LCG (Linear Congruential Generator)",
    }))
}

/// `GET /hash?text=...`: DJB2 hash of the text.
pub fn hash(req: &Request) -> Response {
    let Some(text) = req.param("text") else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameter 'text'",
        );
    };

    let mut hash: u32 = 5381;
    for byte in text.bytes() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(byte as u32);
    }

    Response::json(&json!({ "algorithm": "djb2", "hash": hash }))
}

/// `GET /sleep?seconds=s`: blocks a worker thread for the given time.
pub fn sleep(req: &Request) -> Response {
    let Some(raw) = req.param("seconds") else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameter 'seconds'",
        );
    };

    const MAX_SECONDS: u64 = 30;
    let Ok(seconds) = raw.parse::<u64>() else {
        return Response::error(StatusCode::BadRequest, "invalid 'seconds' parameter");
    };
    if seconds > MAX_SECONDS {
        return Response::error(StatusCode::BadRequest, "seconds must be 30 or less");
    }

    std::thread::sleep(Duration::from_secs(seconds));

    Response::json(&json!({ "slept_seconds": seconds }))
}

/// `GET /createfile?name=&content=&repeat=`: writes `content` `repeat`
/// times, one line each, into the files directory.
pub fn createfile_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| {
        let (Some(name), Some(content), Some(repeat_raw)) = (
            req.param("name"),
            req.param("content"),
            req.param("repeat"),
        ) else {
            return Response::error(
                StatusCode::BadRequest,
                "missing required query parameters 'name', 'content' and 'repeat'",
            );
        };

        let repeat: usize = match repeat_raw.parse() {
            Ok(r) if r >= 1 => r,
            _ => return Response::error(StatusCode::BadRequest, "invalid repeat parameter"),
        };

        let Some(path) = file_path(&files_dir, name) else {
            return Response::error(StatusCode::BadRequest, "invalid file name");
        };

        if std::fs::create_dir_all(&files_dir).is_err() {
            return Response::error(StatusCode::InternalServerError, "failed to create file");
        }

        let mut data = String::with_capacity((content.len() + 1) * repeat);
        for _ in 0..repeat {
            data.push_str(content);
            data.push('\n');
        }

        match std::fs::write(&path, data) {
            Ok(()) => Response::json_with_status(
                StatusCode::Created,
                &json!({ "message": "file created successfully" }),
            ),
            Err(_) => Response::error(StatusCode::InternalServerError, "failed to create file"),
        }
    })
}

/// `GET /deletefile?name=`
pub fn deletefile_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| {
        let name = match req.param("name") {
            Some(n) if !n.is_empty() => n,
            _ => {
                return Response::error(
                    StatusCode::BadRequest,
                    "missing required query parameter 'name'",
                )
            }
        };

        let Some(path) = file_path(&files_dir, name) else {
            return Response::error(StatusCode::BadRequest, "invalid file name");
        };

        match std::fs::remove_file(&path) {
            Ok(()) => Response::json(&json!({ "message": "file deleted successfully" })),
            Err(_) => Response::error(StatusCode::InternalServerError, "failed to delete file"),
        }
    })
}
