use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::handlers::file_path;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::router::Handler;

/// `GET /sortfile?name=FILE[&algo=merge|quick]`: sorts the integers in the
/// file (one per line, non-numeric lines skipped) into `FILE.sorted`.
pub fn sortfile_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| sortfile(req, &files_dir))
}

fn sortfile(req: &Request, files_dir: &Path) -> Response {
    let name = match req.param("name") {
        Some(n) if !n.is_empty() => n,
        _ => return Response::error(StatusCode::BadRequest, "missing name parameter"),
    };
    let Some(path) = file_path(files_dir, name) else {
        return Response::error(StatusCode::BadRequest, "invalid file name");
    };

    let started = Instant::now();
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) => return Response::error(StatusCode::NotFound, &err.to_string()),
    };

    let mut nums: Vec<i64> = contents
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();

    match req.param("algo") {
        Some("merge") => nums = merge_sort(nums),
        _ => quick_sort(&mut nums),
    }

    let out_path = files_dir.join(format!("{name}.sorted"));
    let mut out = String::with_capacity(nums.len() * 8);
    for v in &nums {
        out.push_str(&v.to_string());
        out.push('\n');
    }
    if let Err(err) = std::fs::write(&out_path, out) {
        return Response::error(StatusCode::InternalServerError, &err.to_string());
    }

    Response::json(&json!({
        "output": out_path.display().to_string(),
        "count": nums.len(),
        "duration_ms": started.elapsed().as_millis() as u64,
    }))
}

fn merge_sort(items: Vec<i64>) -> Vec<i64> {
    if items.len() <= 1 {
        return items;
    }

    let mid = items.len() / 2;
    let mut right = items;
    let left = merge_sort(right.drain(..mid).collect());
    let right = merge_sort(right);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if left[i] <= right[j] {
            merged.push(left[i]);
            i += 1;
        } else {
            merged.push(right[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

fn quick_sort(items: &mut [i64]) {
    if items.len() < 2 {
        return;
    }

    let pivot_index = partition(items);
    let (left, right) = items.split_at_mut(pivot_index);
    quick_sort(left);
    quick_sort(&mut right[1..]);
}

fn partition(items: &mut [i64]) -> usize {
    let high = items.len() - 1;
    let pivot = items[high];
    let mut i = 0;

    for j in 0..high {
        if items[j] < pivot {
            items.swap(i, j);
            i += 1;
        }
    }
    items.swap(i, high);
    i
}

/// `GET /wordcount?name=FILE`: wc-style line/word/byte counts.
pub fn wordcount_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| wordcount(req, &files_dir))
}

fn wordcount(req: &Request, files_dir: &Path) -> Response {
    let name = match req.param("name") {
        Some(n) if !n.is_empty() => n,
        _ => return Response::error(StatusCode::BadRequest, "missing name parameter"),
    };
    let Some(path) = file_path(files_dir, name) else {
        return Response::error(StatusCode::BadRequest, "invalid file name");
    };

    let data = match std::fs::read(&path) {
        Ok(d) => d,
        Err(err) => return Response::error(StatusCode::NotFound, &err.to_string()),
    };

    let bytes = data.len() as u64;
    let mut lines = 0u64;
    let mut words = 0u64;
    let mut in_word = false;

    for &b in &data {
        if b == b'\n' {
            lines += 1;
        }
        if b == b' ' || b == b'\n' || b == b'\t' || b == b'\r' {
            if in_word {
                words += 1;
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if in_word {
        words += 1;
    }

    Response::json(&json!({ "lines": lines, "words": words, "bytes": bytes }))
}

/// `GET /grep?name=FILE&pattern=REGEX`: match count plus the first ten
/// matching lines.
pub fn grep_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| grep(req, &files_dir))
}

fn grep(req: &Request, files_dir: &Path) -> Response {
    let (name, pattern) = match (req.param("name"), req.param("pattern")) {
        (Some(n), Some(p)) if !n.is_empty() && !p.is_empty() => (n, p),
        _ => return Response::error(StatusCode::BadRequest, "missing name or pattern parameter"),
    };

    let re = match regex::Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => {
            return Response::error(StatusCode::BadRequest, &format!("invalid regex: {err}"))
        }
    };

    let Some(path) = file_path(files_dir, name) else {
        return Response::error(StatusCode::BadRequest, "invalid file name");
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) => return Response::error(StatusCode::NotFound, &err.to_string()),
    };

    let mut matches = 0u64;
    let mut first_lines = Vec::new();
    for line in contents.lines() {
        if re.is_match(line) {
            matches += 1;
            if first_lines.len() < 10 {
                first_lines.push(line.to_string());
            }
        }
    }

    Response::json(&json!({ "matches": matches, "first_lines": first_lines }))
}

/// `GET /compress?name=FILE&codec=gzip|xz`: gzip in-process, xz through
/// the external binary when present.
pub fn compress_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| compress(req, &files_dir))
}

fn compress(req: &Request, files_dir: &Path) -> Response {
    let (name, codec) = match (req.param("name"), req.param("codec")) {
        (Some(n), Some(c)) if !n.is_empty() && !c.is_empty() => (n, c),
        _ => return Response::error(StatusCode::BadRequest, "missing name or codec parameter"),
    };

    let Some(path) = file_path(files_dir, name) else {
        return Response::error(StatusCode::BadRequest, "invalid file name");
    };

    match codec {
        "gzip" => {
            let input = match std::fs::File::open(&path) {
                Ok(f) => f,
                Err(err) => return Response::error(StatusCode::NotFound, &err.to_string()),
            };

            let out_path = files_dir.join(format!("{name}.gz"));
            let out_file = match std::fs::File::create(&out_path) {
                Ok(f) => f,
                Err(err) => {
                    return Response::error(StatusCode::InternalServerError, &err.to_string())
                }
            };

            let mut encoder = flate2::write::GzEncoder::new(out_file, flate2::Compression::default());
            let mut reader = std::io::BufReader::new(input);
            let mut buf = [0u8; 32 * 1024];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(err) => {
                        return Response::error(StatusCode::InternalServerError, &err.to_string())
                    }
                };
                if let Err(err) = encoder.write_all(&buf[..n]) {
                    return Response::error(StatusCode::InternalServerError, &err.to_string());
                }
            }
            if let Err(err) = encoder.finish() {
                return Response::error(StatusCode::InternalServerError, &err.to_string());
            }

            compressed_response(&out_path)
        }
        "xz" => {
            if !path.exists() {
                return Response::error(StatusCode::NotFound, "file not found");
            }

            let output = match Command::new("xz").arg("-c").arg(&path).output() {
                Ok(out) => out,
                Err(err) => {
                    return Response::error(StatusCode::InternalServerError, &err.to_string())
                }
            };
            if !output.status.success() {
                return Response::error(StatusCode::InternalServerError, "xz failed");
            }

            let out_path = files_dir.join(format!("{name}.xz"));
            if let Err(err) = std::fs::write(&out_path, &output.stdout) {
                return Response::error(StatusCode::InternalServerError, &err.to_string());
            }

            compressed_response(&out_path)
        }
        _ => Response::error(StatusCode::BadRequest, "unsupported codec"),
    }
}

fn compressed_response(out_path: &Path) -> Response {
    let size = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
    Response::json(&json!({
        "output": out_path.display().to_string(),
        "size": size,
    }))
}

/// `GET /hashfile?name=FILE&algo=sha256`
pub fn hashfile_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| hashfile(req, &files_dir))
}

fn hashfile(req: &Request, files_dir: &Path) -> Response {
    let (name, algo) = match (req.param("name"), req.param("algo")) {
        (Some(n), Some(a)) if !n.is_empty() && !a.is_empty() => (n, a),
        _ => return Response::error(StatusCode::BadRequest, "missing name or algo parameter"),
    };

    if algo != "sha256" {
        return Response::error(StatusCode::BadRequest, "unsupported algo");
    }

    let Some(path) = file_path(files_dir, name) else {
        return Response::error(StatusCode::BadRequest, "invalid file name");
    };
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(err) => return Response::error(StatusCode::NotFound, &err.to_string()),
    };

    let mut hasher = Sha256::new();
    if let Err(err) = std::io::copy(&mut file, &mut hasher) {
        return Response::error(StatusCode::InternalServerError, &err.to_string());
    }

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    Response::json(&json!({ "algo": "sha256", "hex": hex }))
}
