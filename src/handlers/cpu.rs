use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::handlers::{file_path, lcg_next};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::router::Handler;

/// `GET /isprime?num=N`: trial-division primality check.
pub fn isprime(req: &Request) -> Response {
    let raw = match req.param("num") {
        Some(v) if !v.is_empty() => v,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "missing required query parameter 'num'",
            )
        }
    };

    let num: u64 = match raw.parse() {
        Ok(n) if n >= 2 => n,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid number; must be an integer >= 2",
            )
        }
    };

    let mut is_prime = true;
    let mut i = 2u64;
    while i * i <= num {
        if num % i == 0 {
            is_prime = false;
            break;
        }
        i += 1;
    }

    Response::json(&json!({ "number": num, "isPrime": is_prime }))
}

/// `GET /factor?num=N`: every divisor of `num`.
pub fn factor(req: &Request) -> Response {
    let raw = match req.param("num") {
        Some(v) if !v.is_empty() => v,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "missing required query parameter 'num'",
            )
        }
    };

    let num: u64 = match raw.parse() {
        Ok(n) if n >= 1 => n,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid number; must be an integer >= 1",
            )
        }
    };

    let mut factors = Vec::new();
    for i in 1..=num {
        if num % i == 0 {
            factors.push(i);
        }
    }

    Response::json(&json!({ "number": num, "factors": factors }))
}

/// `GET /pi?digits=N`: π to `digits` decimal places via the
/// Rabinowitz-Wagon spigot (integer arithmetic only).
pub fn pi(req: &Request) -> Response {
    let raw = match req.param("digits") {
        Some(v) if !v.is_empty() => v,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "missing required query parameter 'digits'",
            )
        }
    };

    let digits: usize = match raw.parse() {
        Ok(d) if (1..=1000).contains(&d) => d,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid digits; must be an integer between 1 and 1000",
            )
        }
    };

    let all = pi_digits(digits + 1);
    let decimals: String = all[1..].iter().map(|d| (b'0' + d) as char).collect();

    Response::json(&json!({ "digits": digits, "pi": format!("3.{decimals}") }))
}

/// Spigot algorithm: produces `count` decimal digits of π, starting with
/// the leading 3.
fn pi_digits(count: usize) -> Vec<u8> {
    // A few guard digits so trailing-nine runs cannot starve the output.
    let produce = count + 4;
    let len = produce * 10 / 3 + 2;
    let mut a = vec![2u64; len];

    let mut digits: Vec<u8> = Vec::with_capacity(produce);
    let mut predigit: u64 = 0;
    let mut nines: usize = 0;
    let mut first = true;

    for _ in 0..produce {
        let mut q: u64 = 0;
        for i in (0..len).rev() {
            let x = 10 * a[i] + q * (i as u64 + 1);
            a[i] = x % (2 * i as u64 + 1);
            q = x / (2 * i as u64 + 1);
        }
        a[0] = q % 10;
        q /= 10;

        if q == 9 {
            nines += 1;
        } else if q == 10 {
            digits.push((predigit + 1) as u8);
            for _ in 0..nines {
                digits.push(0);
            }
            predigit = 0;
            nines = 0;
        } else {
            if first {
                // The very first predigit is a placeholder, not a digit.
                first = false;
            } else {
                digits.push(predigit as u8);
            }
            predigit = q;
            for _ in 0..nines {
                digits.push(9);
            }
            nines = 0;
        }
    }
    digits.push(predigit as u8);

    digits.truncate(count);
    digits
}

/// `GET /mandelbrot?width=W&height=H&max_iter=I[&filename=name]`:
/// per-pixel iteration counts over the complex plane, optionally saved as a
/// PGM image in the files directory.
pub fn mandelbrot_handler(files_dir: PathBuf) -> Handler {
    Arc::new(move |req: &Request| mandelbrot(req, &files_dir))
}

fn mandelbrot(req: &Request, files_dir: &std::path::Path) -> Response {
    let (Some(width_raw), Some(height_raw), Some(iter_raw)) = (
        req.param("width"),
        req.param("height"),
        req.param("max_iter"),
    ) else {
        return Response::error(
            StatusCode::BadRequest,
            "missing required query parameters 'width', 'height', and 'max_iter'",
        );
    };

    let width: usize = match width_raw.parse() {
        Ok(w) if (1..=2000).contains(&w) => w,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid width; must be an integer between 1 and 2000",
            )
        }
    };
    let height: usize = match height_raw.parse() {
        Ok(h) if (1..=2000).contains(&h) => h,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid height; must be an integer between 1 and 2000",
            )
        }
    };
    let max_iter: u32 = match iter_raw.parse() {
        Ok(i) if (1..=1000).contains(&i) => i,
        _ => {
            return Response::error(
                StatusCode::BadRequest,
                "invalid max_iter; must be an integer between 1 and 1000",
            )
        }
    };

    let iterations = mandelbrot_set(width, height, max_iter);

    let mut doc = serde_json::Map::new();
    doc.insert("width".into(), json!(width));
    doc.insert("height".into(), json!(height));
    doc.insert("max_iter".into(), json!(max_iter));
    doc.insert(
        "stats".into(),
        json!({
            "total_pixels": width * height,
            "computed_pixels": width * height,
            "coordinate_system": "complex plane from -2-2i to 2+2i",
        }),
    );

    if let Some(filename) = req.param("filename") {
        match file_path(files_dir, filename) {
            Some(base) => {
                let path = base.with_extension("pgm");
                match save_pgm(&path, &iterations, width, height, max_iter) {
                    Ok(()) => {
                        doc.insert("saved_file".into(), json!(format!("{filename}.pgm")));
                        doc.insert("file_format".into(), json!("PGM (Portable Gray Map)"));
                    }
                    Err(err) => {
                        doc.insert("file_error".into(), json!(err.to_string()));
                    }
                }
            }
            None => {
                doc.insert("file_error".into(), json!("invalid file name"));
            }
        }
    }

    doc.insert("iterations".into(), json!(iterations));

    Response::json(&serde_json::Value::Object(doc))
}

fn mandelbrot_set(width: usize, height: usize, max_iter: u32) -> Vec<Vec<u32>> {
    let (x_min, x_max) = (-2.5f64, 1.5f64);
    let (y_min, y_max) = (-2.0f64, 2.0f64);

    let mut rows = Vec::with_capacity(height);
    for py in 0..height {
        let mut row = Vec::with_capacity(width);
        for px in 0..width {
            let cx = x_min + px as f64 * (x_max - x_min) / width as f64;
            let cy = y_min + py as f64 * (y_max - y_min) / height as f64;
            row.push(escape_iterations(cx, cy, max_iter));
        }
        rows.push(row);
    }
    rows
}

fn escape_iterations(cx: f64, cy: f64, max_iter: u32) -> u32 {
    let (mut zx, mut zy) = (0.0f64, 0.0f64);

    for iter in 0..max_iter {
        let (zx2, zy2) = (zx * zx, zy * zy);
        if zx2 + zy2 > 4.0 {
            return iter;
        }
        let next_zx = zx2 - zy2 + cx;
        zy = 2.0 * zx * zy + cy;
        zx = next_zx;
    }

    max_iter
}

fn save_pgm(
    path: &std::path::Path,
    iterations: &[Vec<u32>],
    width: usize,
    height: usize,
    max_iter: u32,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    out.push_str("P2\n# Mandelbrot Set\n");
    out.push_str(&format!("{width} {height}\n255\n"));

    for row in iterations {
        for &iter in row {
            let gray = if iter == max_iter {
                0
            } else {
                iter * 255 / max_iter
            };
            out.push_str(&format!("{gray} "));
        }
        out.push('\n');
    }

    std::fs::write(path, out)
}

/// `GET /matrixmul?size=N&seed=S`: multiplies two LCG-generated square
/// matrices.
pub fn matrixmul(req: &Request) -> Response {
    let (Some(size_raw), Some(seed_raw)) = (req.param("size"), req.param("seed")) else {
        return Response::error(StatusCode::BadRequest, "missing required query parameters");
    };

    let size: usize = match size_raw.parse() {
        Ok(s) if s >= 1 => s,
        _ => return Response::error(StatusCode::BadRequest, "invalid size parameter"),
    };
    let seed: i64 = match seed_raw.parse() {
        Ok(s) => s,
        Err(_) => return Response::error(StatusCode::BadRequest, "invalid seed parameter"),
    };

    let matrix_a = random_matrix(size, seed as u64);
    let matrix_b = random_matrix(size, seed as u64 + 1);

    let mut result = vec![vec![0i64; size]; size];
    for i in 0..size {
        for j in 0..size {
            let mut sum = 0i64;
            for k in 0..size {
                sum += matrix_a[i][k] * matrix_b[k][j];
            }
            result[i][j] = sum;
        }
    }

    Response::json(&json!({
        "matrixA": matrix_a,
        "matrixB": matrix_b,
        "result": result,
    }))
}

fn random_matrix(size: usize, seed: u64) -> Vec<Vec<i64>> {
    let mut seed = seed;
    let mut matrix = vec![vec![0i64; size]; size];
    for row in matrix.iter_mut() {
        for cell in row.iter_mut() {
            *cell = (lcg_next(&mut seed) % 10) as i64;
        }
    }
    matrix
}
