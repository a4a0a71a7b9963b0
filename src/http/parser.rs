use std::collections::HashMap;

use thiserror::Error;

use crate::http::request::Request;

/// Errors produced while parsing an HTTP request head.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The request line was blank after trimming.
    #[error("empty request line")]
    EmptyRequestLine,
    /// The request line did not have exactly three tokens.
    #[error("malformed request line")]
    MalformedRequestLine,
    /// The request head was not valid UTF-8.
    #[error("invalid encoding in request head")]
    InvalidEncoding,
    /// The combined request head exceeded the configured limit.
    #[error("request head exceeds {0} bytes")]
    HeadersTooLarge(usize),
    /// More data is needed for a complete request.
    #[error("incomplete request")]
    Incomplete,
}

/// Attempts to parse one complete request from `buf`.
///
/// Returns the request and the number of bytes consumed, or
/// [`ParseError::Incomplete`] when the buffer does not yet hold the full
/// head plus `Content-Length` body bytes. The caller reads more and retries.
///
/// Parsing rules:
/// - the request line is trimmed and split on whitespace into exactly
///   `method`, `request-target` and `version`;
/// - the first `?` in the target separates path from query string;
/// - query pairs split on the first `=`, both sides trimmed, pairs without
///   `=` skipped, duplicates last-wins, values not percent-decoded;
/// - header lines split on the first `:`, both sides trimmed, lines without
///   `:` skipped, duplicates last-wins;
/// - a positive `Content-Length` reads exactly that many body bytes
///   (lossily decoded); absent, zero or unparseable means an empty body.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let head_end = find_head_end(buf).ok_or(ParseError::Incomplete)?;

    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::InvalidEncoding)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("").trim();
    if request_line.is_empty() {
        return Err(ParseError::EmptyRequestLine);
    }

    let tokens: Vec<&str> = request_line.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(ParseError::MalformedRequestLine);
    }

    let method = tokens[0].to_string();
    let (path, params) = split_path_and_query(tokens[1]);
    let version = tokens[2].to_string();

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Lines without a colon are skipped rather than rejected.
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }
    }

    let content_length = headers
        .get("Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    if buf.len() < body_start + content_length {
        return Err(ParseError::Incomplete);
    }

    let body = String::from_utf8_lossy(&buf[body_start..body_start + content_length]).into_owned();

    let request = Request {
        method,
        path,
        version,
        headers,
        params,
        body,
    };

    Ok((request, body_start + content_length))
}

/// Splits a request-target at the first `?` and parses the query string.
pub fn split_path_and_query(target: &str) -> (String, HashMap<String, String>) {
    let mut params = HashMap::new();

    let Some(idx) = target.find('?') else {
        return (target.to_string(), params);
    };

    let path = target[..idx].to_string();
    let query = &target[idx + 1..];

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    (path, params)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
