//! HTTP protocol implementation.
//!
//! A deliberately small HTTP/1.1 subset, parsed by hand: one request per
//! connection (`Connection: close` is always emitted), `Content-Length`
//! framed bodies only, no chunked transfer, no keep-alive.
//!
//! - **`request`**: the parsed request type and a builder for synthetic ones
//! - **`response`**: status codes, the response type and its builder
//! - **`parser`**: buffer-and-retry request parsing
//! - **`writer`**: response serialization with the server-injected headers

pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
