//! HTTP protocol layer module
//!
//! Range resolution, conditional-request validation, MIME lookup and the
//! streaming responder built on top of them. Independent of the server loop.

pub mod body;
pub mod cache;
pub mod mime;
pub mod range;
pub mod response;
pub mod stream;

// Re-export commonly used types
pub use body::ResponseBody;
pub use cache::{RequestValidators, Validator};
pub use range::RangeSpec;
pub use response::{build_404_response, build_text_response};
pub use stream::{serve_bytes, serve_file, serve_stream, StreamResource, CHUNK_SIZE};
