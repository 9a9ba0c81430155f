//! Range-aware streaming responder
//!
//! Writes exactly the requested byte window of a seekable resource, with
//! conditional-request short-circuiting for files.

use super::cache::{self, RequestValidators, Validator};
use super::mime;
use super::range::{self, RangeSpec};
use crate::error::{RangeError, ResponseError, ServeError};
use crate::handler::{OutgoingResponse, RequestHead};
use crate::logger;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCEPT_RANGES, CONTENT_RANGE};
use hyper::StatusCode;
use std::io::{self, Cursor, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Size of each chunk copied from the resource to the response
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A readable, seekable resource of known length
pub struct StreamResource<R> {
    reader: R,
    length: u64,
    mime: String,
}

impl<R> StreamResource<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub fn new(reader: R, length: u64, mime: impl Into<String>) -> Self {
        Self {
            reader,
            length,
            mime: mime.into(),
        }
    }

    pub const fn length(&self) -> u64 {
        self.length
    }
}

/// Stream a resource, honouring a single `Range` header.
///
/// An absent resource is answered with 400 and reported as
/// `ServeError::InvalidArgument`. Range problems are answered with 400 and
/// reported as `ServeError::Range`. A client that disconnects mid-transfer
/// is not an error.
pub async fn serve_stream<R>(
    response: &mut OutgoingResponse,
    resource: Option<StreamResource<R>>,
    request: &RequestHead,
) -> Result<(), ServeError>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    let Some(resource) = resource else {
        reply_status(response, StatusCode::BAD_REQUEST);
        return Err(ServeError::InvalidArgument("resource stream is absent"));
    };

    let range_header = single_range_header(response, request)?;
    let window = match range::resolve(range_header, resource.length) {
        Ok(window) => window,
        Err(e) => return Err(reject_range(response, request, e)),
    };

    if let (Some(_), Some(window)) = (range_header, window) {
        response.set_header(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Ok(value) = HeaderValue::from_str(&window.content_range(resource.length)) {
            response.set_header(CONTENT_RANGE, value);
        }
        response.set_status(StatusCode::PARTIAL_CONTENT);
        response.set_keep_alive(true);
    }

    response.set_content_type(&resource.mime);
    response.set_content_length(window.map_or(0, |w| w.len()));

    let Some(window) = window.filter(|_| !request.is_head()) else {
        response.close();
        return Ok(());
    };

    let result = copy_window(response, resource.reader, window).await;
    if response.headers_sent() {
        response.close();
    }
    result
}

/// Stream an in-memory buffer
pub async fn serve_bytes(
    response: &mut OutgoingResponse,
    data: Option<Bytes>,
    mime: &str,
    request: &RequestHead,
) -> Result<(), ServeError> {
    let resource = data.map(|data| {
        let length = data.len() as u64;
        StreamResource::new(Cursor::new(data), length, mime)
    });
    serve_stream(response, resource, request).await
}

/// Stream a file from disk.
///
/// Conditional headers are checked before the file is opened; a fresh
/// client copy gets 304 without the file ever being read. A missing file
/// is answered with 404 and reported as `ServeError::NotFound`.
pub async fn serve_file(
    response: &mut OutgoingResponse,
    path: impl AsRef<Path>,
    request: &RequestHead,
) -> Result<(), ServeError> {
    let path = path.as_ref();
    single_range_header(response, request)?;

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(not_found(response, path)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(response, path)),
        Err(e) => return Err(e.into()),
    };

    if let Ok(modified) = metadata.modified() {
        let validator = Validator::from_modified(modified);
        validator.apply(response.headers_mut());
        if cache::is_not_modified(&RequestValidators::from_headers(&request.headers), &validator) {
            response.set_status(StatusCode::NOT_MODIFIED);
            response.close();
            return Ok(());
        }
    }

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(response, path)),
        Err(e) => return Err(e.into()),
    };

    let mime = mime::content_type_for_path(path);
    serve_stream(
        response,
        Some(StreamResource::new(file, metadata.len(), mime)),
        request,
    )
    .await
}

/// Copy `window` from the reader in `CHUNK_SIZE` pieces, never past its end
async fn copy_window<R>(
    response: &mut OutgoingResponse,
    mut reader: R,
    window: RangeSpec,
) -> Result<(), ServeError>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    reader.seek(SeekFrom::Start(window.start)).await?;

    let mut remaining = window.len();
    let mut buf = vec![0u8; usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE))];

    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("resource ended {remaining} bytes short of the requested range"),
            )
            .into());
        }

        match response.write(Bytes::copy_from_slice(&buf[..n])).await {
            Ok(()) => remaining -= n as u64,
            Err(ResponseError::ClientGone) => {
                drop(reader);
                logger::log_client_aborted(window.len() - remaining);
                if !response.headers_sent() {
                    response.set_status(StatusCode::NO_CONTENT);
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Extract the `Range` header, answering 400 when there is more than one
fn single_range_header<'r>(
    response: &mut OutgoingResponse,
    request: &'r RequestHead,
) -> Result<Option<&'r str>, ServeError> {
    range::range_header(&request.headers).map_err(|e| reject_range(response, request, e))
}

fn reject_range(
    response: &mut OutgoingResponse,
    request: &RequestHead,
    error: RangeError,
) -> ServeError {
    logger::log_request_rejected(
        &request.method,
        request.path(),
        StatusCode::BAD_REQUEST,
        &error.to_string(),
    );
    reply_status(response, StatusCode::BAD_REQUEST);
    error.into()
}

fn not_found(response: &mut OutgoingResponse, path: &Path) -> ServeError {
    reply_status(response, StatusCode::NOT_FOUND);
    ServeError::NotFound(path.display().to_string())
}

/// Answer with a bare status and its reason phrase
fn reply_status(response: &mut OutgoingResponse, status: StatusCode) {
    let text = status.canonical_reason().unwrap_or("");
    if let Err(e) = response.send_text(status, text) {
        logger::log_warning(&format!("Could not send {status} response: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HeadReceiver;
    use crate::http::body::ResponseBody;
    use http_body_util::BodyExt;
    use hyper::header::{
        CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RANGE,
    };
    use hyper::{Method, Response, Uri};
    use std::io::Write;

    fn get() -> RequestHead {
        RequestHead::new(Method::GET, Uri::from_static("/resource"))
    }

    fn with_range(value: &'static str) -> RequestHead {
        get().with_header(RANGE, HeaderValue::from_static(value))
    }

    fn payload(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
    }

    async fn collect(head: HeadReceiver) -> (Response<()>, Bytes) {
        let (parts, body) = head.await.unwrap().into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (Response::from_parts(parts, ()), bytes)
    }

    /// Run the responder concurrently with the reader side of the response
    async fn serve_payload(
        data: Option<Bytes>,
        request: RequestHead,
    ) -> (Result<(), ServeError>, Response<()>, Bytes) {
        let (mut response, head) = OutgoingResponse::channel();
        let serving = tokio::spawn(async move {
            serve_bytes(&mut response, data, "application/octet-stream", &request).await
        });
        let (sent, body) = collect(head).await;
        (serving.await.unwrap(), sent, body)
    }

    #[tokio::test]
    async fn test_full_body_without_range() {
        let data = payload(200_000);
        let (result, sent, body) = serve_payload(Some(data.clone()), get()).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::OK);
        assert_eq!(sent.headers()[CONTENT_LENGTH], "200000");
        assert_eq!(sent.headers()[CONTENT_TYPE], "application/octet-stream");
        assert!(sent.headers().get(CONTENT_RANGE).is_none());
        assert_eq!(body, data);
    }

    #[tokio::test]
    async fn test_partial_window_is_exact() {
        let data = payload(150_000);
        for (header, start, end) in [
            ("bytes=0-0", 0_usize, 0_usize),
            ("bytes=10-70000", 10, 70_000),
            ("bytes=65536-131071", 65_536, 131_071),
            ("bytes=149999-", 149_999, 149_999),
        ] {
            let (result, sent, body) = serve_payload(Some(data.clone()), with_range(header)).await;
            assert!(result.is_ok(), "{header}");
            assert_eq!(sent.status(), StatusCode::PARTIAL_CONTENT);
            assert_eq!(
                sent.headers()[CONTENT_RANGE],
                format!("bytes {start}-{end}/150000").as_str()
            );
            assert_eq!(sent.headers()[ACCEPT_RANGES], "bytes");
            assert_eq!(sent.headers()[CONTENT_LENGTH], (end - start + 1).to_string().as_str());
            assert_eq!(body, data.slice(start..=end), "{header}");
        }
    }

    #[tokio::test]
    async fn test_empty_resource() {
        let (result, sent, body) = serve_payload(Some(Bytes::new()), get()).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::OK);
        assert_eq!(sent.headers()[CONTENT_LENGTH], "0");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_head_request_sends_no_body() {
        let request = RequestHead::new(Method::HEAD, Uri::from_static("/resource"));
        let (result, sent, body) = serve_payload(Some(payload(1000)), request).await;
        assert!(result.is_ok());
        assert_eq!(sent.headers()[CONTENT_LENGTH], "1000");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_range_headers_rejected() {
        let request =
            with_range("bytes=0-1").with_header(RANGE, HeaderValue::from_static("bytes=2-3"));
        let (result, sent, _) = serve_payload(Some(payload(10)), request).await;
        assert!(matches!(result, Err(ServeError::Range(RangeError::Unsupported))));
        assert_eq!(sent.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_range_rejected() {
        let (result, sent, _) = serve_payload(Some(payload(10)), with_range("bytes=oops")).await;
        assert!(matches!(result, Err(ServeError::Range(RangeError::Malformed(_)))));
        assert_eq!(sent.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_absent_resource_is_invalid_argument() {
        let (result, sent, _) = serve_payload(None, get()).await;
        assert!(matches!(result, Err(ServeError::InvalidArgument(_))));
        assert_eq!(sent.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_abort_is_not_an_error() {
        let (mut response, head) = OutgoingResponse::channel();
        let data = payload(CHUNK_SIZE * 16);
        let serving = tokio::spawn(async move {
            let result = serve_bytes(&mut response, Some(data), "video/mp4", &get()).await;
            (result, response)
        });
        let sent: Response<ResponseBody> = head.await.unwrap();
        drop(sent);

        let (result, response) = serving.await.unwrap();
        assert!(result.is_ok());
        assert!(response.is_closed());
        assert!(response.bytes_written() < (CHUNK_SIZE * 16) as u64);
    }

    #[tokio::test]
    async fn test_short_resource_reports_eof() {
        let (mut response, head) = OutgoingResponse::channel();
        let serving = tokio::spawn(async move {
            let resource = StreamResource::new(Cursor::new(vec![1u8; 10]), 20, "text/plain");
            serve_stream(&mut response, Some(resource), &get()).await
        });
        let (_, body) = collect(head).await;
        assert_eq!(body.len(), 10);
        match serving.await.unwrap() {
            Err(ServeError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF error, got {other:?}"),
        }
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    async fn serve_path(
        path: std::path::PathBuf,
        request: RequestHead,
    ) -> (Result<(), ServeError>, Response<()>, Bytes) {
        let (mut response, head) = OutgoingResponse::channel();
        let serving = tokio::spawn(async move { serve_file(&mut response, &path, &request).await });
        let (sent, body) = collect(head).await;
        (serving.await.unwrap(), sent, body)
    }

    #[tokio::test]
    async fn test_file_sets_validators_and_mime() {
        let file = temp_file(b"hello world");
        let (result, sent, body) = serve_path(file.path().to_path_buf(), get()).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::OK);
        assert_eq!(sent.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert!(sent.headers().contains_key(ETAG));
        assert!(sent.headers().contains_key(LAST_MODIFIED));
        assert_eq!(body, Bytes::from("hello world"));
    }

    #[tokio::test]
    async fn test_file_if_modified_since_exact_is_304() {
        let file = temp_file(b"cached");
        let (_, first, _) = serve_path(file.path().to_path_buf(), get()).await;
        let last_modified = first.headers()[LAST_MODIFIED].clone();

        let request = get().with_header(IF_MODIFIED_SINCE, last_modified);
        let (result, sent, body) = serve_path(file.path().to_path_buf(), request).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::NOT_MODIFIED);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_file_if_none_match_among_others_is_304() {
        let file = temp_file(b"cached");
        let (_, first, _) = serve_path(file.path().to_path_buf(), get()).await;
        let etag = first.headers()[ETAG].to_str().unwrap().to_string();

        let value = HeaderValue::from_str(&format!("\"nope\", {etag}, \"other\"")).unwrap();
        let request = get().with_header(IF_NONE_MATCH, value);
        let (result, sent, body) = serve_path(file.path().to_path_buf(), request).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(sent.headers()[ETAG], etag.as_str());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_file_range() {
        let file = temp_file(b"0123456789");
        let (result, sent, body) =
            serve_path(file.path().to_path_buf(), with_range("bytes=2-5")).await;
        assert!(result.is_ok());
        assert_eq!(sent.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(sent.headers()[CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(body, Bytes::from("2345"));
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (result, sent, _) = serve_path(dir.path().join("missing.bin"), get()).await;
        assert!(matches!(result, Err(ServeError::NotFound(_))));
        assert_eq!(sent.status(), StatusCode::NOT_FOUND);
    }
}
