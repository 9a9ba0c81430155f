//! Outgoing response model
//!
//! The head (status and headers) is handed to the connection on the first
//! write or on close; the body then flows through a bounded channel.

use crate::error::ResponseError;
use crate::http::body::ResponseBody;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use tokio::sync::{mpsc, oneshot};

/// Chunks buffered between the handler and the connection
const BODY_CHANNEL_DEPTH: usize = 4;

/// Receives the response head once the handler commits it
pub type HeadReceiver = oneshot::Receiver<Response<ResponseBody>>;

enum State {
    /// Nothing sent yet
    Pending(oneshot::Sender<Response<ResponseBody>>),
    /// Head sent, body in progress
    Streaming(mpsc::Sender<Bytes>),
    Closed,
}

/// Response under construction, owned by the handler invocation
pub struct OutgoingResponse {
    status: StatusCode,
    headers: HeaderMap,
    keep_alive: bool,
    head_sent: bool,
    bytes_written: u64,
    state: State,
}

impl OutgoingResponse {
    /// Create a response and the receiving end its head is delivered to
    pub fn channel() -> (Self, HeadReceiver) {
        let (tx, rx) = oneshot::channel();
        let response = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            keep_alive: true,
            head_sent: false,
            bytes_written: 0,
            state: State::Pending(tx),
        };
        (response, rx)
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Has no wire effect once the head was sent
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    pub fn set_content_type(&mut self, mime: &str) {
        match HeaderValue::from_str(mime) {
            Ok(value) => {
                self.headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => {
                crate::logger::log_warning(&format!("Ignoring invalid content type '{mime}'"));
            }
        }
    }

    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// When disabled the connection is closed after this response
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    pub const fn headers_sent(&self) -> bool {
        self.head_sent
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Body bytes accepted by the connection so far
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write a body chunk, sending the head first if needed.
    ///
    /// Waits while the connection is not draining the body.
    pub async fn write(&mut self, data: Bytes) -> Result<(), ResponseError> {
        if let State::Pending(_) = self.state {
            let (tx, body) = ResponseBody::channel(BODY_CHANNEL_DEPTH);
            self.commit(body)?;
            self.state = State::Streaming(tx);
        }

        let State::Streaming(tx) = &self.state else {
            return Err(ResponseError::Closed);
        };
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len() as u64;
        if tx.send(data).await.is_err() {
            self.state = State::Closed;
            return Err(ResponseError::ClientGone);
        }
        self.bytes_written += len;
        Ok(())
    }

    /// Send a complete plain-text response in one go
    pub fn send_text(&mut self, status: StatusCode, text: &str) -> Result<(), ResponseError> {
        match self.state {
            State::Pending(_) => {}
            State::Streaming(_) => return Err(ResponseError::HeadersSent),
            State::Closed => return Err(ResponseError::Closed),
        }

        self.status = status;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.set_content_length(text.len() as u64);
        self.commit(ResponseBody::full(text.to_string()))?;
        self.bytes_written = text.len() as u64;
        self.state = State::Closed;
        Ok(())
    }

    /// Finish the response. Sends the head with an empty body if nothing
    /// was written yet. Closing twice is a no-op.
    pub fn close(&mut self) {
        match self.state {
            State::Pending(_) => {
                // A vanished client leaves nothing to close
                let _ = self.commit(ResponseBody::empty());
            }
            State::Streaming(_) => self.state = State::Closed,
            State::Closed => {}
        }
    }

    /// Hand the head to the connection. Leaves the state `Closed` on failure.
    fn commit(&mut self, body: ResponseBody) -> Result<(), ResponseError> {
        let State::Pending(tx) = std::mem::replace(&mut self.state, State::Closed) else {
            return Err(ResponseError::HeadersSent);
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        if !self.keep_alive {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }

        tx.send(response).map_err(|_| ResponseError::ClientGone)?;
        self.head_sent = true;
        Ok(())
    }
}
