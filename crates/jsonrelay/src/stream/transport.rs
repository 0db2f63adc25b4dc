use futures_util::{future::BoxFuture, stream::BoxStream};
use thiserror::Error;

use super::frame::RawFrame;

/// HTTP-ish method of a stream request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`, with [`StreamRequest::params`] as the body.
    Post,
}

/// What a transport should open.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct StreamRequest {
    /// Request method.
    pub method: Method,
    /// Endpoint URL.
    pub url: String,
    /// Body or query parameters.
    pub params: Option<serde_json::Value>,
}

impl StreamRequest {
    /// A `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            params: None,
        }
    }

    /// A `POST` request with a JSON body.
    pub fn post(url: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            params: Some(params),
        }
    }
}

/// Failures a transport reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The stream could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),
    /// An open stream failed mid-flight.
    #[error("stream failed: {0}")]
    Stream(String),
    /// Credentials were rejected. Never retried.
    #[error("authentication expired")]
    AuthExpired,
    /// The peer closed the stream abnormally.
    #[error("stream closed unexpectedly")]
    Closed,
}

/// Frames of one open stream. `None` from the stream is a normal close.
pub type FrameStream = BoxStream<'static, Result<RawFrame, TransportError>>;

/// Opens streams. Implementations own sockets, HTTP clients and credentials.
///
/// Dropping the returned [`FrameStream`] must release the underlying
/// connection; that is how sessions cancel.
pub trait Transport: Send + Sync + 'static {
    /// Opens a stream for `request`.
    fn open(&self, request: &StreamRequest) -> BoxFuture<'static, Result<FrameStream, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn open(&self, request: &StreamRequest) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        (**self).open(request)
    }
}
