//! HTTP helpers shared by the request pipeline

use std::convert::Infallible;

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::{Request, StatusCode};

use crate::{EchotapError, Result};

/// Body type of every response the server produces
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// HTTP helper functions
pub struct HttpHandler;

impl HttpHandler {
    /// Status code reported for an error
    #[must_use]
    pub fn error_status(error: &EchotapError) -> StatusCode {
        match error {
            EchotapError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EchotapError::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            EchotapError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validate an incoming request against size limits
    ///
    /// # Errors
    ///
    /// Returns error if request is too large or has too many headers
    pub fn validate_request<B>(request: &Request<B>, max_size: usize, max_headers: usize) -> Result<()> {
        // Check content length
        if let Some(content_length) = request.headers().get(hyper::header::CONTENT_LENGTH) {
            if let Ok(length_str) = content_length.to_str() {
                if let Ok(length) = length_str.parse::<usize>() {
                    if length > max_size {
                        return Err(EchotapError::DataTooLarge {
                            size: length,
                            limit: max_size,
                        });
                    }
                }
            }
        }

        // Check header count
        let header_count = request.headers().len();
        if header_count > max_headers {
            return Err(EchotapError::TooManyHeaders {
                count: header_count,
                limit: max_headers,
            });
        }

        Ok(())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns error if body is too large or read fails
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let collected = body
            .collect()
            .await
            .map_err(|e| EchotapError::InvalidRequest(format!("Failed to read body: {e}")))?;

        let bytes = collected.to_bytes();

        if bytes.len() > max_size {
            return Err(EchotapError::DataTooLarge {
                size: bytes.len(),
                limit: max_size,
            });
        }

        Ok(bytes)
    }
}
