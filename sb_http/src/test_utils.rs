#![cfg(test)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::HeaderValue;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::transport::ApiRequest;
use crate::transport::ApiResponse;
use crate::transport::Transport;
use crate::transport::TransportError;

/// What the scripted endpoint does for one call
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Respond(ApiResponse),
    /// Respond after the given (virtual) delay
    Delay(Duration, ApiResponse),
    Fail(String),
    /// Never answer
    Hang,
}

/// A request the transport has seen
#[derive(Debug, Clone)]
pub(crate) struct SeenCall {
    pub at: Instant,
    pub url: String,
    pub headers: HeaderMap,
}

type Responder = Box<dyn Fn() -> Scripted + Send + Sync>;

/// In-memory [`Transport`] driven by a script, for paused-clock tests
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Responder>,
    seen: Mutex<Vec<SeenCall>>,
}

impl ScriptedTransport {
    /// Answer every call the same way
    pub(crate) fn always(responder: impl Fn() -> Scripted + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(VecDeque::new()), fallback: Some(Box::new(responder)), seen: Mutex::new(Vec::new()) })
    }

    /// Play the steps in order; calls past the end fail
    pub(crate) fn sequence(steps: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(steps.into()), fallback: None, seen: Mutex::new(Vec::new()) })
    }

    pub(crate) fn calls(&self) -> Vec<SeenCall> {
        self.seen.lock().clone()
    }

    fn next_step(&self) -> Scripted {
        if let Some(step) = self.script.lock().pop_front() {
            return step;
        }
        match &self.fallback {
            Some(responder) => responder(),
            None => Scripted::Fail("script exhausted".to_string()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(&'a self, request: &'a ApiRequest) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>> {
        self.seen.lock().push(SeenCall { at: Instant::now(), url: request.url.clone(), headers: request.headers.clone() });
        let step = self.next_step();

        Box::pin(async move {
            match step {
                Scripted::Respond(response) => Ok(response),
                Scripted::Delay(delay, response) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Scripted::Fail(reason) => Err(TransportError::Connection(reason)),
                Scripted::Hang => std::future::pending().await,
            }
        })
    }
}

pub(crate) fn json_response(body: &str) -> ApiResponse {
    let mut response = ApiResponse::new(StatusCode::OK);
    response.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.body = Bytes::copy_from_slice(body.as_bytes());
    response
}

pub(crate) fn status_response(status: StatusCode) -> ApiResponse {
    ApiResponse::new(status)
}
