//! Scripted mock HTTP server for exercising the client end to end.
//!
//! Each incoming request is recorded (method, path, query, headers, body)
//! and answered from a scripted response queue; when the queue runs dry the
//! configurable default response is served.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
}

impl ScriptedResponse {
    pub fn ok() -> Self {
        ScriptedResponse {
            status: 200,
            body: String::new(),
        }
    }

    /// A coded klog error body, as the service emits on failures.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        ScriptedResponse {
            status,
            body: format!(r#"{{"ErrorCode":"{code}","ErrorMessage":"{message}"}}"#),
        }
    }
}

#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    default_response: Arc<Mutex<ScriptedResponse>>,
}

impl MockServer {
    /// Start the server on a random local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("failed to get local addr");

        let server = MockServer {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            default_response: Arc::new(Mutex::new(ScriptedResponse::ok())),
        };

        let accept_state = server.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let io = TokioIo::new(stream);
                let state = accept_state.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move {
                            let method = req.method().to_string();
                            let path = req.uri().path().to_string();
                            let query = req.uri().query().unwrap_or("").to_string();
                            let headers: Vec<(String, String)> = req
                                .headers()
                                .iter()
                                .map(|(key, value)| {
                                    (
                                        key.to_string(),
                                        value.to_str().unwrap_or("").to_string(),
                                    )
                                })
                                .collect();

                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();

                            state.received.lock().unwrap().push(ReceivedRequest {
                                method,
                                path,
                                query,
                                headers,
                                body,
                            });

                            let response = state
                                .script
                                .lock()
                                .unwrap()
                                .pop_front()
                                .unwrap_or_else(|| state.default_response.lock().unwrap().clone());

                            Ok::<_, hyper::http::Error>(
                                Response::builder()
                                    .status(response.status)
                                    .body(Full::new(Bytes::from(response.body)))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        server
    }

    /// Host:port, the shape client configuration expects as an endpoint.
    pub fn endpoint(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    /// Queue the response for the next unanswered request.
    pub fn push_response(&self, response: ScriptedResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Response served once the script queue is empty.
    pub fn set_default_response(&self, response: ScriptedResponse) {
        *self.default_response.lock().unwrap() = response;
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}
