//! HTTP/2 server implementation

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, SERVER};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use athos_engine::UploadService;
use crate::handlers::handle_request;

const SERVER_NAME: &str = concat!("athos/", env!("CARGO_PKG_VERSION"));

pub struct AthosServer {
    service: Arc<UploadService>,
}

impl AthosServer {
    pub fn new(service: Arc<UploadService>) -> Self {
        Self { service }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Upload server listening on {}", listener.local_addr()?);
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("New connection from {}", remote_addr);

                    let service = self.service.clone();
                    tokio::spawn(async move {
                        Self::handle_connection(stream, remote_addr, service).await;
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, service: Arc<UploadService>) {
        let io = TokioIo::new(stream);

        let handler = service_fn(move |req: Request<Incoming>| {
            let service = service.clone();
            async move { Ok::<_, Infallible>(handle_request(req, &service).await) }
        });

        if let Err(err) = http2::Builder::new(TokioExecutor::new())
            .serve_connection(io, handler)
            .await
        {
            error!("HTTP/2 connection error from {}: {}", remote_addr, err);
        }
    }
}

/// JSON response with the server header set
pub fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

/// Raw object bytes
pub fn bytes_response(data: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(data));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    response
        .headers_mut()
        .insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}
