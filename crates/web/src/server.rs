//! Server module for handling HTTP requests and managing web server lifecycle.
//!
//! This module provides the core server functionality including:
//! - Server builder pattern for configuration
//! - HTTP request routing and handling
//! - Connection management and error handling
//! - Default request handling
//!
//! # Examples
//!
//! ```no_run
//! use micro_web::{Server, router::{Router, get}};
//!
//! async fn hello_world() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::builder()
//!         .route("/", get(hello_world))
//!         .build();
//!         
//!     Server::builder()
//!         .router(router)
//!         .bind("127.0.0.1:3000")
//!         .build()
//!         .unwrap()
//!         .start()
//!         .await;
//! }
//! ```

use crate::handler::RequestHandler;
use crate::router::Router;
use crate::{OptionReqBody, RequestContext, ResponseBody, handler_fn, FnTrait};
use http::{Request, Response, StatusCode};
use micro_http::config::ServerConfig;
use micro_http::connection::{DateGenerator, HttpConnection};
use micro_http::connector::{Connector, Endpoint};
use micro_http::handler::Handler;
use micro_http::protocol::RequestHeader;
use micro_http::protocol::body::ReqBody;
use std::error::Error;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::LocalSet;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use crate::extract::FromRequest;
use crate::responder::Responder;

/// Builder for configuring and constructing a [`Server`] instance.
///
/// The builder provides a fluent API for setting server options including:
/// - Binding address
/// - Request router
/// - Default request handler
#[derive(Debug)]
pub struct ServerBuilder {
    router: Option<Router>,
    default_handler: Option<Box<dyn RequestHandler>>,
    address: Option<Vec<SocketAddr>>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, default_handler: None, address: None }
    }

    pub fn bind<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().unwrap().collect::<Vec<_>>());
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn default_handler<F, Args>(mut self, f: F) -> Self
    where
    for<'r> F: FnTrait<Args> + 'r,
    for<'r> Args: FromRequest + 'r,
    for<'r> F: FnTrait<Args::Output<'r>>,
    for<'r> <F as FnTrait<Args::Output<'r>>>::Output: Responder,
    {
        let handler = handler_fn(f);
        self.default_handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let new_builder = if self.default_handler.is_none() { self.default_handler(default_handler) } else { self };
        let router = new_builder.router.ok_or(ServerBuildError::MissingRouter)?;
        let address = new_builder.address.ok_or(ServerBuildError::MissingAddress)?;

        // unwrap is safe here because we set it in the new_builder
        Ok(Server { router, default_handler: new_builder.default_handler.unwrap(), address })
    }
}

async fn default_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 Not Found")
}

/// Core server implementation that processes HTTP requests.
///
/// The server is responsible for:
/// - Listening for incoming connections
/// - Routing requests to appropriate handlers
/// - Managing connection lifecycle
/// - Error handling and logging
///
#[derive(Debug)]
pub struct Server {
    router: Router,
    default_handler: Box<dyn RequestHandler>,
    address: Vec<SocketAddr>,
}

/// Errors that can occur during server construction.
#[derive(Error, Debug)]
pub enum ServerBuildError {
    /// Router was not configured
    #[error("router must be set")]
    MissingRouter,

    /// Bind address was not configured
    #[error("address must be set")]
    MissingAddress,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Runs one reactor per core (§4.1/§5): each worker is an OS thread pinning its
    /// own single-threaded `tokio` runtime and `LocalSet`, with its own [`Connector`]
    /// bound to the same address via `SO_REUSEPORT` so the kernel load-balances
    /// accepted connections across workers. This is the "one reactor per core,
    /// share-nothing between them" model generalized from this codebase's previous
    /// single accept loop.
    pub async fn start(self) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::WARN).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

        let Some(&addr) = self.address.first() else {
            error!("no bind address configured");
            return;
        };
        if self.address.len() > 1 {
            warn!(extra = self.address.len() - 1, "multiple resolved bind addresses given, only the first is used");
        }

        let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        info!(%addr, worker_count, "starting server");

        let handler = Arc::new(self);
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let handler = handler.clone();
                let mut shutdown_rx = shutdown_tx.subscribe();
                std::thread::Builder::new()
                    .name(format!("reactor-{worker_id}"))
                    .spawn(move || {
                        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                            Ok(runtime) => runtime,
                            Err(e) => {
                                error!(cause = %e, worker_id, "failed to build reactor runtime");
                                return;
                            }
                        };
                        let local = LocalSet::new();
                        local.block_on(&runtime, async move {
                            let config = Arc::new(ServerConfig::default());
                            let connector = match Connector::bind_with_limits(addr, config.connector.clone(), config.limits.clone()) {
                                Ok(connector) => connector,
                                Err(e) => {
                                    error!(cause = %e, worker_id, "bind server error");
                                    return;
                                }
                            };

                            // Shared across every connection this worker serves: refreshed on its
                            // own background task rather than formatted once per response.
                            let date = Arc::new(DateGenerator::new());

                            let shutdown = Box::pin(async move {
                                let _ = shutdown_rx.changed().await;
                            });

                            let factory = move |endpoint: Endpoint, _remote_addr: SocketAddr| {
                                let handler = handler.clone();
                                let config = config.clone();
                                let date = date.clone();
                                async move {
                                    endpoint.set_read_timeout(config.timeouts.read);
                                    endpoint.set_write_timeout(config.timeouts.write);
                                    let cancel_handle = endpoint.cancel_handle();
                                    let (reader, writer) = tokio::io::split(endpoint);
                                    let connection = HttpConnection::with_config(reader, writer, (*config).clone(), Some(date));
                                    let result = connection.process(handler).await;
                                    // The connection is going away either way; drop any reactor
                                    // registration still pending on its fd (idle-timeout/keep-alive-cap
                                    // eviction can otherwise leave a wait registered past teardown).
                                    cancel_handle.cancel_pending();
                                    match result {
                                        Ok(_) => info!("finished process, connection shutdown"),
                                        Err(e) => error!("service has error, cause {}, connection shutdown", e),
                                    }
                                }
                            };

                            if let Err(e) = connector.serve(factory, shutdown).await {
                                error!(cause = %e, worker_id, "connector stopped");
                            }
                        });
                    })
            })
            .collect();

        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, stopping workers");
        let _ = shutdown_tx.send(true);

        for worker in workers {
            match worker {
                Ok(join_handle) => {
                    if join_handle.join().is_err() {
                        error!("reactor worker thread panicked");
                    }
                }
                Err(e) => error!(cause = %e, "failed to spawn reactor worker thread"),
            }
        }
    }
}

impl Handler for Server {
    type RespBody = ResponseBody;
    type Error = Box<dyn Error + Send + Sync>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        let (parts, body) = req.into_parts();
        let header = RequestHeader::from(parts);
        // TODO: insignificant memory allocate
        let req_body = OptionReqBody::from(body);

        let path = header.uri().path();
        let route_result = self.router.at(path);

        let mut request_context = RequestContext::new(&header, route_result.params());

        let handler = route_result
            .router_items()
            .iter()
            .filter(|item| item.filter().matches(&request_context))
            .map(|item| item.handler())
            .take(1)
            .next()
            .unwrap_or(self.default_handler.as_ref());

        let response = handler.invoke(&mut request_context, req_body).await;
        Ok(response)
    }
}
