//! Basic example demonstrating how to create a simple web server using micro_web.
//! This example shows:
//! - How to define route handlers
//! - How to set up a router with wrappers
//! - How to configure and start a server

use micro_web::router::{Router, get};
use micro_web::wrapper::DateWrapper;
use micro_web::{Server, handler_fn};

/// A simple handler that returns "hello world"
async fn hello_world() -> &'static str {
    "hello world"
}

/// Default handler for unmatched routes (404 responses)
async fn default_handler() -> &'static str {
    "404 not found"
}

#[tokio::main]
async fn main() {
    let router = Router::builder()
        .route("/", get(handler_fn(hello_world)))
        // adds a Date header to every response
        .wrap(DateWrapper)
        .build();

    Server::builder()
        .router(router)
        .bind("127.0.0.1:3000")
        .default_handler(handler_fn(default_handler))
        .build()
        .unwrap()
        .start()
        .await;
}
