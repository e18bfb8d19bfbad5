//! Serves a single file from disk using `FileView`, the streamed file-backed
//! response body.

use micro_web::responder::file::FileView;
use micro_web::router::{Router, get};
use micro_web::wrapper::DateWrapper;
use micro_web::{Server, handler_fn};

async fn serve_readme() -> FileView {
    FileView::open("README.md").await.expect("README.md should be readable")
}

async fn default_handler() -> &'static str {
    "404 not found"
}

#[tokio::main]
async fn main() {
    let router = Router::builder().route("/readme", get(handler_fn(serve_readme))).wrap(DateWrapper).build();

    Server::builder()
        .router(router)
        .bind("127.0.0.1:3000")
        .default_handler(handler_fn(default_handler))
        .build()
        .unwrap()
        .start()
        .await;
}
