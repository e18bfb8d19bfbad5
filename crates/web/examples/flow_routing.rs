//! Demonstrates gating a route with a compiled Flow program instead of (or alongside) the
//! built-in filter combinators: a `Head` (prefix) match table decides whether a path falls
//! under `/api/`, the same worked scenario the specification's §8 "Flow prefix match" example
//! describes.

use http::StatusCode;
use micro_web::router::flow_filter::FlowFilter;
use micro_web::router::{Router, get};
use micro_web::{Server, handler_fn};
use std::sync::Arc;
use waypoint_flow::{MatchCase, MatchKind, Opcode, ProgramBuilder, Runtime};

async fn api_handler() -> &'static str {
    "routed here by the flow VM"
}

async fn default_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 not found")
}

/// Builds a one-handler program: `match prefix(path) { "/api/" => true; "/" => false; }`.
fn build_api_prefix_program() -> Arc<waypoint_flow::LinkedProgram> {
    let mut builder = ProgramBuilder::new();
    let matched = builder.intern_int(1);
    let not_matched = builder.intern_int(0);
    let table = builder.intern_match_table(
        MatchKind::Head,
        vec![MatchCase { label: "/api/".into(), pc: 1 }, MatchCase { label: "/".into(), pc: 3 }],
        3,
    );
    let mut handler = builder.handler("is_api_route");
    handler.emit(Opcode::MatchHead, table, 0, 0);
    handler.emit(Opcode::LoadConstInt, 1, matched, 0);
    handler.emit(Opcode::Exit, 1, 0, 0);
    handler.emit(Opcode::LoadConstInt, 1, not_matched, 0);
    handler.emit(Opcode::Exit, 1, 0, 0);
    handler.finish();

    Arc::new(Runtime::new().link(builder.build()).expect("program links against an empty runtime with no natives"))
}

#[tokio::main]
async fn main() {
    let program = build_api_prefix_program();
    let api_filter = FlowFilter::on_path(program, "is_api_route").expect("handler name matches the one just built");

    let router = Router::builder().route("/{*path}", get(handler_fn(api_handler)).with(api_filter)).build();

    Server::builder()
        .router(router)
        .bind("127.0.0.1:3000")
        .default_handler(handler_fn(default_handler))
        .build()
        .unwrap()
        .start()
        .await;
}
