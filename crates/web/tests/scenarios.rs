//! End-to-end scenarios (§8, continuing the numbering used in `micro-http`'s own
//! `connection::http_connection::scenario_tests`: 1-4 live there, 5-6 here since they exercise
//! routing and output-filter behavior that only exists at this crate's layer). Each drives a real
//! `micro_http::connection::HttpConnection` over a `tokio::io::duplex` pair with an `Arc<Server>`
//! as the handler, so the whole router dispatch / wrapper chain runs exactly as it would behind a
//! real socket, without binding a port.

use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::stream;
use http_body::Frame;
use http_body_util::StreamBody;
use micro_http::config::ServerConfig;
use micro_http::connection::HttpConnection;
use micro_web::router::flow_filter::{FlowFilter, FlowSubject};
use micro_web::router::{get, Router};
use micro_web::server::Server;
use micro_web::wrapper::EncodeWrapper;
use micro_web::{handler_fn, ResponseBody};
use std::io::Read;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use waypoint_flow::{LinkedProgram, Opcode, ProgramBuilder, Runtime};

/// Writes `request_bytes` into one half of a duplex pair, drives `server` over the other half,
/// shuts down the client's write side (so the connection loop sees EOF instead of blocking on a
/// second request that never comes), and returns everything written back.
async fn drive(server: Arc<Server>, request_bytes: &[u8]) -> Vec<u8> {
    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let connection = HttpConnection::with_config(server_read, server_write, ServerConfig::default(), None);
    let server_task = tokio::spawn(async move {
        let _ = connection.process(server).await;
    });

    let (mut client_read, mut client_write) = tokio::io::split(client);
    client_write.write_all(request_bytes).await.unwrap();
    client_write.shutdown().await.unwrap();

    let mut response = Vec::new();
    client_read.read_to_end(&mut response).await.unwrap();
    server_task.await.unwrap();
    response
}

/// A boolean "does `path` start with `prefix`" program, built the same way
/// `waypoint_flow::runner`'s `set_arg_seeds_a_register_before_run` test builds one: the bound
/// subject lands in register 0, `needle` is loaded as a constant, `PrefixMatch` compares them.
fn prefix_check_program(prefix: &str) -> Arc<LinkedProgram> {
    let mut b = ProgramBuilder::new();
    let needle = b.intern_string(prefix);
    let mut h = b.handler("main");
    h.emit(Opcode::LoadConstString, 1, needle, 0);
    h.emit(Opcode::PrefixMatch, 2, 0, 1);
    h.emit(Opcode::Exit, 2, 0, 0);
    h.finish();
    Arc::new(Runtime::new().link(b.build()).unwrap())
}

async fn handler_a() -> &'static str {
    "A"
}

async fn handler_b() -> &'static str {
    "B"
}

async fn handler_c() -> &'static str {
    "C"
}

/// §8 scenario 5: `match prefix(path) { "/api/" => A; "/" => B; else => C; }`. The router encodes
/// this as two `FlowFilter`-gated routes tried in order (api before root, so an `/api/...` path
/// never falls through to the root bucket) plus a default handler for anything neither matches.
/// The spec's third case, `"" (empty subject) => C`, has no real HTTP counterpart (a request path
/// is never empty) and is instead covered where it actually applies: as a direct `Runner` input in
/// `waypoint_flow::runner::prefix_routing_matches_spec_scenario` and
/// `micro_web::router::flow_filter::tests::routes_by_path_prefix`.
#[tokio::test]
async fn scenario_5_flow_prefix_match() {
    let is_api = FlowFilter::new(prefix_check_program("/api/"), "main", FlowSubject::Path).unwrap();
    let is_root = FlowFilter::new(prefix_check_program("/"), "main", FlowSubject::Path).unwrap();

    let router = Router::builder()
        .route("/{*rest}", get(handler_fn(handler_a)).with(is_api))
        .route("/{*rest}", get(handler_fn(handler_b)).with(is_root))
        .build();

    let server = Arc::new(
        Server::builder()
            .router(router)
            .default_handler(handler_c)
            .bind("127.0.0.1:0")
            .build()
            .unwrap(),
    );

    for (path, expect_body) in [("/api/v1/x", "A"), ("/index", "B"), ("/apx", "B")] {
        let request = format!("GET {path} HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
        let response = String::from_utf8(drive(server.clone(), request.as_bytes()).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "path {path:?}: {response}");
        assert!(response.ends_with(expect_body), "path {path:?} expected body {expect_body:?}: {response}");
    }
}

/// §8 scenario 6: a streamed, no-declared-length body ("aaa" + "bbb" + "ccc", three separate
/// frames) behind the output compression wrapper, requested with `Accept-Encoding: gzip`.
#[tokio::test]
async fn scenario_6_chunked_response_with_compression() {
    async fn three_chunks() -> http::Response<ResponseBody> {
        let chunks = stream::iter(vec![
            Ok::<_, micro_http::protocol::HttpError>(Frame::data(Bytes::from_static(b"aaa"))),
            Ok(Frame::data(Bytes::from_static(b"bbb"))),
            Ok(Frame::data(Bytes::from_static(b"ccc"))),
        ]);
        // `StreamBody`'s `size_hint` is the default (no known upper bound), unlike a buffered
        // body built from the full 9 bytes up front -- this is what keeps `EncodeWrapper` from
        // treating the body as "too small to be worth compressing".
        http::Response::builder().status(http::StatusCode::OK).body(ResponseBody::stream(StreamBody::new(chunks))).unwrap()
    }

    let router = Router::builder().route("/stream", get(handler_fn(three_chunks))).wrap(EncodeWrapper).build();
    let server = Arc::new(Server::builder().router(router).bind("127.0.0.1:0").build().unwrap());

    let request = b"GET /stream HTTP/1.1\r\nHost: x\r\nAccept-Encoding: gzip\r\nConnection: close\r\n\r\n";
    let response = drive(server, request).await;
    let header_end = response.windows(4).position(|w| w == b"\r\n\r\n").expect("header terminator present") + 4;
    let head = String::from_utf8_lossy(&response[..header_end]).to_string();

    assert!(head.contains("Content-Encoding: gzip\r\n"), "{head}");
    assert!(head.contains("Transfer-Encoding: chunked\r\n"), "{head}");
    assert!(head.contains("Vary: Accept-Encoding\r\n"), "{head}");
    assert!(!head.contains("Content-Length:"), "{head}");

    // Body is chunk-framed; strip the chunk sizes/CRLFs to recover the raw gzip stream before
    // decompressing it.
    let mut gzip_bytes = Vec::new();
    let mut rest = &response[header_end..];
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n").expect("chunk size line");
        let size_line = std::str::from_utf8(&rest[..line_end]).unwrap();
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
        rest = &rest[line_end + 2..];
        if size == 0 {
            break;
        }
        gzip_bytes.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..]; // skip the chunk's trailing CRLF
    }

    let mut decoded = String::new();
    GzDecoder::new(gzip_bytes.as_slice()).read_to_string(&mut decoded).unwrap();
    assert_eq!(decoded, "aaabbbccc");
}
