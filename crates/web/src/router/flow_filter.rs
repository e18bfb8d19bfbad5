//! Bridges the router's [`Filter`](crate::router::filter::Filter) trait to the Flow VM (§4.6),
//! so a route can be gated by a compiled Flow program instead of (or alongside) the built-in
//! [`filter`](crate::router::filter) combinators — "Handler may consult the Flow VM executing a
//! compiled program to route/transform the request" (§2).
//!
//! The bound request field (path, host, or method, per [`FlowSubject`]) is written into the
//! handler's register 0 with [`waypoint_flow::Runner::set_arg`] before the handler runs; the
//! compiled program's own code is responsible for reading register 0 (there is no richer calling
//! convention — see `Runner::set_arg`'s doc comment). The program's `exit` verdict (§4.6.4) becomes
//! this filter's match result.

use crate::router::filter::Filter;
use crate::RequestContext;
use std::sync::Arc;
use tracing::warn;
use waypoint_flow::{FlowString, LinkedProgram, RunOutcome, Runner, Value};

/// Which request field is bound into register 0 before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSubject {
    /// The decoded request path (`req.uri().path()`), e.g. for `match prefix(path) { ... }`
    /// programs like §8 scenario 5.
    Path,
    /// The `Host` header / authority, lowercased comparisons are the program's job.
    Host,
    /// The request method name (`"GET"`, `"POST"`, ...).
    Method,
}

impl FlowSubject {
    fn extract(self, req: &RequestContext) -> String {
        match self {
            FlowSubject::Path => req.uri().path().to_string(),
            FlowSubject::Host => req.headers().get(http::header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("").to_string(),
            FlowSubject::Method => req.method().as_str().to_string(),
        }
    }
}

/// A [`Filter`] that runs one handler of a linked Flow program per request and matches iff the
/// program exits with verdict `true`.
///
/// Cheap to clone and share across routes: the [`LinkedProgram`] is read-only and `Arc`-shared
/// (§3 "the Flow program is shared (multiple readers) by handlers"); each call to
/// [`matches`](Filter::matches) builds a fresh [`Runner`] (§3 "each invocation builds a fresh
/// runner").
pub struct FlowFilter {
    program: Arc<LinkedProgram>,
    handler: String,
    subject: FlowSubject,
}

impl FlowFilter {
    /// Builds a filter that runs `handler` within `program`, binding `subject` into register 0.
    ///
    /// Returns `None` if `program` has no handler named `handler` (mirrors
    /// [`Runner::new`](waypoint_flow::Runner::new)'s own fallibility) rather than panicking or
    /// deferring the error to the first request.
    pub fn new(program: Arc<LinkedProgram>, handler: impl Into<String>, subject: FlowSubject) -> Option<Self> {
        let handler = handler.into();
        if program.handler_index(&handler).is_none() {
            return None;
        }
        Some(Self { program, handler, subject })
    }

    /// Convenience for the common case of routing by request path (§8 scenario 5).
    pub fn on_path(program: Arc<LinkedProgram>, handler: impl Into<String>) -> Option<Self> {
        Self::new(program, handler, FlowSubject::Path)
    }
}

impl Filter for FlowFilter {
    fn matches(&self, req: &RequestContext) -> bool {
        let mut runner = match Runner::new(&self.program, &self.handler) {
            Some(runner) => runner,
            None => {
                warn!(handler = %self.handler, "flow handler vanished after link");
                return false;
            }
        };

        let subject = self.subject.extract(req);
        if let Err(err) = runner.set_arg(0, Value::Str(FlowString::Owned(subject.into()))) {
            warn!(handler = %self.handler, %err, "failed to bind flow subject register");
            return false;
        }

        match runner.run() {
            Ok(RunOutcome::Finished(verdict)) => verdict,
            Ok(RunOutcome::Suspended(_)) => {
                // Routing decisions are synchronous (§5: the channel's dispatch is not itself a
                // suspension point); a program that suspends mid-route can't be resumed from here.
                warn!(handler = %self.handler, "flow routing handler suspended; treating as no match");
                false
            }
            Err(err) => {
                warn!(handler = %self.handler, %err, "flow routing handler failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{get, Router};
    use crate::{handler_fn, PathParams};
    use http::{Method, Request};
    use micro_http::protocol::RequestHeader;
    use waypoint_flow::{MatchCase, MatchKind, Opcode, ProgramBuilder, Runtime};

    /// Builds the exact §8 scenario 5 program: `match prefix(path) { "/api/" => A; "/" => B; else
    /// => C; }`, collapsed to a boolean verdict (`A` => true, `B`/`C` => false) since `Filter`
    /// only has a binary match/no-match outcome.
    fn prefix_program() -> Arc<LinkedProgram> {
        let mut b = ProgramBuilder::new();
        let matched = b.intern_int(1);
        let not_matched = b.intern_int(0);
        let table = b.intern_match_table(
            MatchKind::Head,
            vec![MatchCase { label: "/api/".into(), pc: 1 }, MatchCase { label: "/".into(), pc: 3 }],
            3,
        );
        let mut h = b.handler("route");
        h.emit(Opcode::MatchHead, table, 0, 0); // pc 0: dispatch on register 0 (bound subject)
        h.emit(Opcode::LoadConstInt, 1, matched, 0); // pc 1: "/api/" case
        h.emit(Opcode::Exit, 1, 0, 0); // pc 2
        h.emit(Opcode::LoadConstInt, 1, not_matched, 0); // pc 3: "/" case and else both land here
        h.emit(Opcode::Exit, 1, 0, 0); // pc 4
        h.finish();
        Arc::new(Runtime::new().link(b.build()).unwrap())
    }

    fn ctx_for(path: &str) -> RequestHeader {
        Request::builder().method(Method::GET).uri(path).body(()).unwrap().into_parts().0.into()
    }

    #[test]
    fn routes_by_path_prefix() {
        let program = prefix_program();
        let filter = FlowFilter::on_path(program, "route").unwrap();

        for (path, expect) in [("/api/v1/x", true), ("/index", false), ("/apx", false)] {
            let header = ctx_for(path);
            let params = PathParams::empty();
            let req = RequestContext::new(&header, &params);
            assert_eq!(filter.matches(&req), expect, "path {path:?}");
        }
    }

    #[test]
    fn new_rejects_unknown_handler_name() {
        let program = prefix_program();
        assert!(FlowFilter::new(program, "no-such-handler", FlowSubject::Path).is_none());
    }

    #[test]
    fn composes_with_router_routes() {
        async fn handled() -> &'static str {
            "flow routed"
        }

        let program = prefix_program();
        let filter = FlowFilter::on_path(program, "route").unwrap();
        let router = Router::builder().route("/api/{*rest}", get(handler_fn(handled)).with(filter)).build();

        let result = router.at("/api/v1/x");
        assert_eq!(result.router_items().len(), 1);
        let header = ctx_for("/api/v1/x");
        let req = RequestContext::new(&header, result.params());
        assert!(result.router_items()[0].filter().matches(&req));
    }
}
