#![feature(type_alias_impl_trait)]
#![feature(async_fn_in_trait)]
#![feature(impl_trait_projections)]

mod body;
mod date;
pub mod extract;
mod fn_trait;
mod handler;
mod request;
pub mod responder;
pub mod router;
pub mod server;
pub mod wrapper;

pub use body::{OptionReqBody, ResponseBody};
pub use extract::FromRequest;
pub use fn_trait::FnTrait;
pub use handler::{FnHandler, handler_fn};
pub use request::{PathParams, RequestContext};
