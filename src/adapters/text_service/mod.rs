//! Text service adapter implementations.

pub mod http;
pub mod mock;

pub use http::HttpTextService;
pub use mock::{MockReply, MockTextService};
