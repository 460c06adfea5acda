//! Concrete transports speaking JSON-RPC to tool-provider servers.

mod http;
mod jsonrpc;
mod process;
mod router;
mod sse;

pub use http::HttpToolTransport;
pub use process::ProcessPipeTransport;
pub use router::TransportRouter;
