//! Kafka wire protocol handling
//!
//! ## Submodules
//!
//! - `frame`: length-prefixed frames and the version-independent headers
//! - `api`: the API registry and one binding per served API
//! - `compression`: per-connection body transforms
//! - `pipeline`: in-order response release for one connection
//! - `slots`: execution slots shared by all connections
//! - `dispatcher`: the per-connection read/handle/write loop

pub mod api;
pub mod compression;
pub mod dispatcher;
pub mod frame;
pub mod pipeline;
pub mod slots;

pub use api::{registry, ApiDescriptor, ApiHandler, ApiRegistry, GroupState, Request, RequestContext, Response};
pub use compression::CompressionCodec;
pub use dispatcher::{CloseReason, DispatchSettings, Dispatcher};
pub use frame::{RequestFrame, RequestHeader, ResponseFrame};
pub use pipeline::Pipeline;
pub use slots::ExecutionSlots;
