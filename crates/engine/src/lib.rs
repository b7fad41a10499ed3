//! The gazette request pipeline
//!
//! [`Pipeline::execute`] takes a request body and the raw `Authorization`
//! header through parsing, validation, identity resolution, cost evaluation,
//! the response cache and execution, and always answers with a
//! `{data, errors}` envelope.

pub mod context;
pub mod executor;
pub mod pipeline;
pub mod request;
pub mod resolvers;
pub mod services;

pub use context::RequestContext;
pub use pipeline::Pipeline;
pub use request::{CacheStatus, ExecutionOutcome, GraphRequest};
pub use services::{AccountSettings, Services};
