//! Core domain types, errors, and collaborator contracts for `gazette`.
//!
//! Everything the request pipeline shares across crates lives here so the
//! other crates agree on one vocabulary.
//!
//! ## Key Components
//!
//! - **`errors`**: the [`ApiError`] taxonomy surfaced as `extensions.code`,
//!   and the [`StoreError`] reported by document stores.
//! - **`types`**: the per-request [`Identity`] and its canonical [`Role`].
//! - **`response`**: the uniform `{data, errors}` envelope.
//! - **`store`**, **`mail`**, **`clock`**: traits for the external
//!   collaborators, injected into the pipeline at startup.
//! - **`memory`**: an in-process [`DocumentStore`] used by the development
//!   server and by tests.

pub mod clock;
pub mod errors;
pub mod mail;
pub mod memory;
pub mod response;
pub mod store;
pub mod testing;
pub mod types;

pub use self::{
    clock::{Clock, ManualClock, SystemClock},
    errors::{ApiError, ErrorCode, Result, StoreError},
    mail::{MailMessage, Mailer},
    memory::MemoryStore,
    response::{GraphError, Location, PathSegment, Response},
    store::{Collection, Document, DocumentStore, Filter, FindOptions, Sort, SortDirection},
    types::{Identity, Principal, Role, SubjectId},
};
