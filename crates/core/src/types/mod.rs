//! Domain types shared by every stage of the pipeline

pub mod identity;
pub mod newtypes;

pub use identity::{Identity, Principal, Role};
pub use newtypes::SubjectId;
