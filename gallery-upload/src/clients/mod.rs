//! Remote collaborators of the upload pipeline.
//!
//! Each collaborator sits behind a trait so handlers and the pipeline can be tested against
//! in-memory fakes.

pub mod cdn;
pub mod codec;
pub mod storage;
