//! Pure data types for pipesh: stage statuses, job states, redirects and events.
//!
//! This crate is a leaf dependency with no async runtime and no I/O.
//! It exists so that embedders can describe pipelines and consume
//! events without pulling in the kernel's process machinery.

pub mod error;
pub mod event;
pub mod job;
pub mod redirect;
pub mod status;
pub mod stream;
pub mod tool;

// Flat re-exports for convenience
pub use error::*;
pub use event::*;
pub use job::*;
pub use redirect::*;
pub use status::*;
pub use stream::*;
pub use tool::*;
