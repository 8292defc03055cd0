//! Builtins, aliases, and the context they run in.

pub mod alias;
pub mod builtin;
mod context;
mod registry;
mod traits;

pub use alias::{Alias, AliasTable};
pub use context::{ExecContext, StageIo};
pub use registry::BuiltinRegistry;
pub use traits::{Builtin, FnBuiltin, builtin_fn};
