//! Data models
//!
//! Records owned by the metadata store, the request context passed down from the
//! HTTP layer, and the statistics view over failed attempts.

mod attempt;
mod context;
mod file;
mod statistics;
mod upload;

pub use attempt::*;
pub use context::*;
pub use file::*;
pub use statistics::*;
pub use upload::*;
