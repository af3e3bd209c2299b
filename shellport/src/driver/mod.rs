//! High-level session driver.
//!
//! The driver layer ties the transport, the channel streams and the local
//! commands together: the builder validates configuration, the session runs
//! the interactive loop and the interception controller handles each
//! recognized command.

mod builder;
pub mod intercept;
mod session;

pub use builder::SessionBuilder;
pub use intercept::{InterceptConfig, InterceptController, InterceptOutcome, PipeState};
pub use session::{Session, SessionConfig};
