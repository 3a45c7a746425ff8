//! # Command Correlation
//!
//! The panel answers commands on its own topics and never echoes a request id. This
//! module pairs each command with the first reply that can settle it and guarantees
//! that every command ends in exactly one [`Outcome`](crate::alarm::Outcome), even if
//! the panel stays silent.
//!
//! ```text
//! correlator/
//! ├── pending.rs             - Typestate lifecycle of one command
//! ├── matcher.rs             - Content-based reply matching and its registry
//! └── command_correlator.rs  - Publish, race reply against deadline, settle
//! ```

pub mod command_correlator;
pub mod matcher;
pub mod pending;

pub use command_correlator::{
    resolve_reply, CommandCorrelator, CorrelatorSettings, DEFAULT_TIMEOUT,
};
pub use matcher::{MatchedReply, MatcherRegistry, ReplyMatcher};
pub use pending::PendingCommand;
