//! # Alarm Domain Model
//!
//! Vocabulary shared by the correlator, the broadcaster and the HTTP surface. Nothing
//! in here performs I/O; every type is a plain value that can be matched on.
//!
//! ## Module Architecture
//!
//! ```text
//! alarm/
//! ├── state.rs    - SystemState as reported on the state topic
//! ├── command.rs  - ArmMode and the command payload sent to the panel
//! ├── event.rs    - Controller event codes and their closed verdict mapping
//! └── outcome.rs  - The settled result of a single command
//! ```
//!
//! ## Design Philosophy
//!
//! The panel speaks in strings. Every string is turned into an enum at the edge so that
//! a new event code or state shows up as a non-exhaustive `match` rather than a silent
//! default branch somewhere in the command flow.

pub mod command;
pub mod event;
pub mod outcome;
pub mod state;

pub use command::{ArmMode, CommandRequest};
pub use event::{ControllerEvent, DecodedEvent, EventParseError, EventVerdict};
pub use outcome::{ErrorClass, ErrorKind, Outcome};
pub use state::SystemState;
