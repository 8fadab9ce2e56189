//! Hot-Update Engine
//!
//! The pieces of the reload→render→reconcile protocol:
//!
//! ```text
//! host hook --> orchestrator --> queue(require) --> queue(render)
//!                                                       |
//!                         registry (force re-render) <--+--> generation (epoch)
//! ```
//!
//! # Module Structure
//!
//! - `queue` - FIFO task queue with run-to-completion semantics
//! - `registry` - Per-module record of live proxy instances
//! - `generation` - Process-wide monotonic epoch counter
//! - `timer` - One-shot safety-net timer with cancel
//! - `orchestrator` - Wires the four above into the update protocol

pub mod generation;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod timer;

pub use orchestrator::UpdateOrchestrator;
