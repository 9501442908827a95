//! Rill Core - Push-based event sources
//!
//! This crate defines the single propagation primitive of Rill:
//! - `Source<T>`: accepts values via `push`, keeps replay history and
//!   forwards everything to connected sinks
//! - `Sink<T>`: the two-operation consumer contract (`push` / `close`)
//! - `EventLog<T>`: tagged history replayed to late-joining sinks
//! - `SourceOptions`: buffering and shared-stream configuration
//!
//! # Propagation model
//!
//! Delivery is synchronous and depth-first. A chain A → B → C delivers a
//! value to C before the `push` into A returns. Sources are sinks too, so
//! they compose into trees and DAGs. Cycles are not detected.

pub mod error;
pub mod event;
pub mod options;
pub mod sink;
pub mod source;

pub use error::*;
pub use event::*;
pub use options::*;
pub use sink::*;
pub use source::*;
