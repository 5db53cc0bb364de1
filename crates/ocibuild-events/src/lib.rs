//! Typed event and progress bus.
//!
//! Emission is synchronous to a single-threaded dispatch executor: the
//! `EventBus` forwards everything through one mpsc-fed task before
//! broadcasting, so subscribers observe events in submission order
//! regardless of which worker thread produced them.

mod allocation;
mod bus;
mod event;

pub use allocation::{AllocationRegistry, AllocationState};
pub use bus::{EventBus, EventReceiver, EventSender, SendError};
pub use event::{Event, LogLevel, OciEvent, TimerState};
