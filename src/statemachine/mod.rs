//! State machine subsystem
//!
//! - [`StateMachine`]: pluggable business logic (`apply / read / snapshot / restore`)
//! - [`StateMachineAdapter`]: sequential apply, applied index, halt on failure
//! - [`ApplyDriver`]: the per-group apply thread
//! - [`IntegerCounter`]: a counter used by the demo and the test suite
//!
//! # Contract
//!
//! - `apply` sees entries strictly in index order, from one thread
//! - exactly one `on_applied(entry.index)` follows each successful apply
//! - `snapshot() == None` is a legitimate configuration that forces full
//!   log replay on restart
//! - `restore` runs once at startup, before recovery begins

mod adapter;
mod counter;
mod driver;
mod errors;
mod machine;

pub use adapter::StateMachineAdapter;
pub use counter::IntegerCounter;
pub use driver::{ApplyContext, ApplyDriver, ApplySignal};
pub use errors::{StateMachineError, StateMachineResult};
pub use machine::{StateMachine, StateMachineProvider};
