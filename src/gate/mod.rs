//! Cooldown/threshold gates deciding when generative tasks run
//!
//! A gate fires only if its cooldown has elapsed since the last fire and the
//! transcript has grown by at least its threshold. Time comes from an injected
//! [`Clock`] so tests never sleep.

mod clock;
mod engine;
mod policy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Gate, GatingEngine};
pub use policy::{GatePolicy, GateSettings};
