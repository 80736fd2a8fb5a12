//! Effect lifecycle management (apply / tick / expire).

pub mod lifecycle;

pub use lifecycle::{on_apply, on_expire, on_turn_end, on_turn_start, process_timing, LifecycleEvent};
