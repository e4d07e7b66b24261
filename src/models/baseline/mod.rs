//! Baseline models.

mod carry_forward;

pub use carry_forward::{CarryForward, CarryForwardStrategy};
