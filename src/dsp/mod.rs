//! # DSP (Digital Signal Processing) Building Blocks
//!
//! - **`delay_line`**: a ring buffer with a write cursor and an independent
//!   read cursor, so several taps can share one sample period.
//!
//! - **`filter`**: an RBJ resonant lowpass biquad with shared coefficients
//!   and per-channel memory.
//!
//! - **`ping_pong`**: the cross-fed pair of delay lines and the
//!   host-independent processor that runs the whole effect per block.

pub mod delay_line;
pub mod filter;
pub mod ping_pong;
