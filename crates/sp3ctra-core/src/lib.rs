//! Sp3ctra Core - DSP primitives shared by the synthesis engines
//!
//! This crate provides the foundational building blocks the Sp3ctra engines
//! are assembled from, designed for real-time audio processing with zero
//! allocation in the audio path.
//!
//! # Contents
//!
//! - [`SmoothedParam`] - Exponential parameter smoothing (zipper-free changes)
//! - [`OnePole`] - One-pole lowpass for damping and voice filtering
//! - [`DelayRing`] - Fixed-capacity delay line with a movable integer tap
//! - [`Lfo`] - Sine low-frequency oscillator for vibrato
//! - [`AtomicF32`] - f32 published through an `AtomicU32` (bit pattern)
//! - Math helpers: [`db_to_linear`], [`soft_limit`], [`signed_pow`],
//!   [`constant_power_gains`], [`flush_denormal`]
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocations in audio processing paths
//! - **Safe code only**: lock-free publication uses plain atomics, never `unsafe`
//! - **`libm` for math**: float math goes through libm like the rest of the
//!   workspace's DSP crates

pub mod atomic;
pub mod delay;
pub mod lfo;
pub mod math;
pub mod one_pole;
pub mod param;

pub use atomic::AtomicF32;
pub use delay::DelayRing;
pub use lfo::Lfo;
pub use math::{
    constant_power_gains, db_to_linear, flush_denormal, linear_to_db, one_pole_alpha, signed_pow,
    soft_limit,
};
pub use one_pole::OnePole;
pub use param::SmoothedParam;
