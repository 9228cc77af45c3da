//! Real-time output pipeline and engine root for Sp3ctra.
//!
//! This crate wires the whole system together:
//!
//! - [`ring`]: wait-free double-buffered audio hand-off
//! - [`producer`]: per-engine render threads paced by ring backpressure
//! - [`output`]: cpal stream construction and the real-time callback
//! - [`auto_volume`]: IMU/contrast-gated master volume
//! - [`midi`]: midir input routed to note events and parameter writes
//! - [`params`]: versioned runtime parameter snapshots
//! - [`engine`]: the root [`Engine`] owning every thread and the stream
//!
//! The real-time rules are concentrated here: the callback in [`output`]
//! is the only code running at audio priority, and its only communication
//! with the rest of the system is rings, atomics and snapshot pointers.

pub mod auto_volume;
pub mod engine;
pub mod midi;
pub mod output;
pub mod params;
pub mod producer;
pub mod ring;

pub use auto_volume::{AutoVolumeConfig, AutoVolumeController};
pub use engine::Engine;
pub use midi::{MidiMessage, MidiRouter, parse_midi, route_message};
pub use output::{OutputConfig, list_output_devices};
pub use params::{ParamSnapshot, ParameterStore};
pub use ring::AudioRing;

/// Errors raised while building or running the output pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// No audio output device available.
    #[error("no audio output device available")]
    NoDevice,

    /// The requested output device was not found.
    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    /// MIDI subsystem error.
    #[error("MIDI error: {0}")]
    Midi(String),

    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] sp3ctra_config::ConfigError),

    /// Ingestion setup failed.
    #[error(transparent)]
    Ingest(#[from] sp3ctra_ingest::Error),
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
