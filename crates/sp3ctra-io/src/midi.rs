//! MIDI input routing.
//!
//! A midir input connection parses raw bytes into typed messages and
//! routes them channel-agnostically:
//!
//! - note on/off (velocity 0 treated as off) go to the LuxWave producer
//!   over a bounded channel, drained before each block
//! - the LuxWave CC map (CC1 scan mode, CC7 amplitude, CC74 interpolation)
//!   and the General-MIDI-conventional extras (CC72 release, CC73 attack,
//!   CC91 reverb mix) land in the parameter store
//!
//! Every routing step is a channel send or an RCU parameter write; nothing
//! here touches the real-time path. Unmapped CCs are counted, not errors.

use crate::params::ParameterStore;
use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};
use sp3ctra_synth::{InterpMode, NoteEvent, ScanMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A parsed, channel-stripped MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note pressed.
    NoteOn {
        /// MIDI note number.
        note: u8,
        /// Velocity (0 means off).
        velocity: u8,
    },
    /// Note released.
    NoteOff {
        /// MIDI note number.
        note: u8,
    },
    /// Continuous controller change.
    ControlChange {
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
}

/// Parse one raw MIDI message (status + data bytes).
///
/// Returns `None` for anything the router does not consume (program
/// change, pitch bend, system messages).
pub fn parse_midi(bytes: &[u8]) -> Option<MidiMessage> {
    let (&status, data) = bytes.split_first()?;
    match status & 0xF0 {
        0x90 => {
            let note = *data.first()?;
            let velocity = *data.get(1)?;
            if velocity == 0 {
                Some(MidiMessage::NoteOff { note })
            } else {
                Some(MidiMessage::NoteOn { note, velocity })
            }
        }
        0x80 => Some(MidiMessage::NoteOff {
            note: *data.first()?,
        }),
        0xB0 => Some(MidiMessage::ControlChange {
            controller: *data.first()?,
            value: *data.get(1)?,
        }),
        _ => None,
    }
}

/// CC value to a 0..1 scalar.
#[inline]
fn cc_unit(value: u8) -> f32 {
    value as f32 / 127.0
}

/// CC value to an envelope time: 1..1000 ms on a square curve so the low
/// half of the knob covers the musically dense short times.
#[inline]
fn cc_to_ms(value: u8) -> f32 {
    let t = cc_unit(value);
    1.0 + t * t * 999.0
}

/// Route one parsed message.
///
/// Pure function so the mapping is testable without a MIDI device. Returns
/// `false` for messages that matched nothing (unmapped CCs).
pub fn route_message(
    message: MidiMessage,
    notes: &Sender<NoteEvent>,
    store: &ParameterStore,
) -> bool {
    match message {
        MidiMessage::NoteOn { note, velocity } => notes
            .try_send(NoteEvent::On { note, velocity })
            .is_ok(),
        MidiMessage::NoteOff { note } => notes.try_send(NoteEvent::Off { note }).is_ok(),
        MidiMessage::ControlChange { controller, value } => match controller {
            1 => {
                store.update(|p| p.luxwave.scan_mode = ScanMode::from_cc(value));
                true
            }
            7 => {
                store.update(|p| p.luxwave.amplitude = cc_unit(value));
                true
            }
            74 => {
                store.update(|p| p.luxwave.interp = InterpMode::from_cc(value));
                true
            }
            72 => {
                store.update(|p| p.luxstral.release_ms = cc_to_ms(value));
                true
            }
            73 => {
                store.update(|p| p.luxstral.attack_ms = cc_to_ms(value));
                true
            }
            91 => {
                store.update(|p| p.reverb_mix = cc_unit(value));
                true
            }
            _ => false,
        },
    }
}

/// Live MIDI input held for the engine's lifetime.
///
/// Dropping the router closes the connection.
pub struct MidiRouter {
    _connection: MidiInputConnection<()>,
    /// Messages that matched no mapping.
    pub unmapped: Arc<AtomicU64>,
}

impl std::fmt::Debug for MidiRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiRouter")
            .field("unmapped", &self.unmapped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MidiRouter {
    /// Connect to a MIDI input port.
    ///
    /// `port_name` selects by case-insensitive substring; `None` takes the
    /// first available port. Returns `Ok(None)` when no port exists;
    /// running without a controller is normal.
    pub fn connect(
        port_name: Option<&str>,
        notes: Sender<NoteEvent>,
        store: Arc<ParameterStore>,
    ) -> Result<Option<Self>, crate::Error> {
        let mut input =
            MidiInput::new("sp3ctra").map_err(|e| crate::Error::Midi(e.to_string()))?;
        input.ignore(Ignore::All);

        let ports = input.ports();
        let port = match port_name {
            Some(search) => {
                let needle = search.to_lowercase();
                ports.iter().find(|p| {
                    input
                        .port_name(p)
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            }
            None => ports.first(),
        };
        let Some(port) = port else {
            tracing::info!("no MIDI input port available; running without MIDI");
            return Ok(None);
        };

        let name = input.port_name(port).unwrap_or_else(|_| "unknown".into());
        let unmapped = Arc::new(AtomicU64::new(0));
        let unmapped_in_callback = Arc::clone(&unmapped);

        let connection = input
            .connect(
                port,
                "sp3ctra-in",
                move |_timestamp, bytes, _data: &mut ()| {
                    if let Some(message) = parse_midi(bytes)
                        && !route_message(message, &notes, &store)
                    {
                        unmapped_in_callback.fetch_add(1, Ordering::Relaxed);
                    }
                },
                (),
            )
            .map_err(|e| crate::Error::Midi(e.to_string()))?;

        tracing::info!(port = %name, "MIDI input connected");
        Ok(Some(Self {
            _connection: connection,
            unmapped,
        }))
    }
}
