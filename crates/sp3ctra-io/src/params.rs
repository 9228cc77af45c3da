//! Thread-safe runtime parameter store.
//!
//! All runtime-tunable parameters live in one immutable [`ParamSnapshot`]
//! published through `ArcSwap`. Control paths (MIDI router, host setters)
//! mutate with a read-copy-update; engines load exactly one snapshot per
//! block, so a block can never observe a torn multi-field update. The
//! version field increments on every update, which is what the snapshot
//! consistency tests key on.
//!
//! Structural parameters (DPI, worker count, buffer size) are deliberately
//! absent: they are constructor inputs of the engine, and changing them
//! means building a new engine.

use arc_swap::ArcSwap;
use sp3ctra_effects::ReverbParams;
use sp3ctra_synth::{LuxStralBlockParams, LuxWaveParams};
use std::sync::Arc;

/// One consistent view of every runtime parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSnapshot {
    /// Monotonic update counter.
    pub version: u64,
    /// Additive engine parameters.
    pub luxstral: LuxStralBlockParams,
    /// Wavetable engine parameters.
    pub luxwave: LuxWaveParams,
    /// Reverb parameters.
    pub reverb: ReverbParams,
    /// Reverb bypass.
    pub reverb_enabled: bool,
    /// Reverb dry/wet mix in [0, 1].
    pub reverb_mix: f32,
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            luxstral: LuxStralBlockParams::default(),
            luxwave: LuxWaveParams::default(),
            reverb: ReverbParams::default(),
            reverb_enabled: true,
            reverb_mix: 0.3,
        }
    }
}

/// Shared parameter store.
#[derive(Debug)]
pub struct ParameterStore {
    snapshot: ArcSwap<ParamSnapshot>,
}

impl ParameterStore {
    /// Create a store seeded with `initial` (version forced to 0).
    pub fn new(mut initial: ParamSnapshot) -> Self {
        initial.version = 0;
        Self {
            snapshot: ArcSwap::from_pointee(initial),
        }
    }

    /// Load the current snapshot (engines: once per block).
    #[inline]
    pub fn load(&self) -> Arc<ParamSnapshot> {
        self.snapshot.load_full()
    }

    /// Read-copy-update: apply `mutate` to a copy, bump the version,
    /// publish. Safe from any control thread; never called from the
    /// real-time path.
    pub fn update(&self, mutate: impl Fn(&mut ParamSnapshot)) {
        self.snapshot.rcu(|current| {
            let mut next = ParamSnapshot::clone(current);
            mutate(&mut next);
            next.version = current.version + 1;
            next
        });
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ParamSnapshot::default())
    }
}
