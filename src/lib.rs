#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

// reports allocations in the audio thread as violations in tests
#[cfg(all(test, debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

// private mods (will be partly re-exported)
mod control;
mod engine;
mod error;
#[cfg(any(feature = "cpal-output", feature = "wav-output"))]
mod output;

// public, flat re-exports
pub use error::Error;

pub use engine::{
    clock::{TempoClock, TempoHandle},
    grain::{EnvelopeTable, Grain},
    scheduler::{GrainScheduler, GrainSpawns},
    status::{CpuLoad, EngineStatus, StatusHandle},
    voice::{Voice, VoiceOptions},
    Engine, EngineOptions,
};

pub use control::{
    spawn_control_thread, ControlAction, ControlHandler, NoteEvent, NoteEventKind, TapTempo,
};

#[cfg(feature = "midi-input")]
#[cfg_attr(docsrs, doc(cfg(feature = "midi-input")))]
pub use control::midi::MidiControlInput;

// public mods
pub mod utils;

pub mod outputs {
    //! Audio outputs which drive an [`Engine`](crate::Engine).

    #[cfg(feature = "cpal-output")]
    #[cfg_attr(docsrs, doc(cfg(feature = "cpal-output")))]
    pub use super::output::cpal::CpalOutput;

    #[cfg(feature = "wav-output")]
    #[cfg_attr(docsrs, doc(cfg(feature = "wav-output")))]
    pub use super::output::wav::render_to_wav;
}

pub use utils::{sample::OutputSample, window::GrainWindowMode};
