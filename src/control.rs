//! Note based control input: tap tempo and voice triggers, optionally fed by a MIDI port.

use std::{
    collections::VecDeque,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;

use crate::{engine::clock::TempoHandle, Error};

#[cfg(feature = "midi-input")]
pub(crate) mod midi;

// -------------------------------------------------------------------------------------------------

/// Kind of a [`NoteEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A note on or off event from a keyboard like controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub note: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn note_on(note: u8, velocity: u8) -> Self {
        Self {
            kind: NoteEventKind::NoteOn,
            note,
            velocity,
        }
    }

    pub fn note_off(note: u8) -> Self {
        Self {
            kind: NoteEventKind::NoteOff,
            note,
            velocity: 0,
        }
    }

    /// Decode a raw MIDI channel voice message. Returns None for all messages which are not
    /// note ons or offs, and for malformed messages.
    ///
    /// A note on with velocity 0 is decoded as note off.
    pub fn from_midi(bytes: &[u8]) -> Option<Self> {
        let [status, note, velocity, ..] = *bytes else {
            return None;
        };
        if note > 0x7F || velocity > 0x7F {
            return None;
        }
        match status & 0xF0 {
            0x90 if velocity > 0 => Some(Self::note_on(note, velocity)),
            0x90 | 0x80 => Some(Self {
                kind: NoteEventKind::NoteOff,
                note,
                velocity,
            }),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Derives a tempo from the intervals between consecutive taps.
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    last_tap: Option<Instant>,
    intervals: VecDeque<f64>,
}

impl TapTempo {
    /// Number of tap intervals which get averaged.
    pub const MAX_INTERVALS: usize = 4;
    /// Taps closer than this restart the tap sequence.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
    /// Taps further apart than this restart the tap sequence.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap at the given time. Returns the new tempo in bpm as soon as at least
    /// two intervals are known.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        let last_tap = self.last_tap.replace(now)?;
        let interval = now.saturating_duration_since(last_tap);
        if !(Self::MIN_INTERVAL..=Self::MAX_INTERVAL).contains(&interval) {
            self.intervals.clear();
            return None;
        }
        if self.intervals.len() == Self::MAX_INTERVALS {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval.as_secs_f64());
        if self.intervals.len() >= 2 {
            let average = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
            Some(60.0 / average)
        } else {
            None
        }
    }

    /// Forget all previous taps.
    pub fn reset(&mut self) {
        self.last_tap = None;
        self.intervals.clear();
    }
}

// -------------------------------------------------------------------------------------------------

/// Result of a [`ControlHandler::handle`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    /// Tap tempo applied a new tempo.
    TempoChanged(f64),
    /// A voice trigger note was played for the voice with the given index.
    VoiceTriggered(usize),
    /// The event has no mapping or did not yet change anything.
    Ignored,
}

/// Maps note events to tempo changes and voice triggers.
///
/// Note ons of the tap note feed a [`TapTempo`]. Note ons from the base note upwards address
/// the engine's voices by index. All other events are ignored.
#[derive(Debug, Clone)]
pub struct ControlHandler {
    tempo: TempoHandle,
    voice_count: usize,
    tap_note: u8,
    base_note: u8,
    tap_tempo: TapTempo,
}

impl ControlHandler {
    /// Default tap tempo note: C3.
    pub const DEFAULT_TAP_NOTE: u8 = 48;
    /// Default note of the first voice: C4.
    pub const DEFAULT_BASE_NOTE: u8 = 60;

    pub fn new(tempo: TempoHandle, voice_count: usize) -> Self {
        Self {
            tempo,
            voice_count,
            tap_note: Self::DEFAULT_TAP_NOTE,
            base_note: Self::DEFAULT_BASE_NOTE,
            tap_tempo: TapTempo::new(),
        }
    }

    pub fn with_tap_note(mut self, note: u8) -> Self {
        self.tap_note = note;
        self
    }

    pub fn with_base_note(mut self, note: u8) -> Self {
        self.base_note = note;
        self
    }

    pub fn tap_note(&self) -> u8 {
        self.tap_note
    }

    pub fn base_note(&self) -> u8 {
        self.base_note
    }

    /// Handle an event which just arrived.
    pub fn handle(&mut self, event: NoteEvent) -> ControlAction {
        self.handle_at(event, Instant::now())
    }

    /// Handle an event which arrived at the given time.
    pub fn handle_at(&mut self, event: NoteEvent, now: Instant) -> ControlAction {
        if event.kind != NoteEventKind::NoteOn {
            return ControlAction::Ignored;
        }
        if event.note == self.tap_note {
            let Some(bpm) = self.tap_tempo.tap(now) else {
                return ControlAction::Ignored;
            };
            match self.tempo.set_bpm(bpm) {
                Ok(()) => {
                    log::info!("new tempo: {bpm:.2} bpm");
                    ControlAction::TempoChanged(bpm)
                }
                Err(err) => {
                    log::warn!("ignoring tapped tempo: {err}");
                    ControlAction::Ignored
                }
            }
        } else if event.note >= self.base_note
            && usize::from(event.note - self.base_note) < self.voice_count
        {
            let voice_index = usize::from(event.note - self.base_note);
            log::info!("note on {} for voice #{voice_index}", event.note);
            ControlAction::VoiceTriggered(voice_index)
        } else {
            ControlAction::Ignored
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Run the given handler on a new thread, feeding it all events from the receiver.
///
/// The thread ends as soon as all senders of the channel got dropped.
pub fn spawn_control_thread(
    mut handler: ControlHandler,
    receiver: Receiver<NoteEvent>,
) -> Result<JoinHandle<()>, Error> {
    let handle = thread::Builder::new()
        .name("grainloop_control".to_string())
        .spawn(move || {
            log::debug!("control thread started");
            while let Ok(event) = receiver.recv() {
                log::trace!("{} {} {}", event.kind, event.note, event.velocity);
                handler.handle(event);
            }
            log::debug!("control thread stopped");
        })?;
    Ok(handle)
}

// -------------------------------------------------------------------------------------------------
