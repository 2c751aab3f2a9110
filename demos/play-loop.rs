//! Plays granular loops on the default audio device, or renders them into a wav file.
//!
//! Type "tap" on stdin to tap the tempo, a number to set the tempo in bpm, "voice N" to
//! trigger a voice or "quit" to stop playback. Notes from a MIDI keyboard do the same: C3
//! taps the tempo, C4 and up trigger voices.

use std::{
    io::{self, BufRead},
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;

use grainloop::{
    outputs::{render_to_wav, CpalOutput},
    spawn_control_thread, ControlHandler, Engine, EngineOptions, Error, MidiControlInput,
    NoteEvent, TempoHandle, Voice,
};

// -------------------------------------------------------------------------------------------------

// Common demo code
#[path = "./common/arguments.rs"]
mod arguments;

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_DURATION_SECS: u64 = 10;
const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const MAX_PENDING_EVENTS: usize = 64;

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = arguments::parse();

    if args.list_midi_ports {
        for name in MidiControlInput::port_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    // Create the engine and add one voice per sample file
    let mut engine = Engine::new(EngineOptions::default().bpm(args.bpm.unwrap_or(120.0)))?;
    let voice_options = args.voice_options()?;
    for path in args.sample_paths() {
        engine.add_voice(Voice::from_file(&path, voice_options, engine.sample_rate())?)?;
    }

    // Render into a file, when an output path is given
    if let Some(output_path) = &args.output_path {
        let duration = Duration::from_secs(args.duration.unwrap_or(DEFAULT_DURATION_SECS));
        render_to_wav(&mut engine, output_path, duration)?;
        println!("Rendered {} into '{}'", engine.status(), output_path.display());
        return Ok(());
    }

    let tempo = engine.tempo_handle();
    let status = engine.status_handle();

    // Feed note events from a MIDI port and stdin into a control thread
    let (event_sender, event_receiver) = crossbeam_channel::bounded(MAX_PENDING_EVENTS);
    let handler = ControlHandler::new(tempo.clone(), engine.voice_count());
    let control_thread = spawn_control_thread(handler, event_receiver)?;
    let midi_input = match MidiControlInput::open(args.midi_port.as_deref(), event_sender.clone())
    {
        Ok(midi_input) => Some(midi_input),
        Err(err) => {
            log::warn!("MIDI input is not available: {err}");
            None
        }
    };
    let input_thread = thread::spawn(move || read_commands(event_sender, tempo));

    // Start playing
    let output = CpalOutput::open(engine)?;
    log::info!(
        "playing on {} channel(s) at {}Hz",
        output.channel_count(),
        output.sample_rate()
    );
    println!("Playing. Type \"tap\", a bpm value, \"voice N\" or \"quit\"...");

    while !input_thread.is_finished() {
        thread::sleep(STATUS_INTERVAL);
        log::info!("{}", status.status());
    }

    log::info!(
        "stopping after {:.1} seconds of output",
        output.sample_position() as f64 / output.sample_rate() as f64
    );
    if let Some(midi_input) = midi_input {
        midi_input.close();
    }
    output.close();
    let _ = input_thread.join();
    let _ = control_thread.join();
    Ok(())
}

// -------------------------------------------------------------------------------------------------

// Read commands from stdin until "quit" or end of input.
fn read_commands(event_sender: Sender<NoteEvent>, tempo: TempoHandle) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let mut words = line.split_whitespace();
        let result = match (words.next(), words.next()) {
            (Some("quit" | "q"), _) => break,
            (Some("tap" | "t"), _) => {
                event_sender.send(NoteEvent::note_on(ControlHandler::DEFAULT_TAP_NOTE, 100))
            }
            (Some("voice" | "v"), Some(index)) => match index.parse::<u8>() {
                Ok(index) => event_sender.send(NoteEvent::note_on(
                    ControlHandler::DEFAULT_BASE_NOTE.saturating_add(index),
                    100,
                )),
                Err(_) => {
                    println!("Invalid voice index: '{index}'");
                    Ok(())
                }
            },
            (Some(value), None) => {
                match value.parse::<f64>() {
                    Ok(bpm) => {
                        if let Err(err) = tempo.set_bpm(bpm) {
                            println!("{err}");
                        }
                    }
                    Err(_) => println!("Unknown command: '{value}'"),
                }
                Ok(())
            }
            _ => Ok(()),
        };
        if result.is_err() {
            log::error!("control thread is gone");
            break;
        }
    }
}
