//! MIDI keyboard input, which feeds decoded note events into a control channel.

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};

use super::NoteEvent;
use crate::Error;

// -------------------------------------------------------------------------------------------------

const CLIENT_NAME: &str = "grainloop";

// -------------------------------------------------------------------------------------------------

/// An open connection to a MIDI input port.
///
/// Incoming channel voice messages get decoded with [`NoteEvent::from_midi`] and are sent to
/// the given channel, usually the receiver of a
/// [`spawn_control_thread`](super::spawn_control_thread). All other messages are ignored.
/// The connection stays open until the input gets closed or dropped.
pub struct MidiControlInput {
    connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiControlInput {
    /// Port name which gets preferred when no port is requested explicitly.
    pub const DEFAULT_PORT_NAME: &'static str = "USB MIDI keyboard";

    /// Names of all available MIDI input ports.
    pub fn port_names() -> Result<Vec<String>, Error> {
        let input = MidiInput::new(CLIENT_NAME)?;
        Ok(input
            .ports()
            .iter()
            .filter_map(|port| input.port_name(port).ok())
            .collect())
    }

    /// Open the requested MIDI input port, falling back to the first available port when the
    /// requested port does not exist. Without a requested port name, [`Self::DEFAULT_PORT_NAME`]
    /// is preferred.
    ///
    /// Returns Error::InputDeviceError when no port is available or the connection failed.
    pub fn open(port_name: Option<&str>, sender: Sender<NoteEvent>) -> Result<Self, Error> {
        let mut input = MidiInput::new(CLIENT_NAME)?;
        input.ignore(midir::Ignore::All);

        let ports = input.ports();
        let names = ports
            .iter()
            .map(|port| input.port_name(port).unwrap_or_default())
            .collect::<Vec<_>>();
        let index = select_port(&names, port_name).ok_or_else(|| {
            Error::InputDeviceError("no MIDI input ports found".into())
        })?;
        if let Some(requested) = port_name {
            if !names[index].to_lowercase().contains(&requested.to_lowercase()) {
                log::warn!(
                    "MIDI input port '{requested}' not found, opening '{}' instead",
                    names[index]
                );
            }
        }

        let port_name = names[index].clone();
        let connection = input
            .connect(
                &ports[index],
                CLIENT_NAME,
                move |_timestamp, message, _| {
                    forward_message(message, &sender);
                },
                (),
            )
            .map_err(|err| Error::InputDeviceError(err.to_string().into()))?;

        log::info!("opened MIDI input port '{port_name}'");
        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Name of the connected port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the connection. Pending events which already got sent stay in the channel.
    pub fn close(self) {
        let _ = self.connection.close();
        log::info!("closed MIDI input port '{}'", self.port_name);
    }
}

// -------------------------------------------------------------------------------------------------

/// Decode a raw MIDI message and send it to the control channel, when it's a note event.
/// Returns true when an event got sent.
fn forward_message(message: &[u8], sender: &Sender<NoteEvent>) -> bool {
    let Some(event) = NoteEvent::from_midi(message) else {
        return false;
    };
    match sender.try_send(event) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("failed to forward MIDI event: {err}");
            false
        }
    }
}

/// Pick a port index from the available port names: an exact match of the requested (or the
/// default) name wins, then a case insensitive partial match, then the first port.
pub(crate) fn select_port<S: AsRef<str>>(names: &[S], requested: Option<&str>) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let wanted = requested.unwrap_or(MidiControlInput::DEFAULT_PORT_NAME);
    let wanted_lowercase = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.as_ref() == wanted)
        .or_else(|| {
            names
                .iter()
                .position(|name| name.as_ref().to_lowercase().contains(&wanted_lowercase))
        })
        .or(Some(0))
}

// -------------------------------------------------------------------------------------------------

impl From<midir::InitError> for Error {
    fn from(err: midir::InitError) -> Error {
        Error::InputDeviceError(err.to_string().into())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_selection() {
        let no_ports: [&str; 0] = [];
        assert_eq!(select_port(&no_ports, None), None);
        assert_eq!(select_port(&no_ports, Some("Keys")), None);

        let names = [
            "Midi Through:Midi Through Port-0 14:0",
            "USB MIDI keyboard:USB MIDI keyboard MIDI 1 20:0",
            "Keys",
        ];
        // default port name
        assert_eq!(select_port(&names, None), Some(1));
        // exact and partial matches
        assert_eq!(select_port(&names, Some("Keys")), Some(2));
        assert_eq!(select_port(&names, Some("midi through")), Some(0));
        // unknown ports fall back to the first one
        assert_eq!(select_port(&names, Some("Launchpad")), Some(0));
        assert_eq!(select_port(&["Launchpad", "Keys"], None), Some(0));
    }

    #[test]
    fn forward_note_messages() {
        let (sender, receiver) = crossbeam_channel::bounded(2);
        assert!(forward_message(&[0x90, 48, 100], &sender));
        assert!(!forward_message(&[0xB0, 7, 127], &sender));
        assert!(!forward_message(&[0xF8], &sender));
        assert!(forward_message(&[0x81, 60, 0], &sender));
        // full channels drop events
        assert!(!forward_message(&[0x90, 61, 100], &sender));
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![NoteEvent::note_on(48, 100), NoteEvent::note_off(60)]
        );
        drop(receiver);
        assert!(!forward_message(&[0x90, 62, 100], &sender));
    }
}
