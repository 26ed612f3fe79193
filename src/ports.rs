//! MIDI port discovery and connection
//!
//! Inbound messages are parsed on midir's callback thread and handed to the
//! event loop through a channel; the binding core itself never leaves the
//! loop thread.

use crate::midi::{format_hex, MidiMessage};
use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection, MidiOutputPort};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

const CLIENT_NAME: &str = "surface-bind";

/// A parsed message from the surface with its arrival time
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub timestamp: Instant,
    pub message: MidiMessage,
}

/// Input and output connection to one control surface
pub struct SurfacePorts {
    input_conn: Option<MidiInputConnection<()>>,
    output_conn: Option<MidiOutputConnection>,
    event_tx: mpsc::Sender<InboundEvent>,
    event_rx: Option<mpsc::Receiver<InboundEvent>>,
    input_port_name: String,
    output_port_name: String,
}

impl SurfacePorts {
    pub fn new(input_port_name: impl Into<String>, output_port_name: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        Self {
            input_conn: None,
            output_conn: None,
            event_tx,
            event_rx: Some(event_rx),
            input_port_name: input_port_name.into(),
            output_port_name: output_port_name.into(),
        }
    }

    pub fn list_input_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new(&format!("{}-scanner", CLIENT_NAME))?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    pub fn list_output_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(&format!("{}-scanner", CLIENT_NAME))?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }

    fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
        midi_in.ports().into_iter().find_map(|port| {
            let name = midi_in.port_name(&port).ok()?;
            matches_port(&name, pattern).then(|| {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                (port, name)
            })
        })
    }

    fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
        midi_out.ports().into_iter().find_map(|port| {
            let name = midi_out.port_name(&port).ok()?;
            matches_port(&name, pattern).then(|| {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                (port, name)
            })
        })
    }

    /// Open both ports; existing connections are closed first
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();

        info!(
            "Connecting to surface - Input: '{}', Output: '{}'",
            self.input_port_name, self.output_port_name
        );

        let midi_in = MidiInput::new(&format!("{}-input", CLIENT_NAME))
            .context("Failed to create MIDI input")?;
        let (in_port, port_name) = Self::find_input_port(&midi_in, &self.input_port_name)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", self.input_port_name))?;

        info!("Connecting to input port: {}", port_name);

        let event_tx = self.event_tx.clone();
        let input_conn = midi_in
            .connect(
                &in_port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    let timestamp = Instant::now();
                    match MidiMessage::parse(data) {
                        Some(message) => {
                            // Never block the driver thread
                            let _ = event_tx.try_send(InboundEvent { timestamp, message });
                        }
                        None => trace!("Failed to parse MIDI: {}", format_hex(data)),
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to input port: {}", e))?;
        self.input_conn = Some(input_conn);

        let midi_out = MidiOutput::new(&format!("{}-output", CLIENT_NAME))
            .context("Failed to create MIDI output")?;
        let (out_port, port_name) = Self::find_output_port(&midi_out, &self.output_port_name)
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", self.output_port_name))?;

        info!("Connecting to output port: {}", port_name);

        let output_conn = midi_out
            .connect(&out_port, CLIENT_NAME)
            .map_err(|e| anyhow::anyhow!("Failed to connect to output port: {}", e))?;
        self.output_conn = Some(output_conn);

        info!("Surface connected");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        let had_input = self.input_conn.take().is_some();
        let had_output = self.output_conn.take().is_some();
        if had_input || had_output {
            info!("Surface disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.input_conn.is_some() && self.output_conn.is_some()
    }

    pub fn send(&mut self, message: &MidiMessage) -> Result<()> {
        let output = self
            .output_conn
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected to output port"))?;

        let data = message.encode();
        output.send(&data).context("Failed to send MIDI message")?;

        trace!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }

    /// Take the inbound event receiver (once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<InboundEvent>> {
        self.event_rx.take()
    }

    /// Print all ports to stdout
    pub fn print_ports() {
        use colored::*;

        println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

        for (title, ports) in [
            ("Input Ports:", Self::list_input_ports()),
            ("Output Ports:", Self::list_output_ports()),
        ] {
            println!("\n{}", title.bold());
            match ports {
                Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
                Ok(ports) => {
                    for (i, name) in ports.iter().enumerate() {
                        println!("  {} {}", format!("[{}]", i).yellow(), name);
                    }
                }
                Err(e) => println!("  {}", format!("Cannot list ports: {}", e).red()),
            }
        }
        println!();
    }
}

/// Case-insensitive substring match
fn matches_port(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_pattern_matching() {
        assert!(matches_port("CMD DC-1 MIDI 1", "dc-1"));
        assert!(matches_port("X-Touch", "X-TOUCH"));
        assert!(!matches_port("X-Touch", "DC-1"));
    }

    #[test]
    fn test_receiver_taken_once() {
        let mut ports = SurfacePorts::new("in", "out");
        assert!(!ports.is_connected());
        assert!(ports.take_event_receiver().is_some());
        assert!(ports.take_event_receiver().is_none());
        assert!(ports.send(&MidiMessage::ProgramChange { channel: 0, program: 1 }).is_err());
    }
}
