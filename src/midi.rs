//! MIDI message types and control identifiers
//!
//! The binding core only consumes already-decoded `(kind, channel, number,
//! value)` triples. Wire parsing and encoding live here so the binary can
//! translate between raw port bytes and those triples.

use crate::error::{ensure_in_range, Result};
use std::fmt;

/// Message kinds the dispatcher routes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// Note On/Off (buttons, pads, encoder clicks)
    Note,
    /// Control Change (faders, encoders, touch sensors)
    ControlChange,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Note => write!(f, "note"),
            MessageKind::ControlChange => write!(f, "cc"),
        }
    }
}

/// Uniquely addresses one physical control element: (kind, channel, number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlIdentifier {
    pub kind: MessageKind,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Note or CC number (0-127)
    pub number: u8,
}

impl ControlIdentifier {
    /// Create an identifier, validating channel and number ranges
    pub fn new(kind: MessageKind, channel: u8, number: u8) -> Result<Self> {
        ensure_in_range(channel, 0, 15, "channel")?;
        ensure_in_range(number, 0, 127, "number")?;
        Ok(Self {
            kind,
            channel,
            number,
        })
    }

    pub fn note(channel: u8, note: u8) -> Result<Self> {
        Self::new(MessageKind::Note, channel, note)
    }

    pub fn cc(channel: u8, cc: u8) -> Result<Self> {
        Self::new(MessageKind::ControlChange, channel, cc)
    }
}

impl fmt::Display for ControlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ch:{} #{}", self.kind, self.channel + 1, self.number)
    }
}

/// A decoded inbound hardware message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub channel: u8,
    pub number: u8,
    pub value: u8,
}

/// An outbound feedback message: LED velocity/color or fader position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackMessage {
    pub target: ControlIdentifier,
    pub value: u8,
}

impl FeedbackMessage {
    /// Wire representation (notes are always sent as Note On, even for 0)
    pub fn to_midi(&self) -> MidiMessage {
        let ControlIdentifier {
            kind,
            channel,
            number,
        } = self.target;
        match kind {
            MessageKind::Note => MidiMessage::NoteOn {
                channel,
                note: number,
                velocity: self.value,
            },
            MessageKind::ControlChange => MidiMessage::ControlChange {
                channel,
                cc: number,
                value: self.value,
            },
        }
    }
}

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive payload without the F0/F7 framing
    SysEx { data: Vec<u8> },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status is not supported
        if status < 0x80 {
            return None;
        }

        if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx {
                data: data[1..end].to_vec(),
            });
        }
        if status >= 0xF0 {
            return None;
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiMessage::NoteOff {
                    channel,
                    note: data[1] & 0x7F,
                    velocity: data[2] & 0x7F,
                })
            }
            0x90 => {
                if data.len() < 3 {
                    return None;
                }
                let note = data[1] & 0x7F;
                let velocity = data[2] & 0x7F;

                // Note On with velocity 0 is a Note Off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiMessage::ControlChange {
                    channel,
                    cc: data[1] & 0x7F,
                    value: data[2] & 0x7F,
                })
            }
            0xC0 => {
                if data.len() < 2 {
                    return None;
                }
                Some(MidiMessage::ProgramChange {
                    channel,
                    program: data[1] & 0x7F,
                })
            }
            0xE0 => {
                if data.len() < 3 {
                    return None;
                }
                let lsb = (data[1] & 0x7F) as u16;
                let msb = (data[2] & 0x7F) as u16;
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = Vec::with_capacity(data.len() + 2);
                result.push(0xF0);
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
        }
    }

    /// Convert to the triple the dispatcher consumes (notes and CCs only)
    pub fn as_inbound(&self) -> Option<InboundMessage> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => Some(InboundMessage {
                kind: MessageKind::Note,
                channel,
                number: note,
                value: velocity,
            }),
            MidiMessage::NoteOff { channel, note, .. } => Some(InboundMessage {
                kind: MessageKind::Note,
                channel,
                number: note,
                value: 0,
            }),
            MidiMessage::ControlChange { channel, cc, value } => Some(InboundMessage {
                kind: MessageKind::ControlChange,
                channel,
                number: cc,
                value,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => write!(f, "SysEx {} bytes", data.len()),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
