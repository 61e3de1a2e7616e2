//! MIDI event types and a fixed-capacity event buffer.

/// MIDI event as delivered by the host: a sample offset and up to three raw
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMidiEvent {
    pub delta_frames: i32,
    pub data: [u8; 3],
}

impl RawMidiEvent {
    pub const fn new(delta_frames: i32, data: [u8; 3]) -> Self {
        Self { delta_frames, data }
    }
}

/// Decoded channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, 8192 is center.
    PitchBend { channel: u8, value: u16 },
}

/// Decoded event with its offset inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub sample_offset: u32,
    pub kind: MidiEventKind,
}

impl MidiEvent {
    /// Decode a host event. System messages and malformed data yield `None`.
    pub fn decode(raw: &RawMidiEvent) -> Option<Self> {
        let [status, d1, d2] = raw.data;
        if status & 0x80 == 0 {
            return None;
        }
        let channel = status & 0x0f;
        let (d1, d2) = (d1 & 0x7f, d2 & 0x7f);
        let kind = match status & 0xf0 {
            // Note-on with zero velocity is a note-off.
            0x90 if d2 == 0 => MidiEventKind::NoteOff { channel, note: d1, velocity: 0 },
            0x90 => MidiEventKind::NoteOn { channel, note: d1, velocity: d2 },
            0x80 => MidiEventKind::NoteOff { channel, note: d1, velocity: d2 },
            0xa0 => MidiEventKind::PolyPressure { channel, note: d1, pressure: d2 },
            0xb0 => MidiEventKind::ControlChange { channel, controller: d1, value: d2 },
            0xc0 => MidiEventKind::ProgramChange { channel, program: d1 },
            0xd0 => MidiEventKind::ChannelPressure { channel, pressure: d1 },
            0xe0 => MidiEventKind::PitchBend {
                channel,
                value: u16::from(d1) | (u16::from(d2) << 7),
            },
            _ => return None,
        };
        Some(Self {
            sample_offset: raw.delta_frames.max(0) as u32,
            kind,
        })
    }

    /// Encode back into host form.
    pub fn encode(&self) -> RawMidiEvent {
        let data = match self.kind {
            MidiEventKind::NoteOff { channel, note, velocity } => [0x80 | channel, note, velocity],
            MidiEventKind::NoteOn { channel, note, velocity } => [0x90 | channel, note, velocity],
            MidiEventKind::PolyPressure { channel, note, pressure } => {
                [0xa0 | channel, note, pressure]
            }
            MidiEventKind::ControlChange { channel, controller, value } => {
                [0xb0 | channel, controller, value]
            }
            MidiEventKind::ProgramChange { channel, program } => [0xc0 | channel, program, 0],
            MidiEventKind::ChannelPressure { channel, pressure } => [0xd0 | channel, pressure, 0],
            MidiEventKind::PitchBend { channel, value } => {
                [0xe0 | channel, (value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8]
            }
        };
        RawMidiEvent::new(self.sample_offset as i32, data)
    }
}

/// Pre-allocated MIDI event buffer.
///
/// Pushing past capacity drops the event and sets the overflow flag, which
/// is cleared together with the events.
#[derive(Debug, Clone)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
    capacity: usize,
    overflowed: bool,
}

impl MidiBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Add an event. Returns `false` if the buffer is full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.overflowed = true;
            return false;
        }
        self.events.push(event);
        true
    }

    /// Clear the buffer for reuse. Keeps the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
        self.overflowed = false;
    }

    #[inline]
    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn as_slice(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sort by sample offset, keeping the host order for equal offsets.
    pub fn sort_by_sample_offset(&mut self) {
        self.events.sort_by_key(|e| e.sample_offset);
    }
}
