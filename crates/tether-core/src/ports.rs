//! Concrete ports.
//!
//! [`Port`] is a closed set of roles. Every capability the wrapper needs
//! (binding, pre/post-processing, state payloads) is dispatched by matching on
//! [`PortKind`], so adding a role is a compile-time checked change.
//!
//! # State payloads
//!
//! | Role      | v2 payload               | v1 (legacy) payload        |
//! |-----------|--------------------------|----------------------------|
//! | parameter | `f32` BE, exactly 4 bytes | `f32` BE, consumes 4 bytes |
//! | path      | UTF-8, NUL-terminated    | `len: u8` + UTF-8          |
//!
//! Other roles are not serializable.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::metadata::{Direction, PortMeta};
use crate::midi::{MidiBuffer, MidiEvent, RawMidiEvent};
use crate::registry::MetaId;

/// Longest path a port accepts.
pub const MAX_PATH_BYTES: usize = 4096;

// =============================================================================
// Audio
// =============================================================================

/// Audio port bound to a host buffer by position.
#[derive(Debug, Clone)]
pub struct AudioPort {
    direction: Direction,
    binding: Option<usize>,
    samples: usize,
}

impl AudioPort {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            binding: None,
            samples: 0,
        }
    }

    /// Attach the port to the host buffer at `position` for this block.
    pub fn bind(&mut self, position: usize, samples: usize) {
        self.binding = Some(position);
        self.samples = samples;
    }

    pub fn unbind(&mut self) {
        self.binding = None;
        self.samples = 0;
    }

    /// Host buffer position, if bound.
    pub fn binding(&self) -> Option<usize> {
        self.binding
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// Automatable input control.
#[derive(Debug, Clone)]
pub struct ParameterPort {
    index: usize,
    min: f32,
    max: f32,
    step: f32,
    value: f32,
    changed: bool,
}

impl ParameterPort {
    fn new(meta: &PortMeta) -> Self {
        let mut port = Self {
            index: 0,
            min: meta.min,
            max: meta.max,
            step: meta.step,
            value: 0.0,
            changed: true,
        };
        port.value = port.limit(meta.start);
        port
    }

    /// Dense index in the host parameter list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    fn limit(&self, value: f32) -> f32 {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let value = if self.step > 0.0 {
            self.min + ((value - self.min) / self.step).round() * self.step
        } else {
            value
        };
        value.clamp(lo, hi)
    }

    /// Set the value in natural units. Marks the port changed if it differs.
    pub fn set_value(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        let value = self.limit(value);
        if value != self.value {
            self.value = value;
            self.changed = true;
        }
    }

    /// Value mapped to `[0, 1]`.
    pub fn normalized(&self) -> f32 {
        let span = self.max - self.min;
        if span == 0.0 {
            0.0
        } else {
            (self.value - self.min) / span
        }
    }

    pub fn set_normalized(&mut self, normalized: f32) {
        let normalized = normalized.clamp(0.0, 1.0);
        self.set_value(self.min + (self.max - self.min) * normalized);
    }
}

// =============================================================================
// Meter
// =============================================================================

/// Output control read back by the host or UI.
#[derive(Debug, Clone)]
pub struct MeterPort {
    value: f32,
}

impl MeterPort {
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set(&mut self, value: f32) {
        self.value = value;
    }
}

// =============================================================================
// MIDI
// =============================================================================

/// Receives the host event batch and keeps the decoded events for one block.
#[derive(Debug, Clone)]
pub struct MidiInputPort {
    events: MidiBuffer,
}

impl MidiInputPort {
    /// Decode a host event batch. Undecodable events are dropped.
    pub fn deserialize(&mut self, events: &[RawMidiEvent]) {
        for raw in events {
            if let Some(event) = MidiEvent::decode(raw) {
                if !self.events.push(event) {
                    break;
                }
            }
        }
        self.events.sort_by_sample_offset();
    }

    pub fn events(&self) -> &[MidiEvent] {
        self.events.as_slice()
    }

    pub fn has_overflowed(&self) -> bool {
        self.events.has_overflowed()
    }
}

/// Collects events produced by the engine and hands them to the host.
#[derive(Debug, Clone)]
pub struct MidiOutputPort {
    queue: MidiBuffer,
    sent: Vec<RawMidiEvent>,
}

impl MidiOutputPort {
    pub fn push(&mut self, event: MidiEvent) -> bool {
        self.queue.push(event)
    }

    /// Events flushed at the end of the last block.
    pub fn sent(&self) -> &[RawMidiEvent] {
        &self.sent
    }
}

// =============================================================================
// Path
// =============================================================================

/// File system path selected by the user.
#[derive(Debug, Clone, Default)]
pub struct PathPort {
    path: String,
    request: Option<String>,
    changed: bool,
}

impl PathPort {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request a new path. Applied at the next block boundary.
    pub fn submit(&mut self, path: &str) {
        self.request = Some(truncate_utf8(path, MAX_PATH_BYTES).to_owned());
    }

    fn apply(&mut self, path: &str) {
        self.path = truncate_utf8(path, MAX_PATH_BYTES).to_owned();
        self.request = None;
        self.changed = true;
    }
}

// =============================================================================
// Mesh / frame buffer
// =============================================================================

/// Graph data produced by the engine for the UI.
#[derive(Debug, Clone, Default)]
pub struct MeshPort {
    buffers: Vec<Vec<f32>>,
    ready: bool,
}

impl MeshPort {
    /// Replace the mesh contents and mark it ready for the UI.
    pub fn publish(&mut self, buffers: Vec<Vec<f32>>) {
        self.buffers = buffers;
        self.ready = true;
    }

    /// Take the mesh if the engine published one since the last call.
    pub fn take(&mut self) -> Option<&[Vec<f32>]> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        Some(&self.buffers)
    }
}

/// Rolling row-based buffer (spectrograms and the like).
#[derive(Debug, Clone, Default)]
pub struct FrameBufferPort {
    rows: Vec<Vec<f32>>,
    capacity: usize,
    row_id: u32,
}

impl FrameBufferPort {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
            row_id: 0,
        }
    }

    /// Append a row, evicting the oldest when full.
    pub fn write_row(&mut self, row: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        if self.rows.len() == self.capacity {
            self.rows.remove(0);
        }
        self.rows.push(row.to_vec());
        self.row_id = self.row_id.wrapping_add(1);
    }

    /// Serial number of the last written row.
    pub fn row_id(&self) -> u32 {
        self.row_id
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }
}

// =============================================================================
// Port
// =============================================================================

/// Role-specific state of a port.
#[derive(Debug, Clone)]
pub enum PortKind {
    Audio(AudioPort),
    Parameter(ParameterPort),
    Meter(MeterPort),
    MidiInput(MidiInputPort),
    MidiOutput(MidiOutputPort),
    Path(PathPort),
    Mesh(MeshPort),
    FrameBuffer(FrameBufferPort),
    /// Expanded template. Owns no value.
    Group { rows: usize },
}

/// A concrete port created from metadata.
#[derive(Debug, Clone)]
pub struct Port {
    meta: MetaId,
    serializable: bool,
    pub kind: PortKind,
}

/// Rows kept by frame buffer ports.
const FRAME_BUFFER_ROWS: usize = 64;

impl Port {
    pub(crate) fn audio(meta: MetaId, direction: Direction) -> Self {
        Self::with_kind(meta, PortKind::Audio(AudioPort::new(direction)))
    }

    pub(crate) fn parameter(meta: MetaId, decl: &PortMeta) -> Self {
        let mut port = Self::with_kind(meta, PortKind::Parameter(ParameterPort::new(decl)));
        port.serializable = decl.serializable;
        port
    }

    pub(crate) fn meter(meta: MetaId, decl: &PortMeta) -> Self {
        Self::with_kind(meta, PortKind::Meter(MeterPort { value: decl.start }))
    }

    pub(crate) fn midi_input(meta: MetaId, capacity: usize) -> Self {
        Self::with_kind(
            meta,
            PortKind::MidiInput(MidiInputPort {
                events: MidiBuffer::with_capacity(capacity),
            }),
        )
    }

    pub(crate) fn midi_output(meta: MetaId, capacity: usize) -> Self {
        Self::with_kind(
            meta,
            PortKind::MidiOutput(MidiOutputPort {
                queue: MidiBuffer::with_capacity(capacity),
                sent: Vec::with_capacity(capacity),
            }),
        )
    }

    pub(crate) fn path(meta: MetaId, decl: &PortMeta) -> Self {
        let mut port = Self::with_kind(meta, PortKind::Path(PathPort::default()));
        port.serializable = decl.serializable;
        port
    }

    pub(crate) fn mesh(meta: MetaId) -> Self {
        Self::with_kind(meta, PortKind::Mesh(MeshPort::default()))
    }

    pub(crate) fn frame_buffer(meta: MetaId) -> Self {
        Self::with_kind(
            meta,
            PortKind::FrameBuffer(FrameBufferPort::with_capacity(FRAME_BUFFER_ROWS)),
        )
    }

    pub(crate) fn group(meta: MetaId, rows: usize) -> Self {
        Self::with_kind(meta, PortKind::Group { rows })
    }

    fn with_kind(meta: MetaId, kind: PortKind) -> Self {
        Self {
            meta,
            serializable: false,
            kind,
        }
    }

    /// Handle of this port's metadata in the registry arena.
    pub fn meta_id(&self) -> MetaId {
        self.meta
    }

    /// Whether the port value is written to persisted state.
    pub fn serializable(&self) -> bool {
        self.serializable
    }

    /// Apply pending changes before the block. Returns `true` if the engine
    /// settings must be refreshed.
    pub fn pre_process(&mut self, _samples: usize) -> bool {
        match &mut self.kind {
            PortKind::Parameter(p) => std::mem::take(&mut p.changed),
            PortKind::Path(p) => {
                if let Some(request) = p.request.take() {
                    p.apply(&request);
                }
                std::mem::take(&mut p.changed)
            }
            PortKind::MidiOutput(p) => {
                p.sent.clear();
                false
            }
            PortKind::Audio(_)
            | PortKind::Meter(_)
            | PortKind::MidiInput(_)
            | PortKind::Mesh(_)
            | PortKind::FrameBuffer(_)
            | PortKind::Group { .. } => false,
        }
    }

    /// Flush per-block state after processing.
    pub fn post_process(&mut self, _samples: usize) {
        match &mut self.kind {
            PortKind::Audio(p) => p.unbind(),
            PortKind::MidiInput(p) => p.events.clear(),
            PortKind::MidiOutput(p) => {
                p.sent.extend(p.queue.as_slice().iter().map(MidiEvent::encode));
                p.queue.clear();
            }
            PortKind::Parameter(_)
            | PortKind::Meter(_)
            | PortKind::Path(_)
            | PortKind::Mesh(_)
            | PortKind::FrameBuffer(_)
            | PortKind::Group { .. } => {}
        }
    }

    /// Append the v2 state payload.
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match &self.kind {
            PortKind::Parameter(p) => out.write_f32::<BigEndian>(p.value),
            PortKind::Path(p) => {
                out.write_all(p.path.as_bytes())?;
                out.write_u8(0)
            }
            _ => Ok(()),
        }
    }

    /// Decode a legacy payload from the front of `data`.
    ///
    /// Returns the number of bytes consumed, or `None` if the payload is
    /// truncated or the port has no legacy encoding.
    pub fn deserialize_v1(&mut self, data: &[u8]) -> Option<usize> {
        match &mut self.kind {
            PortKind::Parameter(p) => {
                let bytes = data.get(..4)?;
                p.set_value(BigEndian::read_f32(bytes));
                p.changed = true;
                Some(4)
            }
            PortKind::Path(p) => {
                let len = usize::from(*data.first()?);
                let bytes = data.get(1..1 + len)?;
                p.apply(&String::from_utf8_lossy(bytes));
                Some(1 + len)
            }
            _ => None,
        }
    }

    /// Decode a v2 payload occupying all of `data`.
    pub fn deserialize_v2(&mut self, data: &[u8]) -> bool {
        match &mut self.kind {
            PortKind::Parameter(p) => {
                if data.len() != 4 {
                    return false;
                }
                let value = BigEndian::read_f32(data);
                if value.is_nan() {
                    return false;
                }
                p.set_value(value);
                p.changed = true;
                true
            }
            PortKind::Path(p) => {
                let Some(end) = data.iter().position(|&b| b == 0) else {
                    return false;
                };
                match std::str::from_utf8(&data[..end]) {
                    Ok(path) => {
                        p.apply(path);
                        true
                    }
                    Err(_) => false,
                }
            }
            _ => false,
        }
    }

    pub fn as_audio_mut(&mut self) -> Option<&mut AudioPort> {
        match &mut self.kind {
            PortKind::Audio(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParameterPort> {
        match &self.kind {
            PortKind::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_parameter_mut(&mut self) -> Option<&mut ParameterPort> {
        match &mut self.kind {
            PortKind::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_meter_mut(&mut self) -> Option<&mut MeterPort> {
        match &mut self.kind {
            PortKind::Meter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_midi_input_mut(&mut self) -> Option<&mut MidiInputPort> {
        match &mut self.kind {
            PortKind::MidiInput(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_midi_output_mut(&mut self) -> Option<&mut MidiOutputPort> {
        match &mut self.kind {
            PortKind::MidiOutput(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathPort> {
        match &self.kind {
            PortKind::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_path_mut(&mut self) -> Option<&mut PathPort> {
        match &mut self.kind {
            PortKind::Path(p) => Some(p),
            _ => None,
        }
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
