//! Traits implemented by the wrapped plugin.
//!
//! The wrapper owns the port registry and drives an [`Engine`] once per
//! block. An optional [`Editor`] receives transport updates and KVT changes
//! from the idle context.

use crate::kvt_sync::KvtObserver;
use crate::metadata::Direction;
use crate::ports::{Port, PortKind};
use crate::position::Position;
use crate::registry::PortRegistry;

/// Editor size in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Editor rectangle as reported to the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

impl Rect {
    /// Rectangle anchored at the origin.
    pub fn from_size(size: Size) -> Self {
        Self {
            top: 0,
            left: 0,
            bottom: i16::try_from(size.height).unwrap_or(i16::MAX),
            right: i16::try_from(size.width).unwrap_or(i16::MAX),
        }
    }

    pub fn width(&self) -> i32 {
        i32::from(self.right) - i32::from(self.left)
    }

    pub fn height(&self) -> i32 {
        i32::from(self.bottom) - i32::from(self.top)
    }
}

// =============================================================================
// Block
// =============================================================================

/// Audio and port access for one processing block.
///
/// Audio ports are bound to the host buffers by position before the block;
/// [`Block::input`] and [`Block::output`] resolve a port to its buffer.
pub struct Block<'a, 'b> {
    pub ports: &'a mut PortRegistry,
    inputs: &'a [&'b [f32]],
    outputs: &'a mut [&'b mut [f32]],
    samples: usize,
}

impl<'a, 'b> Block<'a, 'b> {
    pub fn new(
        ports: &'a mut PortRegistry,
        inputs: &'a [&'b [f32]],
        outputs: &'a mut [&'b mut [f32]],
        samples: usize,
    ) -> Self {
        Self {
            ports,
            inputs,
            outputs,
            samples,
        }
    }

    /// Number of samples in this block.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Buffer bound to the audio input with the given id.
    pub fn input(&self, id: &str) -> Option<&[f32]> {
        let position = self.binding(id, Direction::Input)?;
        self.inputs.get(position).map(|buf| &buf[..self.samples.min(buf.len())])
    }

    /// Buffer bound to the audio output with the given id.
    pub fn output(&mut self, id: &str) -> Option<&mut [f32]> {
        let position = self.binding(id, Direction::Output)?;
        let samples = self.samples;
        self.outputs.get_mut(position).map(|buf| {
            let len = samples.min(buf.len());
            &mut buf[..len]
        })
    }

    /// Port with the given id.
    pub fn port_mut(&mut self, id: &str) -> Option<&mut Port> {
        let index = self.ports.find_by_id(id)?;
        self.ports.port_mut(index)
    }

    fn binding(&self, id: &str, direction: Direction) -> Option<usize> {
        let index = self.ports.find_by_id(id)?;
        match &self.ports.port(index)?.kind {
            PortKind::Audio(audio) if audio.direction() == direction => audio.binding(),
            _ => None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The wrapped plugin's DSP side.
pub trait Engine: Send {
    /// Current sample rate. Zero or negative until configured.
    fn sample_rate(&self) -> f32;

    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Called once after the port registry is built.
    fn init(&mut self, _ports: &PortRegistry) {}

    /// Called before the wrapper tears down the registry.
    fn destroy(&mut self) {}

    /// Processing is about to start.
    fn activate(&mut self) {}

    /// Processing has stopped.
    fn deactivate(&mut self) {}

    fn ui_active(&self) -> bool;

    fn activate_ui(&mut self);

    fn deactivate_ui(&mut self);

    /// New transport snapshot. Return `true` if the settings must be
    /// refreshed.
    fn set_position(&mut self, _position: &Position) -> bool {
        false
    }

    /// Re-read port values after a change.
    fn update_settings(&mut self, ports: &PortRegistry);

    fn process(&mut self, block: &mut Block<'_, '_>);

    /// Processing latency in samples.
    fn latency(&self) -> f32 {
        0.0
    }
}

// =============================================================================
// Editor
// =============================================================================

/// The plugin UI.
///
/// Receives KVT changes from the sync bridge through [`KvtObserver`].
pub trait Editor: KvtObserver {
    /// Transport snapshot for display.
    fn position_updated(&mut self, _position: &Position) {}

    /// Preferred size when the editor is opened.
    fn size_request(&self) -> Size;

    /// Current geometry, if the editor is realized.
    fn geometry(&self) -> Option<Size> {
        None
    }

    /// The editor has been attached and is about to be shown.
    fn opened(&mut self) {}

    /// The editor is being hidden.
    fn closed(&mut self) {}

    /// Periodic idle call.
    fn idle(&mut self) {}
}
