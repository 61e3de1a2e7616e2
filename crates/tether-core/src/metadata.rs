//! Declarative port metadata.
//!
//! Plugins describe their ports with a static table of [`PortMeta`] entries.
//! The wrapper walks that table once at initialization and turns every entry
//! into a concrete port. Port groups ([`Role::PortGroup`]) are templates: each
//! member is cloned once per row with a row postfix appended to its id.
//!
//! # Example
//!
//! ```ignore
//! use tether_core::metadata::{PortMeta, Direction};
//!
//! static BAND: [PortMeta; 2] = [
//!     PortMeta::control("freq").with_range(20.0, 20000.0).growing(),
//!     PortMeta::control("gain").with_range(-24.0, 24.0),
//! ];
//!
//! static PORTS: [PortMeta; 3] = [
//!     PortMeta::audio("in_l", Direction::Input),
//!     PortMeta::audio("out_l", Direction::Output),
//!     PortMeta::port_group("band", 8, &BAND),
//! ];
//! ```

use std::borrow::Cow;

/// Role of a port. Determines which concrete port the factory creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Audio buffer bound by position each block.
    Audio,
    /// Numeric control. Input controls are automatable, outputs are meters.
    Control,
    /// Numeric readback.
    Meter,
    /// MIDI event stream.
    Midi,
    /// File system path.
    Path,
    /// Multi-buffer graph data.
    Mesh,
    /// Row-based frame buffer data.
    FrameBuffer,
    /// Template expanded into rows of member ports.
    PortGroup,
    /// Role not understood by this wrapper. The factory skips it.
    Unknown(u32),
}

/// Port direction as seen from the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// How a group member's start value is interpolated across rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RowScale {
    /// Start value is left as declared.
    #[default]
    None,
    /// `min + (max - min) * row / rows`
    Growing,
    /// `max - (max - min) * row / rows`
    Lowering,
}

/// Metadata describing a single port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortMeta {
    /// Stable string identifier, unique within the plugin.
    pub id: Cow<'static, str>,
    pub role: Role,
    pub direction: Direction,
    pub min: f32,
    pub max: f32,
    /// Initial value in natural units.
    pub start: f32,
    pub step: f32,
    pub scale: RowScale,
    /// Number of rows for a port group. Zero for every other role.
    pub rows: usize,
    /// Member template for a port group.
    pub members: &'static [PortMeta],
    /// Whether the port value is written to the persisted state.
    pub serializable: bool,
}

impl PortMeta {
    /// Create metadata with neutral defaults.
    pub const fn new(id: &'static str, role: Role, direction: Direction) -> Self {
        Self {
            id: Cow::Borrowed(id),
            role,
            direction,
            min: 0.0,
            max: 1.0,
            start: 0.0,
            step: 0.0,
            scale: RowScale::None,
            rows: 0,
            members: &[],
            serializable: false,
        }
    }

    /// Audio port.
    pub const fn audio(id: &'static str, direction: Direction) -> Self {
        Self::new(id, Role::Audio, direction)
    }

    /// Automatable input control, persisted in state.
    pub const fn control(id: &'static str) -> Self {
        Self::new(id, Role::Control, Direction::Input).persistent()
    }

    /// Output meter.
    pub const fn meter(id: &'static str) -> Self {
        Self::new(id, Role::Meter, Direction::Output)
    }

    /// MIDI port.
    pub const fn midi(id: &'static str, direction: Direction) -> Self {
        Self::new(id, Role::Midi, direction)
    }

    /// Input path, persisted in state.
    pub const fn path(id: &'static str) -> Self {
        Self::new(id, Role::Path, Direction::Input).persistent()
    }

    /// Output mesh.
    pub const fn mesh(id: &'static str) -> Self {
        Self::new(id, Role::Mesh, Direction::Output)
    }

    /// Output frame buffer.
    pub const fn frame_buffer(id: &'static str) -> Self {
        Self::new(id, Role::FrameBuffer, Direction::Output)
    }

    /// Port group expanded into `rows` copies of `members`.
    pub const fn port_group(id: &'static str, rows: usize, members: &'static [PortMeta]) -> Self {
        let mut meta = Self::new(id, Role::PortGroup, Direction::Input);
        meta.rows = rows;
        meta.members = members;
        meta
    }

    /// Set the value range.
    pub const fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the initial value.
    pub const fn with_start(mut self, start: f32) -> Self {
        self.start = start;
        self
    }

    /// Set the step size (0 = continuous).
    pub const fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Set the port direction.
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Mark the start value as growing across group rows.
    pub const fn growing(mut self) -> Self {
        self.scale = RowScale::Growing;
        self
    }

    /// Mark the start value as lowering across group rows.
    pub const fn lowering(mut self) -> Self {
        self.scale = RowScale::Lowering;
        self
    }

    /// Include the port in persisted state.
    pub const fn persistent(mut self) -> Self {
        self.serializable = true;
        self
    }

    /// Exclude the port from persisted state.
    pub const fn transient(mut self) -> Self {
        self.serializable = false;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// Clone this declaration for a group row.
    ///
    /// The postfix is appended to the id and the start value is interpolated
    /// according to [`RowScale`].
    pub fn for_row(&self, postfix: &str, row: usize, rows: usize) -> PortMeta {
        let mut meta = self.clone();
        meta.id = Cow::Owned(format!("{}{}", self.id, postfix));
        if rows > 0 {
            let delta = (self.max - self.min) * row as f32 / rows as f32;
            match self.scale {
                RowScale::Growing => meta.start = self.min + delta,
                RowScale::Lowering => meta.start = self.max - delta,
                RowScale::None => {}
            }
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let meta = PortMeta::control("gain").with_range(-60.0, 12.0).with_start(0.0);
        assert_eq!(meta.id, "gain");
        assert_eq!(meta.role, Role::Control);
        assert!(meta.is_input());
        assert!(meta.serializable);
        assert_eq!(meta.min, -60.0);

        let meter = PortMeta::meter("level");
        assert!(meter.is_output());
        assert!(!meter.serializable);
    }

    #[test]
    fn test_for_row_growing() {
        let meta = PortMeta::control("f").with_range(0.0, 100.0).growing();
        let starts: Vec<f32> = (0..4).map(|row| meta.for_row("_x", row, 4).start).collect();
        assert_eq!(starts, vec![0.0, 25.0, 50.0, 75.0]);
        assert_eq!(meta.for_row("_2", 2, 4).id, "f_2");
    }

    #[test]
    fn test_for_row_lowering() {
        let meta = PortMeta::control("f").with_range(0.0, 100.0).lowering();
        let starts: Vec<f32> = (0..4).map(|row| meta.for_row("", row, 4).start).collect();
        assert_eq!(starts, vec![100.0, 75.0, 50.0, 25.0]);
    }

    #[test]
    fn test_for_row_keeps_start() {
        let meta = PortMeta::control("f").with_range(0.0, 100.0).with_start(42.0);
        assert_eq!(meta.for_row("_1", 1, 4).start, 42.0);
    }
}
