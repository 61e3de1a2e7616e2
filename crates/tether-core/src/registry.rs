//! Port registry and factory.
//!
//! [`PortRegistry::build`] walks a declarative metadata table and creates one
//! concrete [`Port`] per entry, expanding port groups into rows of generated
//! ports. All metadata, declared and generated, lives in the registry's arena
//! and ports refer to it by [`MetaId`].

use std::collections::HashMap;

use log::{debug, warn};

use crate::metadata::{PortMeta, Role};
use crate::ports::{ParameterPort, Port, PortKind};

/// Handle of a metadata entry in the registry arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaId(u32);

impl MetaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns every metadata entry referenced by the registry's ports.
#[derive(Debug, Default)]
pub struct MetaArena {
    entries: Vec<PortMeta>,
    generated: usize,
}

impl MetaArena {
    fn alloc(&mut self, meta: PortMeta, generated: bool) -> MetaId {
        let id = MetaId(self.entries.len() as u32);
        self.entries.push(meta);
        if generated {
            self.generated += 1;
        }
        id
    }

    pub fn get(&self, id: MetaId) -> Option<&PortMeta> {
        self.entries.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.generated = 0;
    }
}

/// Flat list of ports plus per-role indices.
#[derive(Debug, Default)]
pub struct PortRegistry {
    arena: MetaArena,
    ports: Vec<Port>,
    by_id: HashMap<String, usize>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    parameters: Vec<usize>,
    meters: Vec<usize>,
    groups: Vec<usize>,
    synth: bool,
    midi_capacity: usize,
}

impl PortRegistry {
    /// Empty registry. MIDI input and output ports hold up to `midi_capacity`
    /// events per block.
    pub fn new(midi_capacity: usize) -> Self {
        Self {
            midi_capacity,
            ..Self::default()
        }
    }

    /// Create every port described by `metadata` and assign parameter
    /// indices.
    pub fn build(metadata: &[PortMeta], midi_capacity: usize) -> Self {
        let mut registry = Self::new(midi_capacity);
        for meta in metadata {
            registry.create(meta.clone(), None);
        }
        registry.finalize();
        debug!(
            "Port registry built: {} ports, {} parameters, {} generated",
            registry.ports.len(),
            registry.parameters.len(),
            registry.arena.generated
        );
        registry
    }

    /// Create the port for `meta` and register it.
    ///
    /// Returns the port position in registration order, or `None` for roles
    /// the wrapper does not handle and for duplicate ids.
    pub fn create(&mut self, meta: PortMeta, postfix: Option<&str>) -> Option<usize> {
        if let Role::Unknown(_) = meta.role {
            return None;
        }
        if self.by_id.contains_key(meta.id.as_ref()) {
            warn!("Duplicate port id '{}' ignored", meta.id);
            return None;
        }

        let rows = meta.rows;
        let members = meta.members;
        let generated = postfix.is_some();
        let id = meta.id.to_string();
        let meta_id = self.arena.alloc(meta, generated);
        let decl = self.arena.get(meta_id)?;

        let port = match decl.role {
            Role::Audio => Port::audio(meta_id, decl.direction),
            Role::Control | Role::Meter if decl.is_output() => Port::meter(meta_id, decl),
            Role::Control | Role::Meter => Port::parameter(meta_id, decl),
            Role::Midi if decl.is_output() => Port::midi_output(meta_id, self.midi_capacity),
            Role::Midi => {
                self.synth = true;
                Port::midi_input(meta_id, self.midi_capacity)
            }
            Role::Path => Port::path(meta_id, decl),
            Role::Mesh => Port::mesh(meta_id),
            Role::FrameBuffer => Port::frame_buffer(meta_id),
            Role::PortGroup => Port::group(meta_id, rows),
            Role::Unknown(_) => return None,
        };

        let index = self.register(id, port);

        if rows > 0 && !members.is_empty() {
            for row in 0..rows {
                let row_postfix = format!("{}_{}", postfix.unwrap_or(""), row);
                for member in members {
                    self.create(member.for_row(&row_postfix, row, rows), Some(&row_postfix));
                }
            }
        }

        Some(index)
    }

    fn register(&mut self, id: String, port: Port) -> usize {
        let index = self.ports.len();
        match &port.kind {
            PortKind::Audio(audio) => {
                if audio.direction() == crate::metadata::Direction::Input {
                    self.inputs.push(index);
                } else {
                    self.outputs.push(index);
                }
            }
            PortKind::Parameter(_) => self.parameters.push(index),
            PortKind::Meter(_) => self.meters.push(index),
            PortKind::Group { .. } => self.groups.push(index),
            PortKind::MidiInput(_)
            | PortKind::MidiOutput(_)
            | PortKind::Path(_)
            | PortKind::Mesh(_)
            | PortKind::FrameBuffer(_) => {}
        }
        self.by_id.insert(id, index);
        self.ports.push(port);
        index
    }

    /// Assign each parameter its position in the parameter list.
    pub fn finalize(&mut self) {
        for (position, &index) in self.parameters.iter().enumerate() {
            if let Some(param) = self.ports[index].as_parameter_mut() {
                param.set_index(position);
            }
        }
    }

    /// Bind audio ports to host buffers by position. Ports without a matching
    /// buffer are left unbound.
    pub fn bind_audio(&mut self, input_buffers: usize, output_buffers: usize, samples: usize) {
        for (bucket, available) in [(&self.inputs, input_buffers), (&self.outputs, output_buffers)] {
            for (position, &index) in bucket.iter().enumerate() {
                if let Some(audio) = self.ports[index].as_audio_mut() {
                    if position < available {
                        audio.bind(position, samples);
                    } else {
                        audio.unbind();
                    }
                }
            }
        }
    }

    // ===== Lookup =====

    pub fn find_by_id(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    pub fn port_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.ports.get_mut(index)
    }

    /// Metadata of `port`.
    pub fn meta(&self, port: &Port) -> Option<&PortMeta> {
        self.arena.get(port.meta_id())
    }

    /// Id of the port at `index`.
    pub fn id(&self, index: usize) -> Option<&str> {
        let port = self.ports.get(index)?;
        self.arena.get(port.meta_id()).map(|meta| meta.id.as_ref())
    }

    /// Ports in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.ports.iter_mut()
    }

    /// Ports paired with their metadata, in registration order.
    pub fn iter_with_meta(&self) -> impl Iterator<Item = (&Port, &PortMeta)> {
        self.ports
            .iter()
            .filter_map(|port| self.arena.get(port.meta_id()).map(|meta| (port, meta)))
    }

    pub fn parameter(&self, index: usize) -> Option<&ParameterPort> {
        let port = *self.parameters.get(index)?;
        self.ports[port].as_parameter()
    }

    pub fn parameter_mut(&mut self, index: usize) -> Option<&mut ParameterPort> {
        let port = *self.parameters.get(index)?;
        self.ports[port].as_parameter_mut()
    }

    // ===== Buckets =====

    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    pub fn parameters(&self) -> &[usize] {
        &self.parameters
    }

    pub fn meters(&self) -> &[usize] {
        &self.meters
    }

    pub fn groups(&self) -> &[usize] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the plugin declared a MIDI input.
    pub fn is_synth(&self) -> bool {
        self.synth
    }

    /// Number of metadata entries cloned from group templates.
    pub fn generated_metadata_count(&self) -> usize {
        self.arena.generated
    }

    pub fn arena(&self) -> &MetaArena {
        &self.arena
    }

    /// Drop every port and all metadata.
    pub fn destroy(&mut self) {
        self.ports.clear();
        self.by_id.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.parameters.clear();
        self.meters.clear();
        self.groups.clear();
        self.arena.clear();
        self.synth = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Direction;

    static BAND: [PortMeta; 3] = [
        PortMeta::control("freq").with_range(0.0, 100.0).growing(),
        PortMeta::control("gain").with_range(0.0, 100.0).lowering(),
        PortMeta::meter("level"),
    ];

    static PORTS: [PortMeta; 5] = [
        PortMeta::audio("in", Direction::Input),
        PortMeta::audio("out", Direction::Output),
        PortMeta::control("bypass").with_range(0.0, 1.0).with_step(1.0),
        PortMeta::port_group("band", 4, &BAND),
        PortMeta::new("mystery", Role::Unknown(99), Direction::Input),
    ];

    fn start(registry: &PortRegistry, id: &str) -> f32 {
        let index = registry.find_by_id(id).unwrap();
        registry.port(index).unwrap().as_parameter().unwrap().value()
    }

    #[test]
    fn test_group_expansion() {
        let registry = PortRegistry::build(&PORTS, 16);

        // in, out, bypass, band group, 12 members. Unknown role skipped.
        assert_eq!(registry.len(), 16);
        assert_eq!(registry.generated_metadata_count(), 12);
        assert!(registry.find_by_id("mystery").is_none());
        assert_eq!(registry.groups().len(), 1);

        let growing: Vec<f32> = (0..4).map(|r| start(&registry, &format!("freq_{r}"))).collect();
        assert_eq!(growing, vec![0.0, 25.0, 50.0, 75.0]);
        let lowering: Vec<f32> = (0..4).map(|r| start(&registry, &format!("gain_{r}"))).collect();
        assert_eq!(lowering, vec![100.0, 75.0, 50.0, 25.0]);
    }

    #[test]
    fn test_buckets_and_parameter_indices() {
        let registry = PortRegistry::build(&PORTS, 16);
        assert_eq!(registry.inputs().len(), 1);
        assert_eq!(registry.outputs().len(), 1);
        assert_eq!(registry.meters().len(), 4);
        // bypass + 4 rows × (freq, gain)
        assert_eq!(registry.parameter_count(), 9);
        for i in 0..registry.parameter_count() {
            assert_eq!(registry.parameter(i).unwrap().index(), i);
        }
        assert!(registry.parameter(9).is_none());
        assert!(!registry.is_synth());
    }

    #[test]
    fn test_nested_groups_use_parent_postfix() {
        static INNER: [PortMeta; 1] = [PortMeta::control("q")];
        static OUTER: [PortMeta; 1] = [PortMeta::port_group("sub", 2, &INNER)];
        static DECL: [PortMeta; 1] = [PortMeta::port_group("top", 2, &OUTER)];

        let registry = PortRegistry::build(&DECL, 16);
        assert!(registry.find_by_id("sub_1").is_some());
        assert!(registry.find_by_id("q_1_0").is_some());
        assert!(registry.find_by_id("q_0_1").is_some());
        // top, 2 × sub, 4 × q
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.groups().len(), 3);
        assert_eq!(registry.generated_metadata_count(), 6);
    }

    #[test]
    fn test_midi_input_marks_synth() {
        static DECL: [PortMeta; 2] = [
            PortMeta::midi("midi_in", Direction::Input),
            PortMeta::midi("midi_out", Direction::Output),
        ];
        let registry = PortRegistry::build(&DECL, 16);
        assert!(registry.is_synth());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_meter_with_input_direction_is_parameter() {
        static DECL: [PortMeta; 1] = [PortMeta::meter("m").with_direction(Direction::Input)];
        let registry = PortRegistry::build(&DECL, 16);
        assert_eq!(registry.parameter_count(), 1);
        assert!(registry.meters().is_empty());
    }

    #[test]
    fn test_duplicate_id_ignored() {
        static DECL: [PortMeta; 2] = [PortMeta::control("a"), PortMeta::control("a")];
        let registry = PortRegistry::build(&DECL, 16);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bind_audio_by_position() {
        static DECL: [PortMeta; 3] = [
            PortMeta::audio("in_l", Direction::Input),
            PortMeta::audio("in_r", Direction::Input),
            PortMeta::audio("out", Direction::Output),
        ];
        let mut registry = PortRegistry::build(&DECL, 0);
        registry.bind_audio(1, 1, 32);

        let binding = |registry: &mut PortRegistry, id: &str| {
            let index = registry.find_by_id(id).unwrap();
            registry.port_mut(index).unwrap().as_audio_mut().unwrap().binding()
        };
        assert_eq!(binding(&mut registry, "in_l"), Some(0));
        assert_eq!(binding(&mut registry, "in_r"), None);
        assert_eq!(binding(&mut registry, "out"), Some(0));
    }

    #[test]
    fn test_destroy() {
        let mut registry = PortRegistry::build(&PORTS, 16);
        registry.destroy();
        assert!(registry.is_empty());
        assert!(registry.arena().is_empty());
        assert_eq!(registry.generated_metadata_count(), 0);
        assert_eq!(registry.parameter_count(), 0);
        assert!(registry.find_by_id("in").is_none());
    }
}
