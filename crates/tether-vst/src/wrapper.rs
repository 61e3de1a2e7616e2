//! Plugin wrapper: lifecycle, processing loop, editor and state.
//!
//! The wrapper is driven by the host from two contexts. The render context
//! calls [`Wrapper::process_events`] and [`Wrapper::run`]; the UI/idle context
//! calls the editor entry points and [`Wrapper::save_state`] /
//! [`Wrapper::load_state`]. Only the KVT store is shared between them.

use std::sync::Arc;

use log::{debug, info, warn};

use tether_core::config::Config;
use tether_core::kvt::KvtParam;
use tether_core::kvt_sync::{KvtObserver, KvtShared, SyncOutcome};
use tether_core::metadata::PortMeta;
use tether_core::midi::RawMidiEvent;
use tether_core::plugin::{Block, Editor, Engine, Rect, Size};
use tether_core::ports::{Port, PortKind};
use tether_core::position::Position;
use tether_core::registry::PortRegistry;

use crate::codec::{self, LoadReport};
use crate::error::Result;
use crate::host::Host;

/// Editor handle owned by the wrapper.
pub type BoxedEditor = Box<dyn Editor + Send>;

/// Render-side observer of UI edits.
pub type BoxedListener = Box<dyn KvtObserver + Send>;

/// Bridges a wrapped [`Engine`] to a chunk-based plugin host.
pub struct Wrapper<E: Engine, H: Host> {
    config: Config,
    metadata: &'static [PortMeta],
    engine: E,
    host: H,
    ports: PortRegistry,
    kvt: Arc<KvtShared>,
    position: Position,
    editor: Option<BoxedEditor>,
    listener: Option<BoxedListener>,
    ui_visible: bool,
    rect: Rect,
    settings_dirty: bool,
    latency: f32,
    initial_delay: i32,
    active: bool,
}

impl<E: Engine, H: Host> Wrapper<E, H> {
    pub fn new(config: Config, metadata: &'static [PortMeta], engine: E, host: H) -> Self {
        let position = Position::new(config.ticks_per_beat);
        let ports = PortRegistry::new(config.midi_events);
        Self {
            config,
            metadata,
            engine,
            host,
            ports,
            kvt: Arc::new(KvtShared::new()),
            position,
            editor: None,
            listener: None,
            ui_visible: false,
            rect: Rect::default(),
            settings_dirty: true,
            latency: 0.0,
            initial_delay: 0,
            active: false,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build the ports and hand them to the engine.
    pub fn init(&mut self) {
        self.ports = PortRegistry::build(self.metadata, self.config.midi_events);
        self.engine.init(&self.ports);
        self.position = Position::new(self.config.ticks_per_beat);
        self.settings_dirty = true;
        info!(
            "Initialized {} ({}): {} ports, {} parameters{}",
            self.config.name,
            self.config.unique_id,
            self.ports.len(),
            self.ports.parameter_count(),
            if self.ports.is_synth() { ", synth" } else { "" }
        );
    }

    /// Tear down the editor, the engine hooks and all ports.
    pub fn destroy(&mut self) {
        self.destroy_ui();
        if self.active {
            self.mains_changed(false);
        }
        self.engine.destroy();
        self.ports.destroy();
        self.listener = None;
        debug!("Destroyed {}", self.config.name);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.engine.set_sample_rate(sample_rate);
        self.position.sample_rate = f64::from(sample_rate);
        self.settings_dirty = true;
    }

    /// Processing switched on or off.
    pub fn mains_changed(&mut self, on: bool) {
        if on == self.active {
            return;
        }
        self.active = on;
        if on {
            self.engine.activate();
        } else {
            self.engine.deactivate();
        }
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Deliver a host event batch to every MIDI input.
    pub fn process_events(&mut self, events: &[RawMidiEvent]) {
        for port in self.ports.iter_mut() {
            if let Some(midi) = port.as_midi_input_mut() {
                midi.deserialize(events);
            }
        }
    }

    /// Process one block.
    pub fn run<'b>(&mut self, inputs: &[&'b [f32]], outputs: &mut [&'b mut [f32]], samples: usize) {
        if self.engine.sample_rate() <= 0.0 {
            for buffer in outputs.iter_mut() {
                let len = samples.min(buffer.len());
                buffer[..len].fill(0.0);
            }
            return;
        }

        if self.ui_visible != self.engine.ui_active() {
            if self.ui_visible {
                self.engine.activate_ui();
            } else {
                self.engine.deactivate_ui();
            }
        }

        self.sync_position();

        self.ports.bind_audio(inputs.len(), outputs.len(), samples);

        for port in self.ports.iter_mut() {
            if port.pre_process(samples) {
                self.settings_dirty = true;
            }
        }

        if self.settings_dirty {
            self.engine.update_settings(&self.ports);
            self.settings_dirty = false;
        }

        let mut block = Block::new(&mut self.ports, inputs, outputs, samples);
        self.engine.process(&mut block);

        let latency = self.engine.latency();
        if latency != self.latency {
            self.latency = latency;
            self.initial_delay = latency as i32;
            debug!("Latency changed to {} samples", self.initial_delay);
            self.host.io_changed();
        }

        for port in self.ports.iter_mut() {
            port.post_process(samples);
        }
    }

    /// Entry point for hosts using the accumulating process call.
    pub fn run_legacy<'b>(
        &mut self,
        inputs: &[&'b [f32]],
        outputs: &mut [&'b mut [f32]],
        samples: usize,
    ) {
        self.run(inputs, outputs, samples);
    }

    fn sync_position(&mut self) {
        let Some(info) = self.host.time_info() else {
            return;
        };
        let next = self.position.advance(&info);
        if self.engine.set_position(&next) {
            self.settings_dirty = true;
        }
        self.position = next;
    }

    /// MIDI events emitted during the last block.
    pub fn midi_output(&self) -> impl Iterator<Item = &RawMidiEvent> {
        self.ports
            .iter()
            .filter_map(|port| match &port.kind {
                PortKind::MidiOutput(midi) => Some(midi.sent()),
                _ => None,
            })
            .flatten()
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    pub fn parameter_count(&self) -> usize {
        self.ports.parameter_count()
    }

    /// Normalized value of the parameter at `index`, or 0 if out of range.
    pub fn get_parameter(&self, index: usize) -> f32 {
        self.ports.parameter(index).map_or(0.0, |p| p.normalized())
    }

    /// Set the parameter at `index` from a normalized value.
    pub fn set_parameter(&mut self, index: usize, normalized: f32) {
        match self.ports.parameter_mut(index) {
            Some(param) => param.set_normalized(normalized),
            None => warn!("Parameter index {index} out of range"),
        }
    }

    /// Id of the parameter at `index`.
    pub fn parameter_id(&self, index: usize) -> Option<&str> {
        let port = *self.ports.parameters().get(index)?;
        self.ports.id(port)
    }

    // =========================================================================
    // Editor
    // =========================================================================

    /// Attach and show an editor. Returns the initial editor rectangle.
    pub fn show_ui(&mut self, mut editor: BoxedEditor) -> Rect {
        self.kvt.force_resync();
        let size = editor.size_request();
        self.rect = Rect::from_size(size);
        editor.opened();
        self.editor = Some(editor);
        self.ui_visible = true;
        self.iterate_ui();
        self.rect
    }

    pub fn hide_ui(&mut self) {
        if let Some(editor) = self.editor.as_mut() {
            editor.closed();
        }
        self.ui_visible = false;
    }

    pub fn destroy_ui(&mut self) {
        if self.editor.is_some() {
            self.hide_ui();
            self.editor = None;
        }
    }

    pub fn is_ui_visible(&self) -> bool {
        self.ui_visible
    }

    /// Periodic idle call: push transport and KVT changes to the editor.
    pub fn iterate_ui(&mut self) -> SyncOutcome {
        let Some(editor) = self.editor.as_mut() else {
            return SyncOutcome::Skipped;
        };
        editor.idle();
        editor.position_updated(&self.position);

        let mut sink = EditorSink(editor.as_mut());
        let listener = self
            .listener
            .as_mut()
            .map(|l| l.as_mut() as &mut dyn KvtObserver);
        self.kvt.sync(&mut sink, listener, self.config.trace_kvt())
    }

    /// Editor asked for a new size. Reports to the host only if the size
    /// differs from the current rectangle.
    pub fn resize_ui(&mut self, width: u32, height: u32) -> bool {
        let rect = Rect::from_size(Size::new(width, height));
        if rect == self.rect {
            return false;
        }
        self.rect = rect;
        self.host.size_window(rect.width(), rect.height());
        true
    }

    /// Current editor rectangle.
    pub fn ui_rect(&mut self) -> Rect {
        if let Some(size) = self.editor.as_ref().and_then(|e| e.geometry()) {
            self.rect = Rect::from_size(size);
        }
        self.rect
    }

    /// Install a render-side observer for UI edits.
    pub fn set_kvt_listener(&mut self, listener: Option<BoxedListener>) {
        self.listener = listener;
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Encode the current state as a bank.
    pub fn save_state(&self) -> Result<Vec<u8>> {
        codec::serialize(&self.config, &self.ports, &self.kvt)
    }

    /// Apply a bank. Engine settings are refreshed on the next block.
    pub fn load_state(&mut self, data: &[u8]) -> Result<LoadReport> {
        let report = codec::deserialize(&self.config, &mut self.ports, &self.kvt, data)?;
        self.settings_dirty = true;
        Ok(report)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn kvt(&self) -> &Arc<KvtShared> {
        &self.kvt
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    /// Port with the given id.
    pub fn port(&self, id: &str) -> Option<&Port> {
        self.ports.find_by_id(id).and_then(|index| self.ports.port(index))
    }

    pub fn port_mut(&mut self, id: &str) -> Option<&mut Port> {
        let index = self.ports.find_by_id(id)?;
        self.ports.port_mut(index)
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_synth(&self) -> bool {
        self.ports.is_synth()
    }

    /// Latency last reported to the host, in samples.
    pub fn initial_delay(&self) -> i32 {
        self.initial_delay
    }
}

/// Forwards KVT changes to the editor.
struct EditorSink<'a>(&'a mut (dyn Editor + Send));

impl KvtObserver for EditorSink<'_> {
    fn kvt_write(&mut self, name: &str, value: &KvtParam) {
        self.0.kvt_write(name, value);
    }

    fn kvt_remove(&mut self, name: &str) {
        self.0.kvt_remove(name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use tether_core::fourcc;
    use tether_core::kvt::Pending;
    use tether_core::metadata::Direction;
    use tether_core::position::TimeInfo;

    static PORTS: [PortMeta; 4] = [
        PortMeta::audio("in", Direction::Input),
        PortMeta::audio("out", Direction::Output),
        PortMeta::control("gain").with_range(0.0, 2.0).with_start(1.0),
        PortMeta::midi("midi_in", Direction::Input),
    ];

    const CONFIG: Config = Config::new("Gain", fourcc!(b"gAin"));

    #[derive(Default)]
    struct TestEngine {
        sample_rate: f32,
        ui_active: bool,
        gain: f32,
        updates: usize,
        processed: usize,
        latency: f32,
        notes: usize,
        want_update_on_position: bool,
    }

    impl Engine for TestEngine {
        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }

        fn set_sample_rate(&mut self, sample_rate: f32) {
            self.sample_rate = sample_rate;
        }

        fn ui_active(&self) -> bool {
            self.ui_active
        }

        fn activate_ui(&mut self) {
            self.ui_active = true;
        }

        fn deactivate_ui(&mut self) {
            self.ui_active = false;
        }

        fn set_position(&mut self, _position: &Position) -> bool {
            self.want_update_on_position
        }

        fn update_settings(&mut self, ports: &PortRegistry) {
            self.gain = ports.parameter(0).map_or(0.0, |p| p.value());
            self.updates += 1;
        }

        fn process(&mut self, block: &mut Block<'_, '_>) {
            self.processed += 1;
            if let Some(midi) = block.port_mut("midi_in").and_then(Port::as_midi_input_mut) {
                self.notes += midi.events().len();
            }
            let input: Vec<f32> = block.input("in").map(<[f32]>::to_vec).unwrap_or_default();
            let gain = self.gain;
            if let Some(out) = block.output("out") {
                for (o, i) in out.iter_mut().zip(input) {
                    *o = i * gain;
                }
            }
        }

        fn latency(&self) -> f32 {
            self.latency
        }
    }

    #[derive(Default)]
    struct TestHost {
        time: Option<TimeInfo>,
        io_changed: usize,
        resized: Vec<(i32, i32)>,
    }

    impl Host for TestHost {
        fn time_info(&self) -> Option<TimeInfo> {
            self.time
        }

        fn io_changed(&mut self) {
            self.io_changed += 1;
        }

        fn size_window(&mut self, width: i32, height: i32) -> bool {
            self.resized.push((width, height));
            true
        }
    }

    #[derive(Default)]
    struct Seen {
        writes: Vec<String>,
        positions: usize,
    }

    struct TestEditor(Arc<Mutex<Seen>>);

    impl KvtObserver for TestEditor {
        fn kvt_write(&mut self, name: &str, _value: &KvtParam) {
            self.0.lock().unwrap().writes.push(name.to_owned());
        }
    }

    impl Editor for TestEditor {
        fn position_updated(&mut self, _position: &Position) {
            self.0.lock().unwrap().positions += 1;
        }

        fn size_request(&self) -> Size {
            Size::new(400, 300)
        }
    }

    fn wrapper() -> Wrapper<TestEngine, TestHost> {
        let mut wrapper = Wrapper::new(CONFIG, &PORTS, TestEngine::default(), TestHost::default());
        wrapper.init();
        wrapper
    }

    fn run_block(wrapper: &mut Wrapper<TestEngine, TestHost>, input: &[f32]) -> Vec<f32> {
        let mut output = vec![9.0; input.len()];
        {
            let inputs: [&[f32]; 1] = [input];
            let mut outputs: [&mut [f32]; 1] = [&mut output];
            wrapper.run(&inputs, &mut outputs, input.len());
        }
        output
    }

    #[test]
    fn test_silence_without_sample_rate() {
        let mut wrapper = wrapper();
        assert_eq!(run_block(&mut wrapper, &[1.0, 1.0]), vec![0.0, 0.0]);
        assert_eq!(wrapper.engine().processed, 0);
    }

    #[test]
    fn test_settings_update_only_when_dirty() {
        let mut wrapper = wrapper();
        wrapper.set_sample_rate(48000.0);

        assert_eq!(run_block(&mut wrapper, &[1.0, 0.5]), vec![1.0, 0.5]);
        assert_eq!(wrapper.engine().updates, 1);

        run_block(&mut wrapper, &[1.0]);
        assert_eq!(wrapper.engine().updates, 1);

        wrapper.set_parameter(0, 1.0);
        assert_eq!(run_block(&mut wrapper, &[1.0]), vec![2.0]);
        assert_eq!(wrapper.engine().updates, 2);
        assert_eq!(wrapper.get_parameter(0), 1.0);
        assert_eq!(wrapper.parameter_id(0), Some("gain"));
    }

    #[test]
    fn test_position_change_marks_dirty() {
        let mut wrapper = wrapper();
        wrapper.set_sample_rate(44100.0);
        run_block(&mut wrapper, &[0.0]);
        assert_eq!(wrapper.engine().updates, 1);

        wrapper.host_mut().time = Some(TimeInfo {
            sample_rate: 44100.0,
            sample_pos: 512.0,
            tempo: Some(100.0),
            ..TimeInfo::default()
        });
        wrapper.engine_mut().want_update_on_position = true;
        run_block(&mut wrapper, &[0.0]);
        assert_eq!(wrapper.engine().updates, 2);
        assert_eq!(wrapper.position().beats_per_minute, 100.0);
        assert_eq!(wrapper.position().frame, 512);

        // Failed queries keep the last snapshot.
        wrapper.host_mut().time = None;
        run_block(&mut wrapper, &[0.0]);
        assert_eq!(wrapper.position().frame, 512);
    }

    #[test]
    fn test_latency_change_reported_once() {
        let mut wrapper = wrapper();
        wrapper.set_sample_rate(44100.0);
        wrapper.engine_mut().latency = 64.0;
        run_block(&mut wrapper, &[0.0]);
        run_block(&mut wrapper, &[0.0]);
        assert_eq!(wrapper.host().io_changed, 1);
        assert_eq!(wrapper.initial_delay(), 64);
    }

    #[test]
    fn test_midi_delivered_for_one_block() {
        let mut wrapper = wrapper();
        wrapper.set_sample_rate(44100.0);
        assert!(wrapper.is_synth());
        wrapper.process_events(&[RawMidiEvent::new(0, [0x90, 60, 100])]);
        run_block(&mut wrapper, &[0.0]);
        run_block(&mut wrapper, &[0.0]);
        assert_eq!(wrapper.engine().notes, 1);
    }

    #[test]
    fn test_ui_state_reconciled_in_render() {
        let mut wrapper = wrapper();
        wrapper.set_sample_rate(44100.0);
        let seen = Arc::new(Mutex::new(Seen::default()));
        wrapper.show_ui(Box::new(TestEditor(Arc::clone(&seen))));
        assert!(!wrapper.engine().ui_active);
        run_block(&mut wrapper, &[0.0]);
        assert!(wrapper.engine().ui_active);

        wrapper.hide_ui();
        run_block(&mut wrapper, &[0.0]);
        assert!(!wrapper.engine().ui_active);
    }

    #[test]
    fn test_show_ui_resyncs_kvt() {
        let mut wrapper = wrapper();
        {
            let mut kvt = wrapper.kvt().lock();
            kvt.put("/a", KvtParam::Int32(1), None).unwrap();
            kvt.put("/b", KvtParam::Int32(2), None).unwrap();
        }
        let seen = Arc::new(Mutex::new(Seen::default()));
        let rect = wrapper.show_ui(Box::new(TestEditor(Arc::clone(&seen))));
        assert_eq!((rect.width(), rect.height()), (400, 300));
        assert_eq!(seen.lock().unwrap().writes, vec!["/a".to_owned(), "/b".to_owned()]);
        assert_eq!(seen.lock().unwrap().positions, 1);

        wrapper
            .kvt()
            .lock()
            .put("/c", KvtParam::Int32(3), Some(Pending::ToUi))
            .unwrap();
        wrapper.iterate_ui();
        assert_eq!(seen.lock().unwrap().writes.len(), 3);
    }

    #[test]
    fn test_iterate_without_editor() {
        let mut wrapper = wrapper();
        assert_eq!(wrapper.iterate_ui(), SyncOutcome::Skipped);
    }

    #[test]
    fn test_resize_reports_only_changes() {
        let mut wrapper = wrapper();
        wrapper.show_ui(Box::new(TestEditor(Arc::new(Mutex::new(Seen::default())))));
        assert!(!wrapper.resize_ui(400, 300));
        assert!(wrapper.resize_ui(800, 600));
        assert!(!wrapper.resize_ui(800, 600));
        assert_eq!(wrapper.host().resized, vec![(800, 600)]);
        assert_eq!(wrapper.ui_rect().width(), 800);
    }

    #[test]
    fn test_destroy_clears_ports() {
        let mut wrapper = wrapper();
        wrapper.mains_changed(true);
        wrapper.destroy();
        assert!(wrapper.ports().is_empty());
        assert_eq!(wrapper.parameter_count(), 0);
        assert_eq!(wrapper.get_parameter(0), 0.0);
    }
}
