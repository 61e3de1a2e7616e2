//! Bank persistence and KVT sync through the public wrapper API.

use std::sync::Arc;
use std::thread;

use tether_core::fourcc;
use tether_core::kvt::{KvtBlob, KvtParam, Pending};
use tether_core::kvt_sync::{KvtObserver, SyncOutcome};
use tether_core::metadata::{Direction, PortMeta};
use tether_core::plugin::{Block, Editor, Engine, Size};
use tether_core::registry::PortRegistry;
use tether_core::Config;
use tether_vst::codec::{BankFormat, CHUNK_MAGIC, FX_VERSION_KVT};
use tether_vst::{NullHost, StateError, Wrapper};

const CONFIG: Config = Config::new("Equalizer", fourcc!(b"tEq4")).with_version(1200);

static BAND: [PortMeta; 3] = [
    PortMeta::control("freq").with_range(0.0, 100.0).growing(),
    PortMeta::control("gain").with_range(0.0, 100.0).lowering(),
    PortMeta::control("q").with_range(0.1, 10.0).with_start(0.7),
];

static PORTS: [PortMeta; 6] = [
    PortMeta::audio("in", Direction::Input),
    PortMeta::audio("out", Direction::Output),
    PortMeta::control("output").with_range(-24.0, 24.0),
    PortMeta::path("ir_file"),
    PortMeta::meter("level"),
    PortMeta::port_group("band", 4, &BAND),
];

#[derive(Default)]
struct Equalizer {
    sample_rate: f32,
    ui: bool,
}

impl Engine for Equalizer {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn ui_active(&self) -> bool {
        self.ui
    }

    fn activate_ui(&mut self) {
        self.ui = true;
    }

    fn deactivate_ui(&mut self) {
        self.ui = false;
    }

    fn update_settings(&mut self, _ports: &PortRegistry) {}

    fn process(&mut self, _block: &mut Block<'_, '_>) {}
}

fn wrapper() -> Wrapper<Equalizer, NullHost> {
    let mut wrapper = Wrapper::new(CONFIG, &PORTS, Equalizer::default(), NullHost);
    wrapper.init();
    wrapper
}

fn every_kvt_type() -> Vec<(&'static str, KvtParam)> {
    vec![
        ("/i32", KvtParam::Int32(-7)),
        ("/u32", KvtParam::Uint32(7)),
        ("/i64", KvtParam::Int64(i64::MIN)),
        ("/u64", KvtParam::Uint64(u64::MAX)),
        ("/f32", KvtParam::Float32(0.25)),
        ("/f64", KvtParam::Float64(-1.0e100)),
        ("/str", KvtParam::String("hello".to_owned())),
        ("/empty", KvtParam::String(String::new())),
        ("/blob", KvtParam::Blob(KvtBlob::new(Some("image/png"), vec![0, 1, 2, 0, 255]))),
        ("/raw", KvtParam::Blob(KvtBlob::new(None, vec![9; 3]))),
    ]
}

fn snapshot(wrapper: &Wrapper<Equalizer, NullHost>) -> (Vec<f32>, String, Vec<(String, KvtParam)>) {
    let params = (0..wrapper.parameter_count()).map(|i| wrapper.get_parameter(i)).collect();
    let path = wrapper.port("ir_file").unwrap().as_path().unwrap().path().to_owned();
    let kvt = wrapper
        .kvt()
        .lock()
        .iter()
        .map(|(name, value)| (name.to_owned(), value.clone()))
        .collect();
    (params, path, kvt)
}

fn populate(wrapper: &mut Wrapper<Equalizer, NullHost>) {
    for i in 0..wrapper.parameter_count() {
        wrapper.set_parameter(i, (i as f32 * 0.07) % 1.0);
    }
    wrapper
        .port_mut("ir_file")
        .unwrap()
        .deserialize_v2(b"/samples/hall.wav\0");
    let mut kvt = wrapper.kvt().lock();
    for (name, value) in every_kvt_type() {
        kvt.put(name, value, None).unwrap();
    }
}

#[test]
fn test_group_expansion_in_wrapper() {
    let wrapper = wrapper();
    assert_eq!(wrapper.ports().generated_metadata_count(), 12);
    // output + 4 × (freq, gain, q)
    assert_eq!(wrapper.parameter_count(), 13);

    let start = |id: &str| wrapper.port(id).unwrap().as_parameter().unwrap().value();
    let freq: Vec<f32> = (0..4).map(|r| start(&format!("freq_{r}"))).collect();
    let gain: Vec<f32> = (0..4).map(|r| start(&format!("gain_{r}"))).collect();
    assert_eq!(freq, vec![0.0, 25.0, 50.0, 75.0]);
    assert_eq!(gain, vec![100.0, 75.0, 50.0, 25.0]);
}

#[test]
fn test_roundtrip_restores_ports_and_kvt() {
    let mut source = wrapper();
    populate(&mut source);
    let bank = source.save_state().unwrap();

    let mut target = wrapper();
    let report = target.load_state(&bank).unwrap();
    assert_eq!(report.format, BankFormat::V2);
    assert_eq!(report.ports_applied, 14);
    assert_eq!(report.ports_skipped, 0);
    assert_eq!(report.kvt_applied, every_kvt_type().len());
    assert!(!report.truncated);

    assert_eq!(snapshot(&target), snapshot(&source));
}

#[test]
fn test_loading_twice_is_idempotent() {
    let mut source = wrapper();
    populate(&mut source);
    let bank = source.save_state().unwrap();

    let mut once = wrapper();
    once.load_state(&bank).unwrap();
    let mut twice = wrapper();
    twice.load_state(&bank).unwrap();
    twice.load_state(&bank).unwrap();
    assert_eq!(snapshot(&once), snapshot(&twice));
}

#[test]
fn test_loaded_kvt_reaches_editor() {
    #[derive(Default)]
    struct Names(Vec<String>);

    impl KvtObserver for Names {
        fn kvt_write(&mut self, name: &str, _value: &KvtParam) {
            self.0.push(name.to_owned());
        }
    }

    let mut source = wrapper();
    populate(&mut source);
    let bank = source.save_state().unwrap();

    let mut target = wrapper();
    target.load_state(&bank).unwrap();
    assert_eq!(
        target.kvt().lock().pending_len(Pending::ToUi),
        every_kvt_type().len()
    );

    let mut names = Names::default();
    assert!(matches!(
        target.kvt().sync(&mut names, None, false),
        SyncOutcome::Synced { .. }
    ));
    assert_eq!(names.0.len(), every_kvt_type().len());
}

#[test]
fn test_bad_magic_leaves_state_untouched() {
    let mut source = wrapper();
    populate(&mut source);
    let mut bank = source.save_state().unwrap();
    bank[0..4].copy_from_slice(b"XXXX");

    let mut target = wrapper();
    target.kvt().lock().put("/mine", KvtParam::Int32(1), None).unwrap();
    let before = snapshot(&target);

    assert!(matches!(target.load_state(&bank), Err(StateError::BadChunkMagic(_))));
    assert_eq!(snapshot(&target), before);
}

#[test]
fn test_foreign_bank_rejected() {
    let other = Config::new("Other", fourcc!(b"oThr"));
    let mut source = Wrapper::new(other, &PORTS, Equalizer::default(), NullHost);
    source.init();
    let bank = source.save_state().unwrap();
    assert!(matches!(
        wrapper().load_state(&bank),
        Err(StateError::IdentityMismatch { .. })
    ));
}

#[test]
fn test_legacy_bank_is_positional() {
    let mut bank = Vec::new();
    for word in [CHUNK_MAGIC, 0, u32::from_be_bytes(*b"FBCh"), 1000, CONFIG.unique_id.as_u32(), 1, 0, 0] {
        bank.extend_from_slice(&word.to_be_bytes());
    }
    bank.extend_from_slice(&3u32.to_be_bytes());
    bank.push(6);
    bank.extend_from_slice(b"output");
    bank.extend_from_slice(&12.0f32.to_be_bytes());
    bank.push(7);
    bank.extend_from_slice(b"missing");
    bank.extend_from_slice(&1.0f32.to_be_bytes());
    bank.push(6);
    bank.extend_from_slice(b"freq_0");
    bank.extend_from_slice(&50.0f32.to_be_bytes());
    let size = (bank.len() - 8) as u32;
    bank[4..8].copy_from_slice(&size.to_be_bytes());

    let mut target = wrapper();
    let report = target.load_state(&bank).unwrap();
    assert_eq!(report.format, BankFormat::V1);
    assert_eq!(report.ports_applied, 1);

    let value = |id: &str| target.port(id).unwrap().as_parameter().unwrap().value();
    assert_eq!(value("output"), 12.0);
    // Aborted before reaching freq_0.
    assert_eq!(value("freq_0"), 0.0);
}

#[test]
fn test_header_written_for_current_version() {
    let bank = wrapper().save_state().unwrap();
    assert_eq!(&bank[12..16], &1200u32.to_be_bytes());
    assert_eq!(&bank[20..24], &FX_VERSION_KVT.to_be_bytes());
}

#[test]
fn test_sync_never_blocks_and_drains() {
    struct Sink(usize);

    impl KvtObserver for Sink {
        fn kvt_write(&mut self, _name: &str, _value: &KvtParam) {
            self.0 += 1;
        }
    }

    struct Ui(Arc<std::sync::atomic::AtomicUsize>);

    impl KvtObserver for Ui {
        fn kvt_write(&mut self, _name: &str, _value: &KvtParam) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    impl Editor for Ui {
        fn size_request(&self) -> Size {
            Size::new(200, 100)
        }
    }

    let mut wrapper = wrapper();
    let kvt = Arc::clone(wrapper.kvt());

    // Held lock: idle calls return immediately without draining.
    let guard = kvt.lock();
    let holder = thread::spawn({
        let kvt = Arc::clone(&kvt);
        move || {
            let mut sink = Sink(0);
            (0..10).map(|_| kvt.sync(&mut sink, None, false)).collect::<Vec<_>>()
        }
    });
    let outcomes = holder.join().unwrap();
    assert!(outcomes.iter().all(|o| *o == SyncOutcome::Skipped));
    drop(guard);

    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    wrapper.show_ui(Box::new(Ui(Arc::clone(&seen))));
    for i in 0..5 {
        kvt.lock()
            .put(&format!("/n/{i}"), KvtParam::Int32(i), Some(Pending::ToUi))
            .unwrap();
    }
    assert_eq!(
        wrapper.iterate_ui(),
        SyncOutcome::Synced { to_ui: 5, to_render: 0 }
    );
    assert_eq!(
        wrapper.iterate_ui(),
        SyncOutcome::Synced { to_ui: 0, to_render: 0 }
    );
    assert_eq!(seen.load(std::sync::atomic::Ordering::Relaxed), 5);
}

#[test]
fn test_truncated_port_section_keeps_prior_kvt() {
    let mut source = wrapper();
    populate(&mut source);
    let bank = source.save_state().unwrap();
    // Cut inside the first port record; the header still claims the full size.
    let cut = &bank[..40];

    let mut target = wrapper();
    target
        .kvt()
        .lock()
        .put("/user/setting", KvtParam::Int32(42), None)
        .unwrap();
    let before = snapshot(&target);

    let report = target.load_state(cut).unwrap();
    assert!(report.truncated);
    assert_eq!(report.ports_applied, 0);
    assert_eq!(snapshot(&target), before);
}

#[test]
fn test_strings_with_nul_never_enter_a_bank() {
    let source = wrapper();
    let err = source
        .kvt()
        .lock()
        .put("/s", KvtParam::String("a\0b".to_owned()), None);
    assert!(err.is_err());
    source
        .kvt()
        .lock()
        .put("/s", KvtParam::String("a b".to_owned()), None)
        .unwrap();

    let bank = source.save_state().unwrap();
    let mut target = wrapper();
    target.load_state(&bank).unwrap();
    assert_eq!(
        target.kvt().lock().get("/s"),
        Some(&KvtParam::String("a b".to_owned()))
    );
}
