//! # Tether
//!
//! Bridges a plugin engine to a host: ports built from static metadata,
//! bank persistence and a typed key-value side store synced between the
//! render and UI contexts.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! static PORTS: [PortMeta; 3] = [
//!     PortMeta::audio("in", Direction::Input),
//!     PortMeta::audio("out", Direction::Output),
//!     PortMeta::control("gain").with_range(0.0, 2.0).with_start(1.0),
//! ];
//!
//! static CONFIG: Config = Config::new("Gain", fourcc!(b"gAin")).with_vendor("Tether");
//!
//! let mut wrapper = Wrapper::new(CONFIG.clone(), &PORTS, MyGain::default(), NullHost);
//! wrapper.init();
//! ```

pub use tether_core as core;

#[cfg(feature = "vst")]
pub use tether_vst as vst;

pub use tether_core::fourcc;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tether_core::{
        // Traits
        Editor, Engine, KvtObserver,
        // Configuration
        Config, ConfigFile, FourCharCode,
        // Metadata and ports
        Direction, PortMeta, Role, RowScale, Port, PortKind, PortRegistry,
        // KVT
        KvtBlob, KvtParam, KvtShared, KvtStore, Pending, SyncOutcome,
        // Processing
        Block, MidiEvent, MidiEventKind, Position, RawMidiEvent, TimeInfo,
        // Geometry
        Rect, Size,
        // Errors
        ConfigError, KvtError,
    };

    pub use tether_core::fourcc;

    #[cfg(feature = "vst")]
    pub use tether_vst::{Host, LoadReport, NullHost, StateError, Wrapper};
}
