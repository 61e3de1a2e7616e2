//! # tether-core
//!
//! Format-agnostic building blocks of the Tether plugin state bridge.
//!
//! - [`metadata`]: static port declarations, including port-group templates
//! - [`registry`] and [`ports`]: concrete ports built from the declarations
//! - [`kvt`] and [`kvt_sync`]: the typed key-value side store and its
//!   cross-context sync bridge
//! - [`position`]: transport snapshot refreshed every block
//! - [`plugin`]: traits implemented by the wrapped engine and its editor
//!
//! ```text
//! &'static [PortMeta]
//!        ↓
//! PortRegistry ──→ processing loop ──→ Engine
//!        ↓
//! bank codec ←── KvtShared ──→ Editor
//! ```

pub mod config;
pub mod error;
pub mod kvt;
pub mod kvt_sync;
pub mod metadata;
pub mod midi;
pub mod plugin;
pub mod ports;
pub mod position;
pub mod registry;

pub use config::{Config, ConfigFile, FourCharCode};
pub use error::{ConfigError, KvtError, KvtResult};
pub use kvt::{KvtBlob, KvtChange, KvtParam, KvtStore, Pending};
pub use kvt_sync::{KvtObserver, KvtShared, SyncOutcome};
pub use metadata::{Direction, PortMeta, Role, RowScale};
pub use midi::{MidiBuffer, MidiEvent, MidiEventKind, RawMidiEvent};
pub use plugin::{Block, Editor, Engine, Rect, Size};
pub use ports::{Port, PortKind};
pub use position::{Position, TimeInfo};
pub use registry::{MetaId, PortRegistry};
