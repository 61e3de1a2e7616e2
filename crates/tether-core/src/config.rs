//! Plugin configuration.
//!
//! A [`Config`] carries the identity the state codec stamps into every bank
//! and the few runtime knobs the wrapper needs. It can be declared statically
//! or loaded from a `Config.toml` document through [`ConfigFile`].
//!
//! # Example
//!
//! ```ignore
//! use tether_core::{fourcc, Config};
//!
//! pub static CONFIG: Config = Config::new("Para EQ", fourcc!(b"PEq8"))
//!     .with_vendor("Tether Audio")
//!     .with_version(1003);
//! ```

use std::borrow::Cow;

use serde::Deserialize;

use crate::error::ConfigError;

// =========================================================================
// FourCharCode
// =========================================================================

/// Four-character code used as the plugin identity in persisted banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    /// Create a new FourCharCode from a 4-byte array.
    ///
    /// # Panics
    /// Debug builds will panic if any byte is not ASCII.
    pub const fn new(bytes: &[u8; 4]) -> Self {
        debug_assert!(bytes[0].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[1].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[2].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[3].is_ascii(), "FourCC bytes must be ASCII");
        Self(*bytes)
    }

    /// Parse from a 4-character ASCII string.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        bytes.iter().all(u8::is_ascii).then_some(Self(bytes))
    }

    /// Get the FourCC as a 32-bit value (big-endian).
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the FourCC as a string slice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Macro for creating FourCharCode at compile time with validation.
#[macro_export]
macro_rules! fourcc {
    ($s:literal) => {{
        const BYTES: &[u8] = $s;
        const _: () = assert!(BYTES.len() == 4, "FourCC must be exactly 4 bytes");
        $crate::config::FourCharCode::new(&[BYTES[0], BYTES[1], BYTES[2], BYTES[3]])
    }};
}

// =========================================================================
// Config
// =========================================================================

/// Default resolution of the transport tick counter.
pub const DEFAULT_TICKS_PER_BEAT: f64 = 1920.0;

/// Default number of MIDI events an input port buffers per block.
pub const DEFAULT_MIDI_EVENTS: usize = 1024;

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Plugin name.
    pub name: Cow<'static, str>,

    /// Vendor/company name.
    pub vendor: Cow<'static, str>,

    /// Host-visible plugin identity. Banks carrying another identity are
    /// rejected on load.
    pub unique_id: FourCharCode,

    /// Plugin version. Banks written by a newer version are rejected.
    pub version: u32,

    /// Dump every KVT transfer to the log. Always on in debug builds.
    pub kvt_trace: bool,

    /// Tick resolution reported in the transport position.
    pub ticks_per_beat: f64,

    /// Capacity of each MIDI input port's event buffer.
    pub midi_events: usize,
}

impl Config {
    pub const fn new(name: &'static str, unique_id: FourCharCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            vendor: Cow::Borrowed(""),
            unique_id,
            version: 1000,
            kvt_trace: false,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            midi_events: DEFAULT_MIDI_EVENTS,
        }
    }

    /// Set the vendor name.
    ///
    /// Meant for static declarations. An owned vendor set before is leaked.
    pub const fn with_vendor(self, vendor: &'static str) -> Self {
        let Self {
            name,
            vendor: previous,
            unique_id,
            version,
            kvt_trace,
            ticks_per_beat,
            midi_events,
        } = self;
        // Dropping a Cow is not allowed in a const fn.
        std::mem::forget(previous);
        Self {
            name,
            vendor: Cow::Borrowed(vendor),
            unique_id,
            version,
            kvt_trace,
            ticks_per_beat,
            midi_events,
        }
    }

    /// Set the plugin version.
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable KVT tracing in release builds.
    pub const fn with_kvt_trace(mut self, enabled: bool) -> Self {
        self.kvt_trace = enabled;
        self
    }

    /// Set the transport tick resolution.
    pub const fn with_ticks_per_beat(mut self, ticks: f64) -> Self {
        self.ticks_per_beat = ticks;
        self
    }

    /// Set the MIDI input buffer capacity.
    pub const fn with_midi_events(mut self, events: usize) -> Self {
        self.midi_events = events;
        self
    }

    /// Whether KVT traffic should be dumped to the log.
    pub fn trace_kvt(&self) -> bool {
        self.kvt_trace || cfg!(debug_assertions)
    }
}

// =========================================================================
// Config.toml
// =========================================================================

/// Plugin configuration from Config.toml.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    /// Plugin display name.
    pub name: String,
    /// 4-character plugin identity.
    pub unique_id: String,
    /// Vendor display name.
    pub vendor: Option<String>,
    /// Plugin version (default: 1000).
    pub version: Option<u32>,
    /// Dump KVT traffic in release builds.
    #[serde(default)]
    pub kvt_trace: bool,
    /// Transport tick resolution (default: 1920).
    pub ticks_per_beat: Option<f64>,
    /// MIDI input buffer capacity (default: 1024).
    pub midi_events: Option<usize>,
}

impl ConfigFile {
    /// Parse a Config.toml document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Validate the config file contents.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if FourCharCode::parse(&self.unique_id).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unique_id must be exactly 4 ASCII characters, got {:?}",
                self.unique_id
            )));
        }
        if let Some(ticks) = self.ticks_per_beat {
            if ticks.is_nan() || ticks <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "ticks_per_beat must be positive, got {ticks}"
                )));
            }
        }
        if self.midi_events == Some(0) {
            return Err(ConfigError::Invalid("midi_events must be non-zero".into()));
        }
        Ok(())
    }

    /// Validate and convert into a [`Config`].
    pub fn into_config(self) -> Result<Config, ConfigError> {
        self.validate()?;
        let unique_id = FourCharCode::parse(&self.unique_id)
            .ok_or_else(|| ConfigError::Invalid(format!("bad unique_id {:?}", self.unique_id)))?;

        Ok(Config {
            name: Cow::Owned(self.name),
            vendor: Cow::Owned(self.vendor.unwrap_or_default()),
            unique_id,
            version: self.version.unwrap_or(1000),
            kvt_trace: self.kvt_trace,
            ticks_per_beat: self.ticks_per_beat.unwrap_or(DEFAULT_TICKS_PER_BEAT),
            midi_events: self.midi_events.unwrap_or(DEFAULT_MIDI_EVENTS),
        })
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        ConfigFile::from_toml(source)?.into_config()
    }
}
