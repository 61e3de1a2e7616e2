//! # tether-vst
//!
//! Chunk-based wrapper layer for the Tether state bridge.
//!
//! - [`Wrapper`]: drives an [`Engine`](tether_core::Engine) once per block,
//!   attaches an editor and moves KVT changes between the render and UI sides
//! - [`codec`]: the `'CcnK'`/`'FBCh'` bank format, current and legacy
//! - [`Host`]: callbacks into the host application
//!
//! ```text
//! Host ──→ Wrapper<E, H> ──→ Engine
//!              │
//!              ├── PortRegistry
//!              └── Arc<KvtShared> ──→ Editor
//! ```

pub mod chunk;
pub mod codec;
pub mod error;
pub mod host;
pub mod wrapper;

pub use codec::{BankFormat, BankHeader, LoadReport};
pub use error::{Result, StateError};
pub use host::{Host, NullHost};
pub use wrapper::{BoxedEditor, BoxedListener, Wrapper};
