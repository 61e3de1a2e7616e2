//! Bank encoding and decoding.
//!
//! A bank is a fixed 32-byte header followed by a record stream. All integers
//! are big-endian.
//!
//! ```text
//! chunkMagic     'CcnK'
//! byteSize       total length - 8
//! fxMagic        'FBCh'
//! version        plugin version that wrote the bank
//! fxID           plugin identity
//! fxVersion      2000 for banks with KVT support
//! numPrograms    0
//! currentProgram 0
//! ```
//!
//! Banks with `fxVersion >= 2000` carry `[len:u32][name NUL][payload]`
//! records: ports first, then KVT parameters (names starting with `/`) whose
//! payload is a type tag followed by the value. Older banks carry a record
//! count followed by `[len:u8][id][payload]` entries, ports only.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, log_enabled, trace, warn, Level};

use tether_core::config::Config;
use tether_core::kvt::{KvtBlob, KvtParam, KvtStore, Pending};
use tether_core::kvt_sync::KvtShared;
use tether_core::registry::PortRegistry;

use crate::chunk::{hex_dump, split_cstr, ChunkReader, ChunkWriter, Record};
use crate::error::{Result, StateError};

pub const CHUNK_MAGIC: u32 = u32::from_be_bytes(*b"CcnK");
pub const BANK_MAGIC: u32 = u32::from_be_bytes(*b"FBCh");

/// First bank format version that carries KVT records.
pub const FX_VERSION_KVT: u32 = 2000;

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 32;

/// Smallest acceptable `byteSize`: the header without magic and size fields.
pub const MIN_BYTE_SIZE: u32 = (HEADER_SIZE - 8) as u32;

// KVT type tags.
pub const TAG_INT32: u8 = b'i';
pub const TAG_UINT32: u8 = b'u';
pub const TAG_INT64: u8 = b'I';
pub const TAG_UINT64: u8 = b'U';
pub const TAG_FLOAT32: u8 = b'f';
pub const TAG_FLOAT64: u8 = b'F';
pub const TAG_STRING: u8 = b's';
pub const TAG_BLOB: u8 = b'B';

/// Record layout used by a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankFormat {
    /// Positional records, ports only.
    V1,
    /// Named records, ports then KVT.
    V2,
}

/// Decoded bank header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankHeader {
    pub byte_size: u32,
    pub version: u32,
    pub fx_id: u32,
    pub fx_version: u32,
    pub num_programs: u32,
    pub current_program: u32,
}

impl BankHeader {
    /// Parse and validate the header against the running plugin.
    ///
    /// Checks run in a fixed order: chunk magic, size, format magic,
    /// identity, version, program count.
    pub fn parse(data: &[u8], config: &Config) -> Result<Self> {
        let mut reader = ChunkReader::new(data);

        let magic = reader.read_u32().ok_or(StateError::TooSmall(data.len()))?;
        if magic != CHUNK_MAGIC {
            return Err(StateError::BadChunkMagic(magic));
        }

        let byte_size = reader.read_u32().ok_or(StateError::TooSmall(data.len()))?;
        if byte_size < MIN_BYTE_SIZE || data.len() < HEADER_SIZE {
            return Err(StateError::TooSmall(data.len().min(byte_size as usize + 8)));
        }

        // The length check above guarantees the remaining header fields.
        let mut field = || reader.read_u32().unwrap_or_default();
        let fx_magic = field();
        let header = Self {
            byte_size,
            version: field(),
            fx_id: field(),
            fx_version: field(),
            num_programs: field(),
            current_program: field(),
        };

        if fx_magic != BANK_MAGIC {
            return Err(StateError::BadFormatMagic(fx_magic));
        }
        let expected = config.unique_id.as_u32();
        if header.fx_id != expected {
            return Err(StateError::IdentityMismatch {
                expected,
                found: header.fx_id,
            });
        }
        if header.version > config.version {
            return Err(StateError::UnsupportedVersion {
                supported: config.version,
                found: header.version,
            });
        }
        if header.num_programs != 0 {
            return Err(StateError::ProgramsPresent(header.num_programs));
        }

        Ok(header)
    }

    pub fn format(&self) -> BankFormat {
        if self.fx_version < FX_VERSION_KVT {
            BankFormat::V1
        } else {
            BankFormat::V2
        }
    }
}

/// Outcome of a bank load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub format: BankFormat,
    /// Port records decoded and applied.
    pub ports_applied: usize,
    /// Port records skipped (unknown id or decode failure).
    pub ports_skipped: usize,
    /// KVT records stored.
    pub kvt_applied: usize,
    /// KVT records discarded (unknown tag, bad size, bad name).
    pub kvt_discarded: usize,
    /// A record ran past the end of the bank.
    pub truncated: bool,
}

impl LoadReport {
    fn new(format: BankFormat) -> Self {
        Self {
            format,
            ports_applied: 0,
            ports_skipped: 0,
            kvt_applied: 0,
            kvt_discarded: 0,
            truncated: false,
        }
    }
}

// =============================================================================
// Serialize
// =============================================================================

/// Encode the persistable state of `ports` and `kvt` as a v2 bank.
///
/// Fails without producing output if a KVT value cannot be persisted.
pub fn serialize(config: &Config, ports: &PortRegistry, kvt: &KvtShared) -> Result<Vec<u8>> {
    let mut w = ChunkWriter::with_capacity(4096);

    w.write_u32(CHUNK_MAGIC);
    let size = w.reserve_u32();
    w.write_u32(BANK_MAGIC);
    w.write_u32(config.version);
    w.write_u32(config.unique_id.as_u32());
    w.write_u32(FX_VERSION_KVT);
    w.write_u32(0);
    w.write_u32(0);

    for (port, meta) in ports.iter_with_meta() {
        if meta.id.is_empty() || meta.is_output() || !port.serializable() {
            continue;
        }
        let record = w.reserve_u32();
        w.write_cstr(&meta.id);
        port.serialize(w.buffer())?;
        w.patch_len(record);
    }

    {
        let mut store = kvt.lock();
        let written = write_kvt(&mut w, &store);
        store.gc();
        written?;
    }

    w.patch_len(size);
    let bank = w.into_inner();

    debug!("Saved bank: {} bytes", bank.len());
    if log_enabled!(Level::Trace) {
        trace!("Bank dump:\n{}", hex_dump(&bank));
    }
    Ok(bank)
}

fn write_kvt(w: &mut ChunkWriter, store: &KvtStore) -> Result<()> {
    for (name, value) in store.iter() {
        let record = w.reserve_u32();
        w.write_cstr(name);
        match value {
            KvtParam::Int32(v) => {
                w.write_u8(TAG_INT32);
                w.write_i32(*v);
            }
            KvtParam::Uint32(v) => {
                w.write_u8(TAG_UINT32);
                w.write_u32(*v);
            }
            KvtParam::Int64(v) => {
                w.write_u8(TAG_INT64);
                w.write_i64(*v);
            }
            KvtParam::Uint64(v) => {
                w.write_u8(TAG_UINT64);
                w.write_u64(*v);
            }
            KvtParam::Float32(v) => {
                w.write_u8(TAG_FLOAT32);
                w.write_f32(*v);
            }
            KvtParam::Float64(v) => {
                w.write_u8(TAG_FLOAT64);
                w.write_f64(*v);
            }
            KvtParam::String(s) => {
                w.write_u8(TAG_STRING);
                w.write_cstr(s);
            }
            KvtParam::Blob(blob) => {
                if !blob.is_valid() {
                    warn!("KVT blob {name} announces {} bytes without data", blob.size());
                    w.rewind(record);
                    return Err(StateError::InvalidKvtValue(name.to_owned()));
                }
                w.write_u8(TAG_BLOB);
                w.write_cstr(blob.content_type().unwrap_or(""));
                w.write_bytes(blob.data().unwrap_or(&[]));
            }
        }
        w.patch_len(record);
        trace!("Saved KVT parameter {name} = {}", value.dump());
    }
    Ok(())
}

// =============================================================================
// Deserialize
// =============================================================================

/// Apply a bank to `ports` and `kvt`.
///
/// A header that fails validation leaves both untouched. Records are applied
/// best-effort; see [`LoadReport`] for what was taken.
pub fn deserialize(
    config: &Config,
    ports: &mut PortRegistry,
    kvt: &KvtShared,
    data: &[u8],
) -> Result<LoadReport> {
    if log_enabled!(Level::Trace) {
        trace!("Loading bank:\n{}", hex_dump(data));
    }

    let header = BankHeader::parse(data, config).map_err(|err| {
        warn!("Rejected bank: {err}");
        err
    })?;

    let end = data.len().min(header.byte_size as usize + 8);
    let body = &data[HEADER_SIZE..end];

    let report = match header.format() {
        BankFormat::V1 => load_v1(ports, body),
        BankFormat::V2 => load_v2(ports, kvt, body),
    };

    debug!(
        "Loaded {:?} bank: {} ports applied, {} skipped, {} KVT applied, {} discarded{}",
        report.format,
        report.ports_applied,
        report.ports_skipped,
        report.kvt_applied,
        report.kvt_discarded,
        if report.truncated { ", truncated" } else { "" }
    );
    Ok(report)
}

fn load_v1(ports: &mut PortRegistry, body: &[u8]) -> LoadReport {
    let mut report = LoadReport::new(BankFormat::V1);
    let mut reader = ChunkReader::new(body);

    let Some(count) = reader.read_u32() else {
        report.truncated = true;
        return report;
    };

    for _ in 0..count {
        let Some(id) = reader.read_pascal() else {
            report.truncated = true;
            break;
        };
        let id = String::from_utf8_lossy(id);
        let Some(port) = ports.find_by_id(&id).and_then(|index| ports.port_mut(index)) else {
            warn!("Legacy bank references unknown port '{id}', ignoring the rest");
            report.ports_skipped += 1;
            break;
        };
        match port.deserialize_v1(reader.rest()) {
            Some(consumed) => {
                let _ = reader.skip(consumed);
                report.ports_applied += 1;
                trace!("Loaded legacy port {id}");
            }
            None => {
                warn!("Failed to decode legacy port '{id}', ignoring the rest");
                report.ports_skipped += 1;
                break;
            }
        }
    }

    report
}

fn load_v2(ports: &mut PortRegistry, kvt: &KvtShared, body: &[u8]) -> LoadReport {
    let mut report = LoadReport::new(BankFormat::V2);
    let mut reader = ChunkReader::new(body);
    let mut first_kvt = None;

    while reader.remaining() > 0 {
        let Some(record) = reader.read_record() else {
            report.truncated = true;
            break;
        };
        if record.name.first() == Some(&b'/') {
            first_kvt = Some(record);
            break;
        }
        load_port(ports, &record, &mut report);
    }

    // A bank that never reaches the KVT section leaves the store alone.
    let Some(record) = first_kvt else {
        return report;
    };

    let mut store = kvt.lock();
    store.clear();
    load_kvt(&mut store, &record, &mut report);
    while reader.remaining() > 0 {
        let Some(record) = reader.read_record() else {
            report.truncated = true;
            break;
        };
        load_kvt(&mut store, &record, &mut report);
    }
    store.gc();

    report
}

fn load_port(ports: &mut PortRegistry, record: &Record<'_>, report: &mut LoadReport) {
    let id = String::from_utf8_lossy(record.name);
    let target = ports.find_by_id(&id).and_then(|index| ports.port_mut(index));
    match target {
        Some(port) if port.serializable() => {
            if port.deserialize_v2(record.payload) {
                report.ports_applied += 1;
                trace!("Loaded port {id}");
            } else {
                warn!("Failed to decode port '{id}'");
                report.ports_skipped += 1;
            }
        }
        _ => {
            debug!("Skipping unknown port '{id}'");
            report.ports_skipped += 1;
        }
    }
}

fn load_kvt(store: &mut KvtStore, record: &Record<'_>, report: &mut LoadReport) {
    let Ok(name) = std::str::from_utf8(record.name) else {
        report.kvt_discarded += 1;
        return;
    };
    let Some(value) = decode_kvt(record.payload) else {
        warn!("Discarding KVT parameter {name}: unsupported payload");
        report.kvt_discarded += 1;
        return;
    };
    trace!("Loaded KVT parameter {name} = {}", value.dump());
    match store.put(name, value, Some(Pending::ToUi)) {
        Ok(()) => report.kvt_applied += 1,
        Err(err) => {
            warn!("Discarding KVT parameter: {err}");
            report.kvt_discarded += 1;
        }
    }
}

fn decode_kvt(payload: &[u8]) -> Option<KvtParam> {
    let (&tag, data) = payload.split_first()?;
    let value = match tag {
        TAG_INT32 => KvtParam::Int32(BigEndian::read_i32(fixed(data, 4)?)),
        TAG_UINT32 => KvtParam::Uint32(BigEndian::read_u32(fixed(data, 4)?)),
        TAG_INT64 => KvtParam::Int64(BigEndian::read_i64(fixed(data, 8)?)),
        TAG_UINT64 => KvtParam::Uint64(BigEndian::read_u64(fixed(data, 8)?)),
        TAG_FLOAT32 => KvtParam::Float32(BigEndian::read_f32(fixed(data, 4)?)),
        TAG_FLOAT64 => KvtParam::Float64(BigEndian::read_f64(fixed(data, 8)?)),
        TAG_STRING => {
            let (text, _) = split_cstr(data);
            KvtParam::String(std::str::from_utf8(text).ok()?.to_owned())
        }
        TAG_BLOB => {
            let nul = data.iter().position(|&b| b == 0)?;
            let content_type = std::str::from_utf8(&data[..nul]).ok()?;
            let content_type = (!content_type.is_empty()).then_some(content_type);
            KvtParam::Blob(KvtBlob::new(content_type, data[nul + 1..].to_vec()))
        }
        _ => return None,
    };
    Some(value)
}

/// `data` if it is exactly `len` bytes long.
fn fixed(data: &[u8], len: usize) -> Option<&[u8]> {
    (data.len() == len).then_some(data)
}
