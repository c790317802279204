//! Fixed-size binary record for persisting the [`Configuration`].
//!
//! ```text
//! <version:u8> <payload_len:u16 le> <port record x16> <crc8>
//! port record: <channel:u8> <controller:u8> <flags:u8> <min:f32 le> <max:f32 le>
//! ```
//!
//! Any mismatch in size, version or checksum makes the block unusable and the
//! caller falls back to factory defaults.

use crate::config::{Configuration, InputRange, PortConfig, PORT_COUNT};
use midi_proto::calculate_crc8;

/// Layout version. Bump whenever the record shape changes.
pub const BLOCK_VERSION: u8 = 1;

const RECORD_SIZE: usize = 11;
const HEADER_SIZE: usize = 3;
const PAYLOAD_SIZE: usize = RECORD_SIZE * PORT_COUNT;

/// Total size of an encoded block.
pub const BLOCK_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE + 1;

const FLAG_INVERT: u8 = 1 << 0;

/// Error type for block decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockError {
    /// Block or payload length does not match this firmware's layout.
    Size,
    /// Block was written by an incompatible layout version.
    Version,
    /// Contents are corrupt.
    Checksum,
}

impl core::fmt::Display for BlockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Size => write!(f, "block size mismatch"),
            Self::Version => write!(f, "block version mismatch"),
            Self::Checksum => write!(f, "block checksum mismatch"),
        }
    }
}

/// Encode a configuration into a persisted block.
#[must_use]
pub fn encode(config: &Configuration) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = BLOCK_VERSION;
    block[1..3].copy_from_slice(&(PAYLOAD_SIZE as u16).to_le_bytes());

    let records = block[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE].chunks_exact_mut(RECORD_SIZE);
    for (record, port) in records.zip(config.ports()) {
        record[0] = port.channel();
        record[1] = port.controller();
        record[2] = if port.range.invert { FLAG_INVERT } else { 0 };
        record[3..7].copy_from_slice(&port.range.min().to_le_bytes());
        record[7..11].copy_from_slice(&port.range.max().to_le_bytes());
    }

    block[BLOCK_SIZE - 1] = calculate_crc8(&block[..BLOCK_SIZE - 1]);
    block
}

/// Decode a persisted block.
///
/// Values are passed back through the clamping setters, so even a block with
/// a valid checksum cannot produce an out-of-range configuration.
///
/// # Errors
///
/// Returns a [`BlockError`] describing why the block was rejected.
pub fn decode(block: &[u8]) -> Result<Configuration, BlockError> {
    if block.len() != BLOCK_SIZE {
        return Err(BlockError::Size);
    }
    if block[0] != BLOCK_VERSION {
        return Err(BlockError::Version);
    }
    if usize::from(u16::from_le_bytes([block[1], block[2]])) != PAYLOAD_SIZE {
        return Err(BlockError::Size);
    }
    if calculate_crc8(&block[..BLOCK_SIZE - 1]) != block[BLOCK_SIZE - 1] {
        return Err(BlockError::Checksum);
    }

    let mut config = Configuration::default();
    let records = block[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE].chunks_exact(RECORD_SIZE);
    for (index, record) in records.enumerate() {
        let min = f32::from_le_bytes([record[3], record[4], record[5], record[6]]);
        let max = f32::from_le_bytes([record[7], record[8], record[9], record[10]]);
        let range = InputRange::new(min, max, record[2] & FLAG_INVERT != 0);
        if let Some(port) = config.port_mut(index) {
            *port = PortConfig::new(record[0], record[1], range);
        }
    }

    Ok(config)
}

/// Backing storage for the configuration block (flash, EEPROM, RAM in tests).
pub trait ConfigStore {
    type Error;

    /// Read the stored block into `buf`.
    fn load(&mut self, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error>;

    /// Replace the stored block.
    fn save(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error>;
}

/// Load the stored configuration, substituting defaults if it is absent or unusable.
pub fn load_or_default<S: ConfigStore>(store: &mut S) -> Configuration {
    let mut buf = [0u8; BLOCK_SIZE];
    match store.load(&mut buf) {
        Ok(()) => decode(&buf).unwrap_or_default(),
        Err(_) => Configuration::default(),
    }
}

/// Encode and store a configuration.
pub fn save<S: ConfigStore>(store: &mut S, config: &Configuration) -> Result<(), S::Error> {
    store.save(&encode(config))
}
