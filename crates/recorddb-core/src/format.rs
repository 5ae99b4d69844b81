//! On-disk record layout for RecordDB store files
//!
//! A store file is a raw concatenation of fixed-size records with no header,
//! magic or count:
//!
//!   [0..32]          key:      [u8; 32] - NUL-padded, at most 31 key bytes
//!   [32..32+N]       payload:  [u8; N]  - native byte image of T, N = size_of::<T>()
//!   [32+N]           checksum: u8       - CRC-8 of bytes [0..32+N]
//!
//! The payload is copied as-is, so a file is only readable by a build with
//! the same layout for T.

use std::marker::PhantomData;
use std::mem::size_of;

use crate::checksum::crc8;
use crate::error::{RecordError, RecordResult};

/// Bytes reserved for the key, terminator included
pub const KEY_CAPACITY: usize = 32;

/// Longest key accepted (one byte is kept for the NUL terminator)
pub const MAX_KEY_LEN: usize = KEY_CAPACITY - 1;

/// Trailing checksum byte
pub const CHECKSUM_SIZE: usize = 1;

/// Default compaction sidecar path
pub const DEFAULT_TEMP_PATH: &str = "/temp.db";

/// Plain-data payloads that can be stored as their raw byte image.
///
/// # Safety
/// Implementors must be `#[repr(C)]` (or a primitive) with no padding bytes,
/// no pointers or references, and every bit pattern must be a valid value.
/// The store copies the value to and from disk with a byte-wise memcpy.
pub unsafe trait Plain: Copy + 'static {}

macro_rules! impl_plain {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive numeric types have no padding and accept any bit pattern.
            unsafe impl Plain for $t {}
        )*
    };
}

impl_plain!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

// SAFETY: an array of Plain elements has no padding between elements.
unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// Compile-time record geometry for payload type `T`.
pub struct RecordLayout<T>(PhantomData<T>);

impl<T: Plain> RecordLayout<T> {
    /// Payload bytes per record
    pub const PAYLOAD_SIZE: usize = size_of::<T>();

    /// Offset of the checksum byte
    pub const CHECKSUM_OFFSET: usize = KEY_CAPACITY + Self::PAYLOAD_SIZE;

    /// Total bytes per record slot
    pub const SIZE: usize = Self::CHECKSUM_OFFSET + CHECKSUM_SIZE;
}

/// Check a key against the record layout.
///
/// Keys longer than `MAX_KEY_LEN` would lose their terminator, and an
/// interior NUL would make the stored key compare shorter than the caller's.
pub fn validate_key(key: &str) -> RecordResult<()> {
    let bytes = key.as_bytes();
    if bytes.len() > MAX_KEY_LEN {
        return Err(RecordError::InvalidKey {
            len: bytes.len(),
            max: MAX_KEY_LEN,
            reason: "key too long",
        });
    }
    if bytes.contains(&0) {
        return Err(RecordError::InvalidKey {
            len: bytes.len(),
            max: MAX_KEY_LEN,
            reason: "key contains NUL byte",
        });
    }
    Ok(())
}

/// Serialize one record into `buf`, which must be exactly `RecordLayout::<T>::SIZE` long.
///
/// The buffer is zero-filled first so unused key bytes are deterministic.
pub fn encode_record<T: Plain>(key: &str, value: &T, buf: &mut [u8]) -> RecordResult<()> {
    validate_key(key)?;
    debug_assert_eq!(buf.len(), RecordLayout::<T>::SIZE);

    buf.fill(0);
    buf[..key.len()].copy_from_slice(key.as_bytes());
    buf[KEY_CAPACITY..RecordLayout::<T>::CHECKSUM_OFFSET].copy_from_slice(payload_bytes(value));
    let crc = crc8(&buf[..RecordLayout::<T>::CHECKSUM_OFFSET]);
    buf[RecordLayout::<T>::CHECKSUM_OFFSET] = crc;
    Ok(())
}

/// Build a freshly allocated record.
pub fn serialize_record<T: Plain>(key: &str, value: &T) -> RecordResult<Vec<u8>> {
    let mut buf = vec![0u8; RecordLayout::<T>::SIZE];
    encode_record(key, value, &mut buf)?;
    Ok(buf)
}

/// True when the slot's trailing checksum matches its contents.
pub fn is_live<T: Plain>(slot: &[u8]) -> bool {
    slot.len() == RecordLayout::<T>::SIZE
        && crc8(&slot[..RecordLayout::<T>::CHECKSUM_OFFSET]) == slot[RecordLayout::<T>::CHECKSUM_OFFSET]
}

/// Key bytes of a slot, up to the first NUL.
pub fn slot_key(slot: &[u8]) -> &[u8] {
    let raw = &slot[..KEY_CAPACITY];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(KEY_CAPACITY);
    &raw[..end]
}

/// Whether a slot holds `key`. Does not look at the checksum.
pub fn key_matches(slot: &[u8], key: &str) -> bool {
    slot_key(slot) == key.as_bytes()
}

/// Copy the payload out of a slot.
pub fn decode_payload<T: Plain>(slot: &[u8]) -> T {
    let payload = &slot[KEY_CAPACITY..RecordLayout::<T>::CHECKSUM_OFFSET];
    // SAFETY: `payload` is exactly size_of::<T>() bytes and T: Plain accepts
    // any bit pattern. read_unaligned because the slot buffer is only byte aligned.
    unsafe { std::ptr::read_unaligned(payload.as_ptr().cast::<T>()) }
}

fn payload_bytes<T: Plain>(value: &T) -> &[u8] {
    // SAFETY: T: Plain has no padding, so all size_of::<T>() bytes are initialized.
    unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) }
}
