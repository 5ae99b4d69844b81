//! Sequential slot scanner shared by every store operation
//!
//! A store file is read front to back in record-sized slots. A slot is live
//! when its CRC-8 matches; anything else is corruption the caller skips. A
//! read that ends partway through a slot marks stray trailing bytes left by
//! an interrupted append, and ends the scan.

use std::io::{self, BufReader, ErrorKind, Read};
use std::marker::PhantomData;

use crate::format::{is_live, Plain, RecordLayout};

/// One full slot as read from the file.
#[derive(Debug)]
pub struct Slot<'a> {
    /// Byte offset of the slot in the file
    pub offset: u64,
    /// Raw record bytes, always `RecordLayout::<T>::SIZE` long
    pub bytes: &'a [u8],
    /// Checksum matched
    pub live: bool,
}

/// Reads fixed-size slots for payload type `T` from any byte stream.
pub struct SlotReader<R: Read, T: Plain> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    offset: u64,
    trailing_bytes: usize,
    done: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<R: Read, T: Plain> SlotReader<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: vec![0u8; RecordLayout::<T>::SIZE],
            offset: 0,
            trailing_bytes: 0,
            done: false,
            _payload: PhantomData,
        }
    }

    /// Next full slot, or None at end of data.
    ///
    /// Read errors are returned as-is; callers that treat errors as end of
    /// data do so themselves.
    pub fn next_slot(&mut self) -> io::Result<Option<Slot<'_>>> {
        if self.done {
            return Ok(None);
        }

        let filled = match read_full(&mut self.inner, &mut self.buf) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if filled < self.buf.len() {
            self.done = true;
            self.trailing_bytes = filled;
            return Ok(None);
        }

        let offset = self.offset;
        self.offset += self.buf.len() as u64;
        Ok(Some(Slot {
            offset,
            bytes: &self.buf,
            live: is_live::<T>(&self.buf),
        }))
    }

    /// Bytes consumed as full slots so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes of an incomplete slot found at end of data.
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }
}

/// Fill `buf` until full or the reader returns 0. Returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::serialize_record;
    use std::io::Cursor;

    fn file_of(records: &[(&str, u32)]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|(k, v)| serialize_record(k, v).unwrap())
            .collect()
    }

    #[test]
    fn test_scan_all_live() {
        let data = file_of(&[("a", 1), ("b", 2), ("c", 3)]);
        let mut reader = SlotReader::<_, u32>::new(Cursor::new(data));

        let mut offsets = Vec::new();
        while let Some(slot) = reader.next_slot().unwrap() {
            assert!(slot.live);
            offsets.push(slot.offset);
        }
        assert_eq!(offsets, vec![0, 37, 74]);
        assert_eq!(reader.trailing_bytes(), 0);
        assert_eq!(reader.offset(), 111);
    }

    #[test]
    fn test_corrupt_slot_flagged() {
        let mut data = file_of(&[("a", 1), ("b", 2)]);
        data[37 + 1] ^= 0x40;
        let mut reader = SlotReader::<_, u32>::new(Cursor::new(data));

        assert!(reader.next_slot().unwrap().unwrap().live);
        assert!(!reader.next_slot().unwrap().unwrap().live);
        assert!(reader.next_slot().unwrap().is_none());
    }

    #[test]
    fn test_trailing_bytes() {
        let mut data = file_of(&[("a", 1)]);
        data.extend_from_slice(&[0xAA; 10]);
        let mut reader = SlotReader::<_, u32>::new(Cursor::new(data));

        assert!(reader.next_slot().unwrap().is_some());
        assert!(reader.next_slot().unwrap().is_none());
        assert_eq!(reader.trailing_bytes(), 10);
        assert!(reader.next_slot().unwrap().is_none(), "stays finished");
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = SlotReader::<_, u32>::new(Cursor::new(Vec::new()));
        assert!(reader.next_slot().unwrap().is_none());
        assert_eq!(reader.trailing_bytes(), 0);
    }

    /// Hands out one byte per read call to exercise the fill loop.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(1);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_short_reads_reassembled() {
        let data = file_of(&[("key", 77)]);
        let mut reader = SlotReader::<_, u32>::new(Trickle(Cursor::new(data.clone())));
        let slot = reader.next_slot().unwrap().unwrap();
        assert!(slot.live);
        assert_eq!(slot.bytes, &data[..]);
    }
}
