//! Capture file records
//!
//! ## File Format
//!
//! A capture file is a plain sequence of records:
//! `[u64_le elapsed_us][u16_le len][len bytes of framed notification]`
//!
//! `elapsed_us` is measured from the moment capture was attached to the
//! demultiplexer, so replay can reproduce the live flush cadence.

use std::io::{self, Read, Write};
use thiserror::Error;

/// Bytes preceding each notification in a record
const RECORD_HEADER_LEN: usize = 10;

/// Errors reading or writing capture files
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Truncated record at byte offset {offset}")]
    Truncated { offset: u64 },

    #[error("Notification of {0} bytes is too large to record")]
    RecordTooLarge(usize),
}

/// One captured notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedNotification {
    /// Microseconds since capture started
    pub elapsed_us: u64,
    /// Framed notification bytes, header included
    pub bytes: Vec<u8>,
}

impl CapturedNotification {
    /// Write this record
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), CaptureError> {
        let len = u16::try_from(self.bytes.len())
            .map_err(|_| CaptureError::RecordTooLarge(self.bytes.len()))?;
        writer.write_all(&self.elapsed_us.to_le_bytes())?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&self.bytes)?;
        Ok(())
    }
}

/// Iterator over the records of a capture stream
///
/// # Example
/// ```
/// use synchrony_core::capture::{CaptureReader, CapturedNotification};
///
/// let mut bytes = Vec::new();
/// CapturedNotification { elapsed_us: 5, bytes: vec![0x10, 0, 0] }
///     .write_to(&mut bytes)
///     .unwrap();
///
/// let records: Vec<_> = CaptureReader::new(bytes.as_slice())
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(records[0].elapsed_us, 5);
/// ```
pub struct CaptureReader<R> {
    reader: R,
    offset: u64,
    done: bool,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            done: false,
        }
    }

    /// Fill `buf` completely; returns the number of bytes read before EOF
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn read_record(&mut self) -> Result<Option<CapturedNotification>, CaptureError> {
        let start = self.offset;
        let mut header = [0u8; RECORD_HEADER_LEN];
        let read = self.read_full(&mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < RECORD_HEADER_LEN {
            return Err(CaptureError::Truncated { offset: start });
        }

        let mut elapsed = [0u8; 8];
        elapsed.copy_from_slice(&header[..8]);
        let elapsed_us = u64::from_le_bytes(elapsed);
        let len = u16::from_le_bytes([header[8], header[9]]) as usize;

        let mut bytes = vec![0u8; len];
        if self.read_full(&mut bytes)? < len {
            return Err(CaptureError::Truncated { offset: start });
        }

        self.offset += (RECORD_HEADER_LEN + len) as u64;
        Ok(Some(CapturedNotification { elapsed_us, bytes }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<CapturedNotification, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(elapsed_us: u64, bytes: &[u8]) -> CapturedNotification {
        CapturedNotification {
            elapsed_us,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_records_read_back_in_order() {
        let mut buf = Vec::new();
        record(0, &[0x10, 0, 0, 1, 2, 3]).write_to(&mut buf).unwrap();
        record(4000, &[0x11, 1, 0]).write_to(&mut buf).unwrap();

        let records: Vec<_> = CaptureReader::new(buf.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records, vec![record(0, &[0x10, 0, 0, 1, 2, 3]), record(4000, &[0x11, 1, 0])]);
    }

    #[test]
    fn test_truncated_trailing_record() {
        let mut buf = Vec::new();
        record(1, &[0x10, 0, 0]).write_to(&mut buf).unwrap();
        record(2, &[0x10, 1, 0, 9, 9]).write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);

        let mut reader = CaptureReader::new(buf.as_slice());
        assert!(reader.next().unwrap().is_ok());
        match reader.next() {
            Some(Err(CaptureError::Truncated { offset })) => assert_eq!(offset, 13),
            other => panic!("expected truncation error, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_stream() {
        assert!(CaptureReader::new(&[][..]).next().is_none());
    }

    #[test]
    fn test_oversized_record_rejected() {
        let big = record(0, &vec![0u8; 70_000]);
        let mut buf = Vec::new();
        assert!(matches!(
            big.write_to(&mut buf),
            Err(CaptureError::RecordTooLarge(70_000))
        ));
    }
}
