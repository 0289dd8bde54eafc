//! Streaming log record decoder.

use crate::command::Command;
use crate::error::{CodecError, CodecResult};
use std::io::{self, BufRead};

/// Largest accepted element count in a record header.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Largest accepted bulk string payload.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Decode every command in `bytes`.
///
/// # Errors
///
/// Returns an error if any record is malformed or truncated.
pub fn decode_all(bytes: &[u8]) -> CodecResult<Vec<Command>> {
    let mut reader = CommandReader::new(bytes);
    let mut commands = Vec::new();
    while let Some(command) = reader.next_command()? {
        commands.push(command);
    }
    Ok(commands)
}

/// A streaming reader of log records.
///
/// The reader tracks [`offset`](Self::offset): the number of input bytes
/// covered by fully decoded records. When a record fails to decode, the
/// offset still points at its first byte, which is where a torn log must be
/// truncated.
///
/// Stray NUL bytes between records are skipped. Records with zero elements
/// are consumed and ignored.
#[derive(Debug)]
pub struct CommandReader<R> {
    inner: R,
    offset: u64,
    line: Vec<u8>,
}

impl<R: BufRead> CommandReader<R> {
    /// Creates a reader over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            line: Vec::with_capacity(32),
        }
    }

    /// Returns the end offset of the last complete record.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Consumes the reader and returns the underlying input.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Decodes the next command, or `None` at a clean end of input.
    ///
    /// # Errors
    ///
    /// - [`CodecError::UnexpectedEof`] if the input ends mid-record
    /// - [`CodecError::Invalid`] if a header or terminator is malformed
    /// - [`CodecError::Io`] if the underlying reader fails
    pub fn next_command(&mut self) -> CodecResult<Option<Command>> {
        loop {
            self.offset += self.skip_nuls()?;

            let Some(header) = self.read_line()? else {
                return Ok(None);
            };
            let mut consumed = header as u64;
            if self.line[0] != b'*' {
                return Err(CodecError::invalid(format!(
                    "expected '*' at offset {}",
                    self.offset
                )));
            }
            let count = parse_length(&self.line[1..])?;
            if count > MAX_ARRAY_LEN {
                return Err(CodecError::invalid(format!(
                    "record has too many elements: {count}"
                )));
            }

            let mut parts = Vec::with_capacity(count.min(8));
            for _ in 0..count {
                let header = self.read_line()?.ok_or(CodecError::UnexpectedEof)?;
                if self.line[0] != b'$' {
                    return Err(CodecError::invalid(format!(
                        "expected '$' in record at offset {}",
                        self.offset
                    )));
                }
                let len = parse_length(&self.line[1..])?;
                if len > MAX_BULK_LEN {
                    return Err(CodecError::invalid(format!(
                        "bulk string too large: {len}"
                    )));
                }

                let mut data = vec![0u8; len + 2];
                self.inner.read_exact(&mut data).map_err(eof_aware)?;
                if &data[len..] != b"\r\n" {
                    return Err(CodecError::invalid(format!(
                        "bulk string not terminated by CRLF in record at offset {}",
                        self.offset
                    )));
                }
                data.truncate(len);
                parts.push(data);
                consumed += (header + len + 2) as u64;
            }

            if parts.is_empty() {
                self.offset += consumed;
                continue;
            }

            let command = Command::from_parts(parts)?;
            self.offset += consumed;
            return Ok(Some(command));
        }
    }

    fn skip_nuls(&mut self) -> CodecResult<u64> {
        let mut skipped = 0u64;
        loop {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                return Ok(skipped);
            }
            let nuls = buf.iter().take_while(|&&b| b == 0).count();
            let exhausted = nuls == buf.len();
            self.inner.consume(nuls);
            skipped += nuls as u64;
            if !exhausted {
                return Ok(skipped);
            }
        }
    }

    /// Reads one `\n`-terminated line into `self.line`, returning its length.
    fn read_line(&mut self) -> CodecResult<Option<usize>> {
        self.line.clear();
        let n = self.inner.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.last() != Some(&b'\n') {
            return Err(CodecError::UnexpectedEof);
        }
        Ok(Some(n))
    }
}

impl<R: BufRead> Iterator for CommandReader<R> {
    type Item = CodecResult<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_command().transpose()
    }
}

/// Parses `<digits>\r\n`.
fn parse_length(line: &[u8]) -> CodecResult<usize> {
    let digits = line
        .strip_suffix(b"\r\n")
        .ok_or_else(|| CodecError::invalid("header not terminated by CRLF"))?;
    if digits.is_empty() {
        return Err(CodecError::invalid("empty length in header"));
    }

    let mut n: usize = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(CodecError::invalid(format!(
                "non-digit {:?} in header length",
                b as char
            )));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(usize::from(b - b'0')))
            .ok_or_else(|| CodecError::invalid("header length overflows"))?;
    }
    Ok(n)
}

fn eof_aware(err: io::Error) -> CodecError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::UnexpectedEof
    } else {
        CodecError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CommandEncoder;

    fn sample_log() -> Vec<u8> {
        let mut enc = CommandEncoder::new();
        enc.set(b"a", b"1", None);
        enc.set(b"b", b"2", Some(60));
        enc.del(b"a");
        enc.flushdb();
        enc.as_bytes().to_vec()
    }

    #[test]
    fn decode_sequence() {
        let commands = decode_all(&sample_log()).unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[1].key(), Some(&b"b"[..]));
        assert!(matches!(commands[1], Command::Set { ttl: Some(60), .. }));
        assert_eq!(commands[2], Command::Del { key: b"a".to_vec() });
        assert_eq!(commands[3], Command::FlushDb);
    }

    #[test]
    fn offset_tracks_complete_records() {
        let log = sample_log();
        let mut reader = CommandReader::new(&log[..]);
        while reader.next_command().unwrap().is_some() {}
        assert_eq!(reader.offset(), log.len() as u64);
    }

    #[test]
    fn every_truncation_is_unexpected_eof() {
        let log = sample_log();
        let first_len = {
            let mut enc = CommandEncoder::new();
            enc.set(b"a", b"1", None);
            enc.len()
        };

        for cut in 1..first_len {
            let mut reader = CommandReader::new(&log[..cut]);
            let err = reader.next_command().unwrap_err();
            assert!(err.is_unexpected_eof(), "cut at {cut}: {err}");
            assert_eq!(reader.offset(), 0);
        }
    }

    #[test]
    fn torn_tail_keeps_offset_of_last_record() {
        let log = sample_log();
        let mut enc = CommandEncoder::new();
        enc.set(b"a", b"1", None);
        let first = enc.len();

        let mut reader = CommandReader::new(&log[..first + 5]);
        assert!(reader.next_command().unwrap().is_some());
        assert!(reader.next_command().unwrap_err().is_unexpected_eof());
        assert_eq!(reader.offset(), first as u64);
    }

    #[test]
    fn nul_bytes_are_skipped() {
        let mut log = vec![0, 0, 0];
        log.extend_from_slice(b"*2\r\n$3\r\ndel\r\n$1\r\nk\r\n");
        log.extend_from_slice(&[0, 0]);

        let mut reader = CommandReader::new(&log[..]);
        assert_eq!(
            reader.next_command().unwrap(),
            Some(Command::Del { key: b"k".to_vec() })
        );
        assert_eq!(reader.next_command().unwrap(), None);
        assert_eq!(reader.offset(), log.len() as u64);
    }

    #[test]
    fn empty_array_is_ignored() {
        let log = b"*0\r\n*1\r\n$7\r\nFLUSHDB\r\n";
        assert_eq!(decode_all(log).unwrap(), vec![Command::FlushDb]);
    }

    #[test]
    fn malformed_headers_are_invalid() {
        let cases: &[&[u8]] = &[
            b"+OK\r\n",
            b"*x\r\n",
            b"*\r\n",
            b"*1\n$3\r\ndel\r\n",
            b"*2\r\n:3\r\ndel\r\n",
            b"*2\r\n$3\r\ndelXX$1\r\nk\r\n",
            b"*2\r\n$-1\r\n",
        ];
        for case in cases {
            let err = decode_all(case).unwrap_err();
            assert!(
                matches!(err, CodecError::Invalid { .. }),
                "{:?}: {err}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn oversized_length_is_invalid() {
        let err = decode_all(b"*1\r\n$99999999999\r\n").unwrap_err();
        assert!(matches!(err, CodecError::Invalid { .. }));
    }

    #[test]
    fn iterator_yields_commands() {
        let log = sample_log();
        let names: Vec<_> = CommandReader::new(&log[..])
            .map(|c| c.unwrap().name())
            .collect();
        assert_eq!(names, ["set", "set", "del", "flushdb"]);
    }
}
