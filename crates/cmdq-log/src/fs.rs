//! Single-file command log.
//!
//! Each command is one frame: a little-endian `u32` length followed by a CBOR
//! map of `{seq, kind, payload}`. Opening the file scans every frame once and
//! keeps the byte position of each offset, so tailing reads only the frames at
//! or after the requested offset.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{CommandLog, LogEntry, LogError, LogKind, LogSeq, OwnedLogEntry};

const LOG_DIR: &str = "log";
const LOG_FILE: &str = "commands.log";
const HEADER_LEN: u64 = 4;

#[derive(Serialize)]
struct Frame<'a> {
    seq: LogSeq,
    kind: LogKind,
    #[serde(with = "serde_bytes")]
    payload: &'a [u8],
}

/// Filesystem-backed log at `<root>/log/commands.log`, synced on every append.
#[derive(Debug)]
pub struct FsLog {
    path: PathBuf,
    file: File,
    /// Byte position of the frame holding each offset.
    frames: Vec<u64>,
    /// Length of the committed prefix of the file.
    end: u64,
}

impl FsLog {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = root.as_ref().join(LOG_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut frames = Vec::new();
        let mut reader = BufReader::new(&file);
        let mut pos = 0;
        while let Some((entry, len)) = read_frame(&mut reader)? {
            check_seq(&entry, frames.len() as LogSeq)?;
            frames.push(pos);
            pos += len;
        }
        log::debug!(
            "opened command log {} with {} command(s)",
            path.display(),
            frames.len()
        );
        Ok(Self {
            path,
            file,
            frames,
            end: pos,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandLog for FsLog {
    fn append(&mut self, entry: LogEntry<'_>) -> Result<LogSeq, LogError> {
        let seq = self.frames.len() as LogSeq;
        let body = serde_cbor::to_vec(&Frame {
            seq,
            kind: entry.kind,
            payload: entry.payload,
        })?;
        let len = u32::try_from(body.len())
            .map_err(|_| LogError::Corrupt(format!("command at offset {seq} exceeds 4GiB")))?;
        let mut frame = Vec::with_capacity(body.len() + HEADER_LEN as usize);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);

        let start = self.end;
        write_frame(&self.file, &mut &self.file, start, &frame)?;
        self.frames.push(start);
        self.end = start + frame.len() as u64;
        Ok(seq)
    }

    fn load_from(&self, from: LogSeq) -> Result<Vec<OwnedLogEntry>, LogError> {
        let Some(&start) = usize::try_from(from)
            .ok()
            .and_then(|idx| self.frames.get(idx))
        else {
            return Ok(Vec::new());
        };
        let mut reader = BufReader::new(&self.file);
        reader.seek(SeekFrom::Start(start))?;
        let mut reader = reader.take(self.end - start);

        let mut entries = Vec::with_capacity(self.frames.len() - from as usize);
        while let Some((entry, _)) = read_frame(&mut reader)? {
            check_seq(&entry, from + entries.len() as LogSeq)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn next_seq(&self) -> LogSeq {
        self.frames.len() as LogSeq
    }
}

/// Writes and syncs one frame at `start`. On failure the file is cut back to
/// `start` so no partial frame is left behind.
fn write_frame(
    file: &File,
    sink: &mut impl Write,
    start: u64,
    frame: &[u8],
) -> Result<(), LogError> {
    let written = sink
        .write_all(frame)
        .and_then(|()| sink.flush())
        .and_then(|()| file.sync_all());
    if let Err(err) = written {
        log::warn!("append failed, truncating command log to byte {start}: {err}");
        file.set_len(start)?;
        return Err(err.into());
    }
    Ok(())
}

/// Next frame and its length in bytes, or `None` at a clean end of input.
fn read_frame(reader: &mut impl Read) -> Result<Option<(OwnedLogEntry, u64)>, LogError> {
    let mut header = [0u8; HEADER_LEN as usize];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(LogError::Corrupt(format!(
                    "torn frame header ({filled} of {HEADER_LEN} bytes)"
                )));
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    let mut body = vec![0u8; u32::from_le_bytes(header) as usize];
    reader.read_exact(&mut body).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => LogError::Corrupt("torn frame body".into()),
        _ => err.into(),
    })?;
    let entry = serde_cbor::from_slice(&body)?;
    Ok(Some((entry, HEADER_LEN + body.len() as u64)))
}

fn check_seq(entry: &OwnedLogEntry, expected: LogSeq) -> Result<(), LogError> {
    if entry.seq == expected {
        Ok(())
    } else {
        Err(LogError::Corrupt(format!(
            "expected offset {expected}, found {}",
            entry.seq
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tempfile::TempDir;

    use super::*;
    use crate::testing::command;

    fn append_command(log: &mut FsLog, text: &str) -> LogSeq {
        let record = command(text);
        let payload = record.encode().unwrap();
        log.append(LogEntry::new(record.kind().unwrap(), &payload))
            .unwrap()
    }

    /// Accepts `budget` bytes, then fails like a full disk.
    struct ShortWrite<'a> {
        file: &'a File,
        budget: usize,
    }

    impl Write for ShortWrite<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let take = buf.len().min(self.budget);
            let mut file = self.file;
            let written = file.write(&buf[..take])?;
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reopen_replays_command_records() {
        let tmp = TempDir::new().unwrap();
        {
            let mut log = FsLog::open(tmp.path()).unwrap();
            assert_eq!(append_command(&mut log, "REGISTER TOPIC orders"), 0);
            assert_eq!(append_command(&mut log, "SET 'ksql.sink.replicas' = '3'"), 1);
        }

        let log = FsLog::open(tmp.path()).unwrap();
        assert_eq!(log.next_seq(), 2);
        let records: Vec<_> = log
            .load_from(0)
            .unwrap()
            .iter()
            .map(|entry| entry.record().unwrap().statement_text)
            .collect();
        assert_eq!(
            records,
            ["REGISTER TOPIC orders", "SET 'ksql.sink.replicas' = '3'"]
        );
    }

    #[test]
    fn tailing_reads_from_indexed_position() {
        let tmp = TempDir::new().unwrap();
        let mut log = FsLog::open(tmp.path()).unwrap();
        for topic in ["a", "b", "c"] {
            append_command(&mut log, &format!("REGISTER TOPIC {topic}"));
        }

        let tail = log.load_from(1).unwrap();
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), [1, 2]);
        assert!(log.load_from(3).unwrap().is_empty());

        append_command(&mut log, "DROP TOPIC a");
        let tail = log.load_from(3).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].kind, LogKind::DropTopic);
        assert_eq!(tail[0].record().unwrap().statement_text, "DROP TOPIC a");
    }

    #[test]
    fn failed_write_leaves_no_partial_frame() {
        let tmp = TempDir::new().unwrap();
        let mut log = FsLog::open(tmp.path()).unwrap();
        append_command(&mut log, "REGISTER TOPIC orders");
        let committed = log.end;

        let record = command("REGISTER TOPIC payments");
        let payload = record.encode().unwrap();
        let frame = [&7u32.to_le_bytes()[..], &payload].concat();
        let mut sink = ShortWrite {
            file: &log.file,
            budget: 6,
        };
        let err = write_frame(&log.file, &mut sink, committed, &frame).unwrap_err();
        assert!(matches!(err, LogError::Io(_)));
        assert_eq!(fs::metadata(log.path()).unwrap().len(), committed);

        assert_eq!(append_command(&mut log, "REGISTER TOPIC payments"), 1);
        let reopened = FsLog::open(tmp.path()).unwrap();
        assert_eq!(reopened.next_seq(), 2);
        assert_eq!(
            reopened.load_from(1).unwrap()[0].record().unwrap().statement_text,
            "REGISTER TOPIC payments"
        );
    }

    #[test]
    fn torn_tail_is_reported_on_open() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let mut log = FsLog::open(tmp.path()).unwrap();
            append_command(&mut log, "REGISTER TOPIC orders");
            log.path().to_path_buf()
        };
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 1)
            .unwrap();

        let err = FsLog::open(tmp.path()).unwrap_err();
        assert!(matches!(err, LogError::Corrupt(msg) if msg.contains("torn frame body")));
    }

    #[test]
    fn offset_gap_is_reported_on_open() {
        let tmp = TempDir::new().unwrap();
        let path = FsLog::open(tmp.path()).unwrap().path().to_path_buf();
        let body = serde_cbor::to_vec(&Frame {
            seq: 3,
            kind: LogKind::RegisterTopic,
            payload: b"skipped ahead",
        })
        .unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&(body.len() as u32).to_le_bytes()).unwrap();
        file.write_all(&body).unwrap();

        let err = FsLog::open(tmp.path()).unwrap_err();
        assert!(matches!(err, LogError::Corrupt(msg) if msg.contains("expected offset 0")));
    }
}
