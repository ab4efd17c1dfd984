use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Records larger than this are treated as corruption on replay.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Outcome of reading one record during replay.
enum Record {
    /// An intact record and its size on disk.
    Event { event: Event, len: u64 },
    /// Clean end of file.
    End,
    /// Torn or corrupt tail; everything from here on is dropped.
    Damaged(&'static str),
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_record(reader: &mut impl Read) -> io::Result<Record> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(Record::End);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(Record::Damaged("implausible record length"));
    }

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(Record::Damaged("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Ok(Record::Damaged("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Record::Damaged("checksum mismatch"));
    }

    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Record::Event {
            event,
            len: (len + 8) as u64,
        }),
        Err(_) => Ok(Record::Damaged("undecodable payload")),
    }
}

/// Append-only event log for the reservation engine.
///
/// Each record is `[u32 LE: len][bincode Event][u32 LE: crc32 of payload]`.
/// A crash can leave a torn final record; replay stops at the first record
/// that fails its length or checksum and keeps everything before it.
/// [`Wal::recover`] also truncates the file there before it is reopened.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync a single record.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer a record without syncing; [`Wal::flush_sync`] commits the batch.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot of `events` next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            encode_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the log and reopen it for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        // Drain anything buffered into the old file before it is replaced.
        self.writer.flush()?;
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact record. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(scan(path)?.events)
    }

    /// Replay the log and cut off a damaged tail, so records appended after
    /// startup follow the last intact one instead of the garbage.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let scanned = scan(path)?;
        if scanned.damaged {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scanned.valid_len)?;
            file.sync_all()?;
            tracing::warn!(
                "WAL {}: truncated to {} bytes ({} records)",
                path.display(),
                scanned.valid_len,
                scanned.events.len()
            );
        }
        Ok(scanned.events)
    }
}

struct Scan {
    events: Vec<Event>,
    /// Byte offset just past the last intact record.
    valid_len: u64,
    damaged: bool,
}

fn scan(path: &Path) -> io::Result<Scan> {
    let mut scanned = Scan {
        events: Vec::new(),
        valid_len: 0,
        damaged: false,
    };
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(scanned),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    loop {
        match read_record(&mut reader)? {
            Record::Event { event, len } => {
                scanned.events.push(event);
                scanned.valid_len += len;
            }
            Record::End => break,
            Record::Damaged(reason) => {
                tracing::warn!(
                    "WAL {}: {reason} after {} records, discarding tail",
                    path.display(),
                    scanned.events.len()
                );
                scanned.damaged = true;
                break;
            }
        }
    }
    Ok(scanned)
}
