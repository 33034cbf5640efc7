use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_RECORD_BYTES;
use crate::model::Event;

/// File magic plus format version.
pub const MAGIC: &[u8; 6] = b"STAYJ\x01";

/// Encode one event as `[len][bincode][crc32]`.
fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read `buf.len()` bytes, or `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Outcome of reading a journal from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Bytes after the last good record (torn write or corruption).
    pub discarded_bytes: u64,
}

/// The append handle under a journal. `File` in production.
pub trait JournalFile: Write + Send {
    fn sync_all(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

fn open_append(path: &Path) -> io::Result<Box<dyn JournalFile>> {
    Ok(Box::new(OpenOptions::new().append(true).open(path)?))
}

/// Append-only booking journal.
///
/// Layout: `MAGIC` followed by records `[u32 LE: len][bincode: Event][u32 LE: crc32]`.
/// A torn or corrupt tail is dropped on replay and cut off on open, so new
/// records never land behind garbage.
///
/// Records are staged in memory and reach the file only in `flush_sync`.
/// A failed flush drops the staged records and cuts the file back to
/// `durable_len`, so a rejected batch never reappears in a later one.
pub struct Journal {
    file: Box<dyn JournalFile>,
    staged: Vec<u8>,
    staged_records: u64,
    /// File length covered by the last successful fsync.
    durable_len: u64,
    /// Set when a failed flush could not cut the file back yet.
    needs_truncate: bool,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal at `path`, truncating any bad tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut good_len = Self::scan(path)?.1;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        if good_len == 0 {
            file.set_len(0)?;
            let mut w = BufWriter::new(&file);
            w.write_all(MAGIC)?;
            w.flush()?;
            drop(w);
            file.sync_all()?;
            good_len = MAGIC.len() as u64;
        } else if file.metadata()?.len() > good_len {
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        drop(file);

        Ok(Self {
            file: open_append(path)?,
            staged: Vec::new(),
            staged_records: 0,
            durable_len: good_len,
            needs_truncate: false,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Stage one record; nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let mut record = Vec::new();
        encode_record(&mut record, event)?;
        self.staged.extend_from_slice(&record);
        self.staged_records += 1;
        Ok(())
    }

    /// Drop every staged record.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
        self.staged_records = 0;
    }

    /// Append one record and fsync.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Write the staged records and fsync. On failure the staged records are
    /// dropped and the file is cut back to its last durable length.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.needs_truncate {
            if let Err(e) = self.cut_to_durable() {
                self.discard_staged();
                return Err(e);
            }
        }
        let result = self
            .file
            .write_all(&self.staged)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_all());
        match result {
            Ok(()) => {
                self.durable_len += self.staged.len() as u64;
                self.appends_since_compact += self.staged_records;
                self.discard_staged();
                Ok(())
            }
            Err(e) => {
                self.discard_staged();
                self.needs_truncate = true;
                // Retried on the next flush if this fails too.
                let _ = self.cut_to_durable();
                Err(e)
            }
        }
    }

    fn cut_to_durable(&mut self) -> io::Result<()> {
        self.file.set_len(self.durable_len)?;
        self.file.sync_all()?;
        self.needs_truncate = false;
        Ok(())
    }

    pub fn durable_len(&self) -> u64 {
        self.durable_len
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("journal.tmp")
    }

    /// Replace the journal with `events`: write a temp file, fsync, rename
    /// over the live file and reopen for appends.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp = Self::tmp_path(&self.path);
        let written = {
            let mut w = BufWriter::new(File::create(&tmp)?);
            w.write_all(MAGIC)?;
            for event in events {
                encode_record(&mut w, event)?;
            }
            w.flush()?;
            w.get_ref().sync_all()?;
            w.get_ref().metadata()?.len()
        };
        fs::rename(&tmp, &self.path)?;
        self.file = open_append(&self.path)?;
        self.discard_staged();
        self.durable_len = written;
        self.needs_truncate = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read every valid record. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let (events, good_len) = Self::scan(path)?;
        let total = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        let discarded_bytes = if good_len == 0 { total } else { total - good_len };
        Ok(Replay {
            events,
            discarded_bytes,
        })
    }

    /// Decode records up to the first bad one. Returns the events and the
    /// byte offset just past the last good record (0 if the header is bad).
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        let mut magic = [0u8; MAGIC.len()];
        if !read_full(&mut reader, &mut magic)? || &magic != MAGIC {
            return Ok((events, 0));
        }
        let mut good_len = MAGIC.len() as u64;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_full(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_BYTES {
                break;
            }

            let mut payload = vec![0u8; len];
            if !read_full(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
            good_len += 8 + len as u64;
        }

        Ok((events, good_len))
    }

    #[cfg(test)]
    pub(crate) fn replace_file(&mut self, file: Box<dyn JournalFile>) {
        self.file = file;
    }
}
