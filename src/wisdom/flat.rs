//! Flat tier: every record in a `Vec`, mirrored to a JSON-lines file.
//!
//! Queries scan everything. Stores append one line and flush before the
//! record becomes visible in memory. A failed append is truncated away, and
//! an unterminated last line left by a crash is ignored on open and dropped
//! by the next store.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::backend::{BackendTier, WisdomBackend, rank};
use super::{ScoredRecord, StoreResult, WisdomQuery, WisdomRecord};
use crate::error::StoreError;

pub const FILE_NAME: &str = "wisdom.jsonl";

pub struct FlatBackend {
    path: Option<PathBuf>,
    records: Vec<WisdomRecord>,
}

impl FlatBackend {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
        }
    }

    /// Open or create `wisdom.jsonl` in `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir).map_err(|e| StoreError::Io { source: e })?;
        let path = dir.join(FILE_NAME);
        let records = if path.exists() {
            read_lines(&path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn read_lines(path: &Path) -> StoreResult<Vec<WisdomRecord>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut line = Vec::new();
    let mut number = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        number += 1;
        let terminated = line.ends_with(b"\n");
        let text = line.trim_ascii();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_slice(text) {
            Ok(record) => records.push(record),
            Err(e) if !terminated => {
                tracing::warn!(
                    path = %path.display(),
                    line = number,
                    error = %e,
                    "ignoring unterminated last wisdom line"
                );
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    path: path.display().to_string(),
                    line: number,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(records)
}

/// Length of `file` up to and including its last newline.
fn complete_len(file: &mut File) -> io::Result<u64> {
    let mut end = file.metadata()?.len();
    let mut buf = [0u8; 4096];
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(start + i as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

fn encode(record: &WisdomRecord) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode wisdom record: {e}"),
    })
}

impl WisdomBackend for FlatBackend {
    fn tier(&self) -> BackendTier {
        BackendTier::Flat
    }

    fn query(&self, query: &WisdomQuery) -> StoreResult<Vec<ScoredRecord>> {
        Ok(rank(
            query,
            self.records
                .iter()
                .enumerate()
                .map(|(i, r)| (i as u64, r.clone())),
        ))
    }

    fn store(&mut self, record: &WisdomRecord) -> StoreResult<()> {
        if let Some(path) = &self.path {
            let mut line = encode(record)?;
            line.push('\n');
            let mut file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path)?;
            let len = complete_len(&mut file)?;
            if len < file.metadata()?.len() {
                tracing::warn!(path = %path.display(), "dropping unterminated wisdom line");
                file.set_len(len)?;
            }
            if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
                if let Err(cleanup) = file.set_len(len) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "failed to truncate partial write"
                    );
                }
                return Err(e.into());
            }
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn count_records(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }

    fn export_all(&self) -> StoreResult<Vec<WisdomRecord>> {
        Ok(self.records.clone())
    }

    /// Rewrites the whole file through a temp file and rename, so a crash
    /// leaves either the old file or the new one.
    fn import_all(&mut self, records: &[WisdomRecord]) -> StoreResult<()> {
        if let Some(path) = &self.path {
            let tmp = path.with_extension("jsonl.tmp");
            {
                let mut writer = BufWriter::new(File::create(&tmp)?);
                for record in self.records.iter().chain(records) {
                    writer.write_all(encode(record)?.as_bytes())?;
                    writer.write_all(b"\n")?;
                }
                writer.flush()?;
                writer.get_ref().sync_all()?;
            }
            fs::rename(&tmp, path)?;
        }
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn destroy(self: Box<Self>) -> StoreResult<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
