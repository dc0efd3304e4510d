//! Append-only journal backing the file store.
//!
//! One record per line: `<crc32c as 8 hex digits> <json>`. Replay stops at the
//! first line that fails its checksum or does not parse, and the file is cut
//! back to the last good record so later appends stay reachable.
//!
//! The journal remembers how many bytes it has committed. Anything past that
//! mark (a torn write) is cut off before the next append, and a failed append
//! is rolled back. If the rollback itself fails the journal refuses further
//! writes until it is reopened.

use crc32c::crc32c;
use natours_core::{Tour, TourId};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};
use tracing::{error, warn};

pub const JOURNAL_FILE: &str = "tours.journal";

static JOURNAL_RECORDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("journal_records_total", "Journal records appended")
        .expect("journal_records_total registers once")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Record {
    Put { tour: Tour },
    PutMany { tours: Vec<Tour> },
    Delete { id: TourId },
}

pub struct Journal {
    path: PathBuf,
    file: File,
    committed: u64,
    poisoned: bool,
}

impl Journal {
    /// Opens (creating if needed) the journal in `dir` and returns the
    /// records that survived replay.
    pub fn open(dir: &Path) -> io::Result<(Self, Vec<Record>)> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        let (records, good_len) = if path.exists() {
            replay(&path)?
        } else {
            (Vec::new(), 0)
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() > good_len {
            warn!(
                path = %path.display(),
                kept_bytes = good_len,
                "journal has a damaged tail; truncating"
            );
            file.set_len(good_len)?;
        }
        let journal = Self {
            path,
            file,
            committed: good_len,
            poisoned: false,
        };
        Ok((journal, records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of fully written records.
    pub fn committed_len(&self) -> u64 {
        self.committed
    }

    pub fn append(&mut self, rec: &Record) -> io::Result<()> {
        self.ensure_writable()?;
        let line = encode(rec)?;
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush());
        if let Err(e) = written {
            self.roll_back();
            return Err(e);
        }
        self.committed += line.len() as u64;
        JOURNAL_RECORDS_TOTAL.inc();
        Ok(())
    }

    /// Drops every record.
    pub fn reset(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        self.file.set_len(0)?;
        self.committed = 0;
        Ok(())
    }

    /// Replaces the journal with one `Put` per live tour. The new file is
    /// written beside the old one and renamed over it.
    pub fn compact<'a>(&mut self, live: impl IntoIterator<Item = &'a Tour>) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        let tmp = self.path.with_extension("journal.tmp");
        let mut out = File::create(&tmp)?;
        let mut len = 0u64;
        for tour in live {
            let line = encode(&Record::Put { tour: tour.clone() })?;
            out.write_all(line.as_bytes())?;
            len += line.len() as u64;
        }
        out.sync_all()?;
        drop(out);
        std::fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed = len;
        Ok(())
    }

    /// Swaps in a read-only handle so the next append and its rollback fail.
    #[cfg(test)]
    pub(crate) fn reopen_read_only(&mut self) -> io::Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }

    fn ensure_writable(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        let on_disk = self.file.metadata()?.len();
        if on_disk != self.committed {
            warn!(
                path = %self.path.display(),
                on_disk,
                committed = self.committed,
                "journal has uncommitted bytes; cutting back"
            );
            self.file.set_len(self.committed)?;
        }
        Ok(())
    }

    fn roll_back(&mut self) {
        if let Err(e) = self.file.set_len(self.committed) {
            error!(
                path = %self.path.display(),
                error = %e,
                "journal rollback failed; refusing further writes"
            );
            self.poisoned = true;
        }
    }
}

fn poisoned_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "journal is unusable after a failed rollback",
    )
}

fn encode(rec: &Record) -> io::Result<String> {
    let json = serde_json::to_string(rec)?;
    Ok(format!("{:08x} {}\n", crc32c(json.as_bytes()), json))
}

fn replay(path: &Path) -> std::io::Result<(Vec<Record>, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    let mut good_len = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 || line.last() != Some(&b'\n') {
            break;
        }
        let Ok(text) = std::str::from_utf8(&line[..n - 1]) else {
            break;
        };
        match decode_line(text) {
            Some(rec) => {
                out.push(rec);
                good_len += n as u64;
            }
            None => break,
        }
    }
    Ok((out, good_len))
}

fn decode_line(line: &str) -> Option<Record> {
    let (crc_hex, json) = line.split_once(' ')?;
    let want = u32::from_str_radix(crc_hex, 16).ok()?;
    if crc32c(json.as_bytes()) != want {
        return None;
    }
    serde_json::from_str(json).ok()
}
