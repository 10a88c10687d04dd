use std::fs::{self, File, OpenOptions};
use std::io::{Result as IoResult, Write};
use std::path::{Path, PathBuf};

/// Append-only file capped at `max_bytes`; when full it is renamed to the
/// next numbered name and a fresh one is started:
///   base, base.1, base.2, ...
pub struct RotatingWriter {
    dir: PathBuf,
    base: String,
    max_bytes: u64,

    file: File,
    size: u64,
    next_index: u64,
}

impl RotatingWriter {
    pub fn new<P: AsRef<Path>>(dir: P, base: &str, max_bytes: u64) -> IoResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let next_index = highest_suffix(&dir, base).saturating_add(1);
        let file = open_append(&dir.join(base))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            dir,
            base: base.into(),
            max_bytes,
            file,
            size,
            next_index,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.base)
    }

    fn rotate(&mut self) -> IoResult<()> {
        let cur = self.path();
        let numbered = self.dir.join(format!("{}.{}", self.base, self.next_index));
        if numbered.exists() {
            let _ = fs::remove_file(&numbered);
        }
        self.file.flush()?;
        fs::rename(&cur, &numbered)?;
        self.next_index += 1;

        self.file = open_append(&cur)?;
        self.size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> IoResult<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Largest N among existing `base.N` files, 0 if none.
fn highest_suffix(dir: &Path, base: &str) -> u64 {
    let prefix = format!("{base}.");
    let Ok(rd) = fs::read_dir(dir) else {
        return 0;
    };
    rd.flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            name.to_str()?.strip_prefix(&prefix)?.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0)
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // A record never straddles two files. An oversized record still
        // goes out whole, into a file of its own.
        if self.size > 0 && self.size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }

        self.file.write_all(buf)?;
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.file.flush()
    }
}
