use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::Serialize;

use crate::rotate::RotatingWriter;

const MAX_RESULTS_BYTES: u64 = 256 * 1024 * 1024;

/// JSONL results writer that is safe to call from many threads.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Mutex<BufWriter<RotatingWriter>>>,
    path: PathBuf,
}

impl Recorder {
    /// Appends to `<dir>/<file_name>`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P, file_name: &str) -> Result<Self> {
        let writer = RotatingWriter::new(dir, file_name, MAX_RESULTS_BYTES)?;
        let path = writer.path();
        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::new(writer))),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One record per line; the line is written under the lock so records
    /// from different threads never interleave.
    pub fn write<T: Serialize>(&self, rec: &T) -> Result<()> {
        let mut line = serde_json::to_vec(rec)?;
        line.push(b'\n');
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        w.write_all(&line)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, SubmissionRecord};
    use std::thread;

    fn record(i: usize) -> SubmissionRecord {
        SubmissionRecord {
            doc_id: format!("doc-{i}"),
            outcome: Outcome::Accepted,
            status: Some(200),
            window: Some(0),
            elapsed_ms: 1,
            body: None,
            error: None,
        }
    }

    #[test]
    fn concurrent_writes_stay_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::open(dir.path().join("out"), "results.jsonl").unwrap();

        thread::scope(|s| {
            for t in 0..4 {
                let recorder = recorder.clone();
                s.spawn(move || {
                    for i in 0..25 {
                        recorder.write(&record(t * 100 + i)).unwrap();
                    }
                });
            }
        });
        recorder.flush().unwrap();

        let text = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 100);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["outcome"], "accepted");
        }
    }
}
