use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::Document;

/// Load documents from a JSON array file, or from JSON Lines (one document
/// per line, blank lines skipped).
pub fn read_documents<P: AsRef<Path>>(p: P) -> Result<Vec<Document>> {
    let path = p.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading documents file {}", path.display()))?;

    let docs = if text.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Document>>(&text)
            .with_context(|| format!("parsing JSON array in {}", path.display()))?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Document>(line)
                    .with_context(|| format!("{}:{}: bad document", path.display(), idx + 1))
            })
            .collect::<Result<Vec<_>>>()?
    };

    debug!("loaded {} document(s) from {}", docs.len(), path.display());
    Ok(docs)
}
