//! Reads the input path into partitioned documents.
//!

use crate::standalone::engine::Dataset;
use crate::utils::split_lines;
use crate::{AggError, Document, Result};
use bytes::Bytes;
use glob::glob;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How files are cut into documents.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Every line of every file is one document.
    #[default]
    Lines,
    /// Every file is one document.
    Files,
}

/// The files behind `path`: the file itself, or the regular files directly
/// inside a directory, in name order.
pub fn input_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(AggError::invalid(
            "INPUT",
            format!("{} does not exist", path.display()),
        ));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let pattern = format!(
        "{}/*",
        glob::Pattern::escape(&path.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = glob(&pattern)?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Read every input file into documents, numbered in reading order.
pub fn read_documents(path: &Path, layout: Layout) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for pathspec in input_files(path)? {
        let mut buf = Vec::new();
        {
            // a scope so that the file is closed right after reading
            let mut file = File::open(&pathspec)?;
            file.read_to_end(&mut buf)?;
        }
        let buf = Bytes::from(buf);
        match layout {
            Layout::Lines => {
                for line in split_lines(&buf) {
                    documents.push(Document::new(documents.len(), line));
                }
            }
            Layout::Files => documents.push(Document::new(documents.len(), buf)),
        }
        debug!(file = %pathspec.display(), documents = documents.len(), "read input file");
    }
    Ok(documents)
}

/// Read `path` into `partitions` partitions.
///
/// Documents are first cut into contiguous runs, one per input split, and
/// then dealt round-robin over the partitions. Strategies fork the dataset,
/// so this shuffle is not counted against any of them.
pub fn load(path: &Path, layout: Layout, partitions: usize) -> Result<Dataset<Document>> {
    let documents = read_documents(path, layout)?;
    Ok(Dataset::from_records(documents, partitions).repartition(partitions))
}
