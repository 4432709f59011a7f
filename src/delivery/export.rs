//! Local export file sets.
//!
//! A block is staged as `<label>.bin` holding the raw bytes and, when
//! configured, `<label>.csv` with one byte value per row. The first 256
//! rows also carry a zero-based bin index so spreadsheet histogram tools
//! can use the file directly; rows beyond 256 have no bin column.

use super::DeliveryError;
use crate::session::{Block, BlockLabel};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Rows that carry a bin index in the auxiliary file.
pub const AUXILIARY_BIN_ROWS: usize = 256;

const AUXILIARY_HEADER: &str = "Values,Bins";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Raw block bytes.
    Binary,
    /// CSV rendering for histogram tooling.
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub kind: ExportKind,
    pub path: PathBuf,
}

/// Files staged for one block, handed to a [`super::LocalExportSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFileSet {
    pub label: BlockLabel,
    files: Vec<ExportFile>,
}

impl ExportFileSet {
    pub fn files(&self) -> &[ExportFile] {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn binary(&self) -> Option<&ExportFile> {
        self.files.iter().find(|f| f.kind == ExportKind::Binary)
    }

    pub fn auxiliary(&self) -> Option<&ExportFile> {
        self.files.iter().find(|f| f.kind == ExportKind::Auxiliary)
    }
}

/// Renders the auxiliary CSV: a header, then one row per byte.
pub fn render_auxiliary_csv(bytes: &[u8]) -> String {
    // "255,255\n" is the longest row.
    let mut out = String::with_capacity(AUXILIARY_HEADER.len() + 1 + bytes.len() * 8);
    out.push_str(AUXILIARY_HEADER);
    out.push('\n');
    for (i, value) in bytes.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = if i < AUXILIARY_BIN_ROWS {
            writeln!(out, "{value},{i}")
        } else {
            writeln!(out, "{value}")
        };
    }
    out
}

/// Writes the block's files into `dir`.
///
/// The binary file is always written; the auxiliary file only when
/// `auxiliary` is set. Any write failure is an [`DeliveryError::ExportWrite`];
/// the caller still owns the block.
pub fn stage_block(
    block: &Block,
    label: &BlockLabel,
    auxiliary: bool,
    dir: &Path,
) -> Result<ExportFileSet, DeliveryError> {
    std::fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;

    let mut files = Vec::with_capacity(2);

    let bin_path = dir.join(format!("{label}.bin"));
    std::fs::write(&bin_path, block.bytes()).map_err(|e| write_error(&bin_path, e))?;
    files.push(ExportFile {
        kind: ExportKind::Binary,
        path: bin_path,
    });

    if auxiliary {
        let csv_path = dir.join(format!("{label}.csv"));
        std::fs::write(&csv_path, render_auxiliary_csv(block.bytes()))
            .map_err(|e| write_error(&csv_path, e))?;
        files.push(ExportFile {
            kind: ExportKind::Auxiliary,
            path: csv_path,
        });
    }

    tracing::debug!(
        label = %label,
        files = files.len(),
        dir = %dir.display(),
        "Staged block for export"
    );

    Ok(ExportFileSet {
        label: label.clone(),
        files,
    })
}

fn write_error(path: &Path, e: std::io::Error) -> DeliveryError {
    DeliveryError::ExportWrite(format!("{}: {e}", path.display()))
}
