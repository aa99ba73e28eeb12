//! The single-chunk merge primitive.
//!
//! Merging is split in two halves so the expensive half can run in parallel:
//! [`ChunkMerger::merge_chunk`] turns a run of input files into a self-contained
//! part on a blocking worker, and [`ChunkMerger::append`] splices finished parts
//! into the output target one at a time, in chunk order.

use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MergeOptions;
use crate::error::{MergeError, Result};
use crate::io::{PdfWriter, WriteOptions};
use crate::merge::assembler::DocumentAssembler;

/// Collaborator that performs the actual document work.
///
/// Every method is blocking; the engine calls them on blocking threads.
/// `merge_chunk` may run on several threads at once, the other methods are
/// only ever called by the single output writer.
pub trait ChunkMerger: Send + Sync + 'static {
    /// Result of merging one chunk.
    type Part: Send + 'static;
    /// The output being built.
    type Target: Send + 'static;

    /// Prepare an empty output for `output`.
    fn open(&self, output: &Path) -> Result<Self::Target>;

    /// Merge `files`, in order, into one part. Either every file makes it
    /// into the part or the call fails.
    fn merge_chunk(&self, files: &[PathBuf]) -> Result<Self::Part>;

    /// Append `part` to `target`. Returns the number of pages added.
    fn append(&self, target: &mut Self::Target, part: Self::Part) -> Result<usize>;

    /// Write the finished output.
    fn finalize(&self, target: Self::Target, output: &Path) -> Result<()>;
}

/// A merged chunk ready to be appended.
#[derive(Debug)]
pub struct ChunkPart {
    document: Document,
    pages: usize,
}

impl ChunkPart {
    /// Pages in this part.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// [`ChunkMerger`] backed by `lopdf`.
#[derive(Debug, Clone)]
pub struct LopdfMerger {
    writer: PdfWriter,
}

impl LopdfMerger {
    /// Create a merger whose writer follows `options`: output is staged in
    /// `temp_directory`, and `optimize_memory` prunes and compresses it.
    pub fn new(options: &MergeOptions) -> Self {
        let writer = PdfWriter::with_options(WriteOptions {
            compress: options.optimize_memory,
            prune: options.optimize_memory,
            temp_directory: options.temp_directory.clone(),
        });

        Self { writer }
    }

    /// Load and sanity-check one input.
    pub fn load(path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path).map_err(|e| MergeError::io(path, e))?;

        let document = Document::load_mem(&bytes).map_err(|e| {
            let message = e.to_string();
            let lower = message.to_lowercase();
            if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt")
            {
                MergeError::EncryptedDocument {
                    path: path.to_path_buf(),
                }
            } else {
                MergeError::corrupted(path, message)
            }
        })?;

        if document.is_encrypted() {
            return Err(MergeError::EncryptedDocument {
                path: path.to_path_buf(),
            });
        }

        if document.get_pages().is_empty() {
            return Err(MergeError::corrupted(path, "document has no pages"));
        }

        Ok(document)
    }
}

impl Default for LopdfMerger {
    fn default() -> Self {
        Self::new(&MergeOptions::default())
    }
}

impl ChunkMerger for LopdfMerger {
    type Part = ChunkPart;
    type Target = DocumentAssembler;

    fn open(&self, output: &Path) -> Result<DocumentAssembler> {
        self.writer.can_write(output)?;
        Ok(DocumentAssembler::new())
    }

    fn merge_chunk(&self, files: &[PathBuf]) -> Result<ChunkPart> {
        let mut assembler = DocumentAssembler::new();

        for path in files {
            let document = Self::load(path)?;
            let pages = assembler.append(document);
            debug!(path = %path.display(), pages, "Loaded input");
        }

        let pages = assembler.page_count();
        Ok(ChunkPart {
            document: assembler.into_document(),
            pages,
        })
    }

    fn append(&self, target: &mut DocumentAssembler, part: ChunkPart) -> Result<usize> {
        Ok(target.append(part.document))
    }

    fn finalize(&self, target: DocumentAssembler, output: &Path) -> Result<()> {
        let pages = target.page_count();
        let mut document = target.into_document();
        let stats = self.writer.write(&mut document, output)?;

        info!(
            path = %stats.output_path.display(),
            pages,
            size = %stats.format_file_size(),
            compressed = stats.compressed,
            write_ms = stats.write_time.as_millis() as u64,
            "Output written"
        );
        Ok(())
    }
}
