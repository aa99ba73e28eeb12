//! Shared helpers for the integration tests.
//!
//! Fixtures are generated with `lopdf` at test time. Each page's MediaBox
//! width is unique within a test so page order can be checked after a merge.

#![allow(dead_code)]

use lopdf::{Document, Object, dictionary};
use pdfstream::MergeOptions;
use pdfstream::config::RetryConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Install a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write a PDF with one page per entry in `widths`.
pub fn write_pdf(dir: &Path, name: &str, widths: &[i64]) -> PathBuf {
    let mut doc = Document::with_version("1.4");

    let catalog_id = doc.new_object_id();
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for &width in widths {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => widths.len() as i64,
        }
        .into(),
    );
    doc.objects.insert(
        catalog_id,
        dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }
        .into(),
    );
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("Failed to write fixture");
    path
}

/// Write `count` single-page PDFs named `doc-00.pdf`, `doc-01.pdf`, ...
/// Page widths are `100 + index`.
pub fn write_numbered_pdfs(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| write_pdf(dir, &format!("doc-{i:02}.pdf"), &[100 + i as i64]))
        .collect()
}

/// Write a file that is not a PDF.
pub fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not a pdf").expect("Failed to write fixture");
    path
}

/// MediaBox widths of every page of the PDF at `path`, in page order.
pub fn page_widths(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).expect("Failed to load merged output");
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).expect("page dictionary");
            let media_box = page
                .get(b"MediaBox")
                .and_then(Object::as_array)
                .expect("MediaBox");
            media_box[2].as_i64().expect("MediaBox width")
        })
        .collect()
}

/// Options with a generous ceiling and millisecond backoff.
pub fn test_options(workers: usize, max_chunk: usize) -> MergeOptions {
    MergeOptions::default()
        .with_max_memory(4 * 1024 * 1024 * 1024)
        .with_chunk_bounds(1, max_chunk)
        .with_workers(workers)
        .with_retry(RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            timeout: Some(Duration::from_secs(30)),
        })
}
