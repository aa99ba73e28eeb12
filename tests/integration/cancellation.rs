//! Integration tests for cooperative cancellation.

use pdfstream::StreamingMerger;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{page_widths, test_options, write_numbered_pdfs};

#[tokio::test]
async fn test_cancel_after_first_chunk_writes_partial_output() {
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 6);
    let output = dir.path().join("merged.pdf");
    let cancel = CancellationToken::new();

    let merger = StreamingMerger::new(test_options(1, 2)).unwrap();
    let trigger = cancel.clone();
    let abort = merger
        .merge_streaming(&cancel, &files, &output, |_, _| trigger.cancel())
        .await
        .unwrap_err();

    assert!(abort.is_cancelled());
    let partial = abort.partial().unwrap();
    assert_eq!(partial.processed_files, 2);
    assert_eq!(partial.chunks_processed, 1);
    assert_eq!(page_widths(&output), vec![100, 101]);
}

#[tokio::test]
async fn test_cancelled_token_dispatches_nothing() {
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 3);
    let output = dir.path().join("merged.pdf");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let merger = StreamingMerger::new(test_options(2, 1)).unwrap();
    let abort = merger
        .merge_streaming(&cancel, &files, &output, |_, _| {})
        .await
        .unwrap_err();

    assert_eq!(abort.exit_code(), 130);
    assert_eq!(abort.partial().unwrap().processed_files, 0);
    assert!(page_widths(&output).is_empty());
}
