//! Integration tests for partial failures and fatal conditions.

use pdfstream::config::MergeOptions;
use pdfstream::{ErrorCategory, MergeAbort, MergeError, StreamingMerger};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{page_widths, test_options, write_garbage, write_numbered_pdfs};

#[tokio::test]
async fn test_corrupted_file_is_skipped_with_its_chunk() {
    let dir = TempDir::new().unwrap();
    let mut files = write_numbered_pdfs(dir.path(), 4);
    files.insert(2, write_garbage(dir.path(), "broken.pdf"));
    let output = dir.path().join("merged.pdf");

    let merger = StreamingMerger::new(test_options(1, 1)).unwrap();
    let result = merger
        .merge_streaming(&CancellationToken::new(), &files, &output, |_, _| {})
        .await
        .unwrap();

    assert_eq!(result.processed_files, 4);
    assert_eq!(result.skipped_files, vec![files[2].clone()]);
    assert_eq!(result.processed_files + result.skipped_files.len(), files.len());
    assert_eq!(page_widths(&output), vec![100, 101, 102, 103]);

    let errors = merger.recovery().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, ErrorCategory::Corrupted);
    assert_eq!(errors[0].attempts, 1);
    assert!(!errors[0].retryable);
}

#[tokio::test]
async fn test_missing_file_is_retried_then_skipped() {
    let dir = TempDir::new().unwrap();
    let mut files = write_numbered_pdfs(dir.path(), 2);
    files.push(dir.path().join("vanished.pdf"));
    let output = dir.path().join("merged.pdf");

    let merger = StreamingMerger::new(test_options(1, 1)).unwrap();
    let result = merger
        .merge_streaming(&CancellationToken::new(), &files, &output, |_, _| {})
        .await
        .unwrap();

    assert_eq!(result.skipped_files, vec![files[2].clone()]);

    let summary = merger.recovery().error_summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.retryable, 1);
    assert_eq!(merger.recovery().errors()[0].attempts, 2);
}

#[tokio::test]
async fn test_error_log_persists_across_calls_until_cleared() {
    let dir = TempDir::new().unwrap();
    let files = vec![write_garbage(dir.path(), "bad.pdf")];
    let output = dir.path().join("merged.pdf");

    let merger = StreamingMerger::new(test_options(1, 1)).unwrap();
    for _ in 0..2 {
        let result = merger
            .merge_streaming(&CancellationToken::new(), &files, &output, |_, _| {})
            .await
            .unwrap();
        assert_eq!(result.processed_files, 0);
    }

    assert_eq!(merger.recovery().error_count(), 2);
    merger.recovery().clear_errors();
    assert_eq!(merger.recovery().stats().error_count, 0);
}

#[tokio::test]
async fn test_empty_input_list() {
    let dir = TempDir::new().unwrap();
    let merger = StreamingMerger::new(test_options(1, 1)).unwrap();

    let abort = merger
        .merge_streaming(&CancellationToken::new(), &[], &dir.path().join("o.pdf"), |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(
        abort,
        MergeAbort::Fatal {
            error: MergeError::NoFilesToMerge,
            ..
        }
    ));
    assert!(abort.partial().is_none());
    assert_eq!(abort.category(), Some(ErrorCategory::Validation));
}

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 1);
    let output = dir.path().join("no-such-dir").join("merged.pdf");

    let merger = StreamingMerger::new(test_options(1, 1)).unwrap();
    let abort = merger
        .merge_streaming(&CancellationToken::new(), &files, &output, |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(
        abort,
        MergeAbort::Fatal {
            error: MergeError::OutputFailed { .. },
            partial: None
        }
    ));
}

#[test]
fn test_invalid_options() {
    let err = StreamingMerger::new(MergeOptions::default().with_workers(0)).unwrap_err();
    assert!(matches!(err, MergeError::InvalidOptions { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_options_from_partial_json() {
    let options = MergeOptions::from_json(r#"{ "max_chunk_size": 8, "concurrent_workers": 2 }"#)
        .unwrap();
    assert_eq!(options.max_chunk_size, 8);
    assert_eq!(options.concurrent_workers, 2);
    assert_eq!(options.min_chunk_size, MergeOptions::default().min_chunk_size);
}
