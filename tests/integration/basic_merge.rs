//! Integration tests for end-to-end merges of real PDF files.

use pdfstream::StreamingMerger;
use pdfstream::merge;
use pdfstream::utils::collect_paths_for_patterns;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::{init_tracing, page_widths, test_options, write_numbered_pdfs, write_pdf};

#[tokio::test]
async fn test_merge_preserves_input_order() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 7);
    let output = dir.path().join("merged.pdf");

    let merger = StreamingMerger::new(test_options(1, 3)).unwrap();
    let result = merger
        .merge_streaming(&CancellationToken::new(), &files, &output, |_, _| {})
        .await
        .unwrap();

    assert_eq!(result.processed_files, 7);
    assert_eq!(result.total_pages, 7);
    assert!(result.skipped_files.is_empty());
    assert_eq!(result.output_path, output);
    assert_eq!(page_widths(&output), (100..107).collect::<Vec<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_output_matches_sequential() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 12);

    let sequential = dir.path().join("sequential.pdf");
    let concurrent = dir.path().join("concurrent.pdf");

    for (workers, output) in [(1, &sequential), (4, &concurrent)] {
        let merger = StreamingMerger::new(test_options(workers, 2)).unwrap();
        assert_eq!(merger.should_use_concurrent_processing(&files), workers > 1);

        merger
            .merge_streaming(&CancellationToken::new(), &files, output, |_, _| {})
            .await
            .unwrap();
    }

    assert_eq!(page_widths(&sequential), page_widths(&concurrent));
    assert_eq!(page_widths(&concurrent).len(), 12);
}

#[tokio::test]
async fn test_multi_page_inputs() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_pdf(dir.path(), "a.pdf", &[300, 301, 302]),
        write_pdf(dir.path(), "b.pdf", &[400]),
        write_pdf(dir.path(), "c.pdf", &[500, 501]),
    ];
    let output = dir.path().join("merged.pdf");

    let result = merge::merge_streaming(test_options(2, 2), &files, &output)
        .await
        .unwrap();

    assert_eq!(result.total_pages, 6);
    assert_eq!(page_widths(&output), vec![300, 301, 302, 400, 500, 501]);
}

#[tokio::test]
async fn test_merge_from_glob_patterns() {
    let dir = TempDir::new().unwrap();
    write_numbered_pdfs(dir.path(), 3);
    let output = dir.path().join("out").join("merged.pdf");
    std::fs::create_dir(dir.path().join("out")).unwrap();

    let pattern = format!("{}/doc-*.pdf", dir.path().display());
    let files = collect_paths_for_patterns([pattern]).unwrap();
    assert_eq!(files.len(), 3);

    let result = merge::merge_streaming(test_options(1, 10), &files, &output)
        .await
        .unwrap();

    assert_eq!(result.chunks_processed, 1);
    assert_eq!(page_widths(&output), vec![100, 101, 102]);
}

#[tokio::test]
async fn test_staging_directory_is_left_clean() {
    let dir = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 3);
    let output = dir.path().join("merged.pdf");

    let options = test_options(1, 2).with_temp_directory(staging.path());
    merge::merge_streaming(options, &files, &output).await.unwrap();

    assert!(output.exists());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_result_serializes_for_reports() {
    let dir = TempDir::new().unwrap();
    let files = write_numbered_pdfs(dir.path(), 2);
    let output = dir.path().join("merged.pdf");

    let result = merge::merge_streaming(test_options(1, 2), &files, &output)
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["processed_files"], 2);
    assert_eq!(json["total_pages"], 2);
    assert!(json["skipped_files"].as_array().unwrap().is_empty());
}
