//! End-to-end runs of the orchestrator with stub collaborators.

mod common;

use docchain::{run_pipeline, ConvertError, EmbedError, RunOptions, Step};
use std::path::Path;

fn upload(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"PK\x03\x04 stub office document").unwrap();
    path
}

#[tokio::test]
async fn successful_run_produces_every_artifact_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "report.docx");
    let tools = common::toolchain(3, None);

    let report = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap();

    let steps: Vec<Step> = report.timings.iter().map(|t| t.step).collect();
    assert_eq!(steps, Step::ALL.to_vec());

    let a = &report.artifacts;
    assert_eq!(a.stem, "report");
    assert_eq!(a.markdown_path, dir.path().join("report-with-image-refs.md"));
    assert_eq!(a.html_path, dir.path().join("report-with-image-refs.html"));
    assert_eq!(a.pdf_path, dir.path().join("report-rendered.pdf"));
    assert!(a.pdf_path.is_file());

    assert_eq!(a.page_count, 3);
    assert_eq!(a.embedding_count, 3);
    assert!(a.embedding_failures.is_empty());
    for page in 1..=3 {
        assert!(a.images_dir.join(format!("report-rendered-{page}.png")).is_file());
        assert!(a
            .embeddings_dir
            .join(format!("report-rendered-{page}.npy"))
            .is_file());
    }

    let html = std::fs::read_to_string(&a.html_path).unwrap();
    assert!(!html.to_ascii_lowercase().contains("%5c"), "{html}");
    assert!(html.contains("src=\"pictures/"), "{html}");
    assert!(html.contains("class=\"page-break\""), "{html}");
}

#[tokio::test]
async fn embed_images_selects_the_inlined_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "slides.pptx");
    let tools = common::toolchain(1, None);

    let report = run_pipeline(&input, dir.path(), &tools, RunOptions { embed_images: true })
        .await
        .unwrap();

    assert_eq!(
        report.artifacts.markdown_path,
        dir.path().join("slides-with-images.md")
    );
    assert_eq!(
        report.artifacts.html_path,
        dir.path().join("slides-with-images.html")
    );
    let html = std::fs::read_to_string(&report.artifacts.html_path).unwrap();
    assert!(html.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn missing_pdf_renderer_aborts_without_a_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "report.docx");
    let tools = common::toolchain_without_pdf_renderer();

    let err = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::HtmlToPdf);
    assert!(err.source.is_tool_not_found(), "{err}");
    assert_eq!(err.source.code(), "TOOL_NOT_FOUND");
    assert!(!dir.path().join("report-rendered.pdf").exists());
    // Earlier steps keep their output.
    assert!(dir.path().join("report-with-image-refs.html").is_file());
    assert!(!dir.path().join("images").exists());
}

#[tokio::test]
async fn one_unreadable_page_is_recorded_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "report.docx");
    let tools = common::toolchain(3, Some(2));

    let report = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap();

    let a = &report.artifacts;
    assert_eq!(a.page_count, 3);
    assert_eq!(a.embedding_count, 2);
    assert_eq!(a.embedding_failures.len(), 1);
    assert!(matches!(a.embedding_failures[0], EmbedError::Unreadable { .. }));
    assert!(a.embeddings_dir.join("report-rendered-1.npy").is_file());
    assert!(!a.embeddings_dir.join("report-rendered-2.npy").exists());
    assert!(a.embeddings_dir.join("report-rendered-3.npy").is_file());
}

#[tokio::test]
async fn unsupported_extension_fails_at_parse() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "archive.tar");
    let tools = common::toolchain(1, None);

    let err = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Parse);
    assert!(matches!(err.source, ConvertError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn stray_npy_files_end_up_in_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "report.docx");
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("leftover.npy"), b"npy").unwrap();
    let tools = common::toolchain(1, None);

    let report = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap();

    let a = &report.artifacts;
    assert!(!images.join("leftover.npy").exists());
    assert!(a.embeddings_dir.join("leftover.npy").is_file());
    assert_eq!(a.embedding_count, 2);
}

#[tokio::test]
async fn stray_npy_never_replaces_a_page_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let input = upload(dir.path(), "report.docx");
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("report-rendered-1.npy"), b"stray").unwrap();
    let tools = common::toolchain(1, None);

    let report = run_pipeline(&input, dir.path(), &tools, RunOptions::default())
        .await
        .unwrap();

    let a = &report.artifacts;
    assert_eq!(a.embedding_count, 1);
    let kept = std::fs::read(a.embeddings_dir.join("report-rendered-1.npy")).unwrap();
    assert_ne!(kept, b"stray");
    assert!(images.join("report-rendered-1.npy").exists());
}
