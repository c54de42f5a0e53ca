//! Benchmarks for the capture pipeline.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use snapdom::{CaptureOptions, Document, DocumentBuilder, NodeId, SnapDom, StaticFetcher};

const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Build a document with `boxes` styled children under one root, cycling
/// through a handful of shared styles so compression has work to do.
fn sample_document(boxes: usize) -> (Document, NodeId) {
    let mut b = DocumentBuilder::new();
    let root = b.el("div");
    b.rect(root, 0.0, 0.0, 800.0, 600.0);

    let palette = ["#c00", "#0c0", "#00c", "#cc0"];
    for i in 0..boxes {
        let child = b.element(root, "div");
        b.set_style(child, "color", palette[i % palette.len()]);
        b.set_style(child, "font-size", "14px");
        b.rect(child, 0.0, (i * 20) as f64, 800.0, 20.0);
        b.text(child, "some text content for the box");
    }

    (b.finish(), root)
}

/// Same shape with an image in every fourth box, all pointing at one URL.
fn image_document(boxes: usize) -> (Document, NodeId) {
    let mut b = DocumentBuilder::new().base_url("https://bench.test/");
    let root = b.el("div");
    b.rect(root, 0.0, 0.0, 800.0, 600.0);

    for i in 0..boxes {
        let child = b.element(root, "div");
        b.rect(child, 0.0, (i * 20) as f64, 800.0, 20.0);
        if i % 4 == 0 {
            let img = b.element(child, "img");
            b.attr(img, "src", "pic.png");
            b.rect(img, 0.0, (i * 20) as f64, 16.0, 16.0);
        }
    }

    (b.finish(), root)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Capture Benchmarks
// ============================================================================

fn bench_capture_small(c: &mut Criterion) {
    let rt = runtime();
    let (doc, root) = sample_document(10);
    let dom = SnapDom::new();
    let options = CaptureOptions::new();

    c.bench_function("capture_small", |b| {
        b.iter(|| rt.block_on(dom.capture(&doc, root, &options)).unwrap());
    });
}

fn bench_capture_wide(c: &mut Criterion) {
    let rt = runtime();
    let (doc, root) = sample_document(500);
    let dom = SnapDom::new();
    let options = CaptureOptions::new();

    c.bench_function("capture_wide", |b| {
        b.iter(|| rt.block_on(dom.capture(&doc, root, &options)).unwrap());
    });
}

fn bench_capture_with_images(c: &mut Criterion) {
    let rt = runtime();
    let (doc, root) = image_document(100);
    let fetcher =
        StaticFetcher::new().with("https://bench.test/pic.png", PNG_BYTES.to_vec(), Some("image/png"));
    let dom = SnapDom::with_transport(Arc::new(fetcher));
    let options = CaptureOptions::new();

    c.bench_function("capture_with_images", |b| {
        b.iter(|| rt.block_on(dom.capture(&doc, root, &options)).unwrap());
    });
}

// ============================================================================
// Export Benchmarks
// ============================================================================

fn bench_rasterize_png(c: &mut Criterion) {
    let rt = runtime();
    let (doc, root) = sample_document(50);
    let dom = SnapDom::new();
    let snapshot = rt
        .block_on(dom.capture(&doc, root, &CaptureOptions::new()))
        .unwrap();

    c.bench_function("rasterize_png", |b| {
        b.iter(|| snapshot.to_png().unwrap());
    });
}

criterion_group!(
    benches,
    // Capture pipeline
    bench_capture_small,
    bench_capture_wide,
    bench_capture_with_images,
    // Raster export
    bench_rasterize_png,
);
criterion_main!(benches);
