//! Live HTTP transport tests.
//!
//! Serves fixtures from a local server and captures through the default
//! transport, covering relative URL resolution, concurrent request
//! coalescing, and HTTP error degradation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use snapdom::{CaptureOptions, DocumentBuilder, SnapDom};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Serve `/pic.png` from a background thread, counting requests that reach
/// it. Anything else is a 404. Returns the base URL of the server.
fn serve_png() -> (String, Arc<AtomicUsize>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("Failed to bind test server");
    let addr = server.server_addr().to_ip().expect("Server has no IP address");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    thread::spawn(move || {
        for request in server.incoming_requests() {
            if request.url() == "/pic.png" {
                counter.fetch_add(1, Ordering::SeqCst);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"image/png"[..])
                        .expect("Failed to build header");
                let response = tiny_http::Response::from_data(PNG_MAGIC.to_vec()).with_header(header);
                let _ = request.respond(response);
            } else {
                let _ = request.respond(tiny_http::Response::empty(404));
            }
        }
    });

    (format!("http://{addr}/"), hits)
}

#[tokio::test]
async fn test_capture_inlines_served_image() {
    let (base, hits) = serve_png();

    let mut b = DocumentBuilder::new().base_url(base);
    let root = b.el("div");
    b.rect(root, 0.0, 0.0, 100.0, 60.0);
    let img = b.element(root, "img");
    b.attr(img, "src", "pic.png");
    b.rect(img, 0.0, 0.0, 8.0, 8.0);
    let doc = b.finish();

    let dom = SnapDom::new();
    let snap = dom
        .capture(&doc, root, &CaptureOptions::new())
        .await
        .expect("Failed to capture");

    assert!(snap.to_raw().contains("src=\"data:image/png;base64,"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_requests_for_one_url_coalesce() {
    let (base, hits) = serve_png();

    let mut b = DocumentBuilder::new().base_url(base);
    let root = b.el("div");
    b.rect(root, 0.0, 0.0, 100.0, 60.0);
    for _ in 0..3 {
        let img = b.element(root, "img");
        b.attr(img, "src", "pic.png");
        b.rect(img, 0.0, 0.0, 8.0, 8.0);
    }
    let doc = b.finish();

    let dom = SnapDom::new();
    let snap = dom
        .capture(&doc, root, &CaptureOptions::new())
        .await
        .expect("Failed to capture");

    // The three fetches run in one batch; in-flight coalescing leaves a
    // single request on the wire.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(snap.to_raw().matches("data:image/png;base64,").count(), 3);
}

#[tokio::test]
async fn test_http_error_degrades_to_placeholder() {
    let (base, hits) = serve_png();

    let mut b = DocumentBuilder::new().base_url(base);
    let root = b.el("div");
    b.rect(root, 0.0, 0.0, 100.0, 60.0);
    let img = b.element(root, "img");
    b.attr(img, "src", "absent.png");
    b.rect(img, 0.0, 0.0, 40.0, 30.0);
    let doc = b.finish();

    let dom = SnapDom::new();
    let snap = dom
        .capture(&doc, root, &CaptureOptions::new())
        .await
        .expect("Failed to capture");

    let raw = snap.to_raw();
    assert!(!raw.contains("<img"));
    assert!(raw.contains("background-color: #ccc;"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
