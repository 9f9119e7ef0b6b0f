//! Integration tests for the render engine
//!
//! These drive a real headless Chrome and are `#[ignore]`d so the default
//! test run stays browser-free. Run them with `cargo test -- --ignored` on a
//! machine with Chrome installed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabshot::{RenderParam, Renderer, Session};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn renderer() -> Renderer {
    Renderer::new(Arc::new(Session::default()))
}

/// Extracts `(width, height)` from a baseline or progressive JPEG by walking
/// its segments to the start-of-frame header.
fn jpeg_dimensions(data: &[u8]) -> Option<(u16, u16)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut i = 2;
    while i + 9 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Fill byte before a marker
            0xFF => i += 1,
            // Standalone markers carry no segment length
            0x01 | 0xD0..=0xD9 => i += 2,
            // Any SOF variant (not DHT 0xC4, DAC 0xCC)
            0xC0..=0xCF if marker != 0xC4 && marker != 0xCC => {
                let height = u16::from_be_bytes([data[i + 5], data[i + 6]]);
                let width = u16::from_be_bytes([data[i + 7], data[i + 8]]);
                return Some((width, height));
            }
            _ => {
                let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
                i += 2 + len;
            }
        }
    }
    None
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_end_to_end_completed_render() {
    let renderer = renderer();
    let params = RenderParam::builder(&serde_json::json!({
        "title": "integration",
        "text": "rendered synchronously",
    }))
    .unwrap()
    .build();

    let started = Instant::now();
    let result = renderer
        .render(fixture("content.html"), params)
        .await
        .expect("render failed");

    assert!(result.is_complete());
    assert!(!result.image.is_empty());
    // JPEG files start with the SOI marker
    assert_eq!(&result.image[0..2], &[0xFF, 0xD8]);
    // A synchronous template must come nowhere near the 5000 ms default wait
    assert!(started.elapsed() < Duration::from_secs(5));

    renderer.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_timeout_degrades_to_incomplete_capture() {
    let renderer = renderer();
    let params = RenderParam::builder(&serde_json::json!({ "title": "slow" }))
        .unwrap()
        .timeout(Duration::from_millis(100))
        .build();

    let started = Instant::now();
    let result = renderer
        .render(fixture("never_complete.html"), params)
        .await
        .expect("degraded render should still succeed");

    let (image, complete) = result.into_parts();
    assert!(!complete);
    assert!(!image.is_empty(), "a timed-out render still captures");
    // The wait itself gives up after ~100 ms; the bound here is generous to
    // cover navigation and capture.
    assert!(started.elapsed() < Duration::from_secs(3));

    renderer.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_width_explicit_and_default() {
    let renderer = renderer();

    let params = RenderParam::builder(&serde_json::json!({ "title": "w" }))
        .unwrap()
        .width(550)
        .build();
    let result = renderer
        .render(fixture("content.html"), params)
        .await
        .unwrap();
    let (width, _) = jpeg_dimensions(&result.image).expect("not a parsable JPEG");
    assert_eq!(width, 550);

    // No explicit width falls back to the engine-wide default
    let params = RenderParam::builder(&serde_json::json!({ "title": "w" }))
        .unwrap()
        .build();
    let result = renderer
        .render(fixture("content.html"), params)
        .await
        .unwrap();
    let (width, _) = jpeg_dimensions(&result.image).expect("not a parsable JPEG");
    assert_eq!(u32::from(width), tabshot::DEFAULT_PAGE_WIDTH);

    renderer.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_concurrent_renders_are_isolated() {
    let renderer = renderer();

    let short = RenderParam::builder(&serde_json::json!({
        "title": "short",
        "text": "a",
    }))
    .unwrap()
    .build();
    let long = RenderParam::builder(&serde_json::json!({
        "title": "long",
        "text": "lorem ipsum dolor sit amet\n".repeat(40),
    }))
    .unwrap()
    .build();

    let (a, b) = tokio::join!(
        renderer.render(fixture("content.html"), short),
        renderer.render(fixture("content.html"), long),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.is_complete());
    assert!(b.is_complete());
    // Each surface rendered only its own payload; forty lines of text lay
    // out taller than one character.
    let (_, height_a) = jpeg_dimensions(&a.image).unwrap();
    let (_, height_b) = jpeg_dimensions(&b.image).unwrap();
    assert!(height_b > height_a, "{height_b} should exceed {height_a}");

    renderer.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_first_use_races_launch_one_browser() {
    let renderer = renderer();

    let mut handles = Vec::new();
    for n in 0..6 {
        let renderer = renderer.clone();
        handles.push(tokio::spawn(async move {
            let params = RenderParam::builder(&serde_json::json!({ "title": format!("req-{n}") }))
                .unwrap()
                .build();
            renderer.render(fixture("content.html"), params).await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().expect("concurrent render failed");
        assert!(result.is_complete());
    }
    assert_eq!(renderer.session().launches(), 1);

    // Shutdown is explicit and idempotent; the next render starts over.
    renderer.shutdown().await;
    renderer.shutdown().await;

    let params = RenderParam::builder(&serde_json::json!({ "title": "again" }))
        .unwrap()
        .build();
    let result = renderer.render(fixture("content.html"), params).await.unwrap();
    assert!(result.is_complete());
    assert_eq!(renderer.session().launches(), 2);

    renderer.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_injected_host_reaches_the_template() {
    // The fixture requests `{host}/probe.png`; observing that request on a
    // local server proves the engine-controlled host key made it into the
    // page.
    let hit = Arc::new(AtomicBool::new(false));
    let hit_writer = hit.clone();
    std::thread::spawn(move || {
        let server = tiny_http::Server::http("127.0.0.1:18090").unwrap();
        for request in server.incoming_requests() {
            if request.url().starts_with("/probe.png") {
                hit_writer.store(true, Ordering::SeqCst);
            }
            let _ = request.respond(tiny_http::Response::from_string("ok"));
        }
    });
    std::thread::sleep(Duration::from_millis(100));

    let renderer = renderer();
    let params = RenderParam::builder(&serde_json::json!({}))
        .unwrap()
        .host("http://127.0.0.1:18090")
        .build();

    let result = renderer
        .render(fixture("host_probe.html"), params)
        .await
        .unwrap();

    assert!(result.is_complete());
    assert!(hit.load(Ordering::SeqCst), "template never called back to the host");

    renderer.shutdown().await;
}
