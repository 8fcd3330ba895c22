//! Integration tests for the image resolver against a local HTTP fixture
//! server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framecast::resolve::{ImageResolver, ResolverConfig, TRANSPARENT_DATA_URI};
use tiny_http::{Header, Response, Server};

/// Tiny PNG header followed by filler; enough to look like image bytes.
fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

fn content_type(value: &str) -> Header {
    format!("Content-Type: {}", value).parse::<Header>().unwrap()
}

/// Serve fixtures from a fresh server on an ephemeral port; returns the
/// base URL and a counter of `/counted.png` hits.
fn start_fixture_server() -> (String, Arc<AtomicUsize>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&counter);

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let path = request.url().to_string();
            let response = match path.as_str() {
                "/ok.png" => Response::from_data(png_bytes()).with_header(content_type("image/png")),
                "/counted.png" => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Response::from_data(png_bytes()).with_header(content_type("image/png"))
                }
                "/unlabeled.webp" => {
                    Response::from_data(png_bytes()).with_header(content_type("application/octet-stream"))
                }
                "/error-page" => Response::from_data(b"<html>blocked</html>".to_vec())
                    .with_header(content_type("text/html; charset=utf-8")),
                "/huge.jpg" => Response::from_data(vec![0u8; 6_500_000])
                    .with_header(content_type("image/jpeg")),
                _ => Response::from_data(b"not found".to_vec()).with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    (format!("http://{}", addr), counter)
}

fn resolver() -> ImageResolver {
    ImageResolver::new(ResolverConfig {
        timeout: Duration::from_secs(5),
        ..ResolverConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn successful_fetch_becomes_data_uri() {
    let (base, _) = start_fixture_server();
    let resolver = resolver();

    let uri = resolver.resolve(&format!("{}/ok.png", base)).await;
    assert!(uri.starts_with("data:image/png;base64,"));
    assert_ne!(uri, TRANSPARENT_DATA_URI);
}

#[tokio::test]
async fn mime_falls_back_to_extension_when_header_is_generic() {
    let (base, _) = start_fixture_server();
    let resolver = resolver();

    let uri = resolver.resolve(&format!("{}/unlabeled.webp", base)).await;
    assert!(uri.starts_with("data:image/webp;base64,"));
}

#[tokio::test]
async fn non_success_status_falls_back() {
    let (base, _) = start_fixture_server();
    let resolver = resolver();

    let uri = resolver.resolve(&format!("{}/missing.png", base)).await;
    assert_eq!(uri, TRANSPARENT_DATA_URI);
}

#[tokio::test]
async fn error_page_content_type_falls_back() {
    let (base, _) = start_fixture_server();
    let resolver = resolver();

    let uri = resolver.resolve(&format!("{}/error-page", base)).await;
    assert_eq!(uri, TRANSPARENT_DATA_URI);
}

#[tokio::test]
async fn oversized_payload_falls_back() {
    let (base, _) = start_fixture_server();
    let resolver = resolver();

    let uri = resolver.resolve(&format!("{}/huge.jpg", base)).await;
    assert_eq!(uri, TRANSPARENT_DATA_URI);
}

#[tokio::test]
async fn cache_short_circuits_repeat_fetches() {
    let (base, hits) = start_fixture_server();
    let resolver = resolver();
    let url = format!("{}/counted.png", base);

    let first = resolver.resolve(&url).await;
    let second = resolver.resolve(&url).await;

    assert_eq!(first, second, "cache must not change the bytes returned");
    assert_eq!(hits.load(Ordering::SeqCst), 1, "second resolution served from cache");
}

#[tokio::test]
async fn unreachable_host_falls_back() {
    // Short timeout: the reserved TEST-NET address never answers, and the
    // fetch is attempted twice (one retry) before falling back.
    let resolver = ImageResolver::new(ResolverConfig {
        timeout: Duration::from_millis(500),
        ..ResolverConfig::default()
    })
    .unwrap();
    let uri = resolver.resolve("http://192.0.2.1:9/img.png").await;
    assert_eq!(uri, TRANSPARENT_DATA_URI);
}
