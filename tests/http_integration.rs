//! HTTP integration tests: the engine over `ReqwestTransport` against a mock server.

use std::sync::Arc;
use std::time::Duration;

use rangeget::download::{
    DownloadConfig, DownloadError, Downloader, HunkRanger, NoopReporter, ReqwestTransport,
    RetryDelay, SegmentError, StaticLink,
};
use tempfile::NamedTempFile;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves `body` honoring `Range: bytes=a-b` with 206 slices.
struct RangeResponder {
    body: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some((lower, upper)) = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split_once('-'))
            .and_then(|(l, u)| Some((l.parse::<usize>().ok()?, u.parse::<usize>().ok()?)))
        else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };
        let upper = upper.min(self.body.len() - 1);
        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {lower}-{upper}/{}", self.body.len()).as_str(),
            )
            .set_body_bytes(self.body[lower..=upper].to_vec())
    }
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

async fn mount_file(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .and(header_exists("range"))
        .respond_with(RangeResponder {
            body: body.to_vec(),
        })
        .mount(server)
        .await;
}

fn downloader(transport: ReqwestTransport, hunks: u64, config: DownloadConfig) -> Downloader {
    Downloader::new(
        Arc::new(transport),
        Arc::new(HunkRanger::new(hunks)),
        Arc::new(NoopReporter),
        config.with_retry_delay(RetryDelay::none()),
    )
    .expect("valid config")
}

fn output() -> (NamedTempFile, Arc<std::fs::File>) {
    let named = NamedTempFile::new().expect("failed to create temp file");
    let file = Arc::new(named.reopen().expect("failed to reopen temp file"));
    (named, file)
}

#[tokio::test]
async fn test_http_download_reassembles_file() {
    let server = MockServer::start().await;
    let body = content(10_000);
    mount_file(&server, "/product.tgz", &body).await;

    let engine = downloader(ReqwestTransport::new().unwrap(), 7, DownloadConfig::default());
    let (named, file) = output();
    let url = format!("{}/product.tgz", server.uri());

    let report = engine
        .fetch(file, &StaticLink::new(&url), std::io::sink())
        .await
        .expect("download should succeed");

    assert_eq!(report.content_length, 10_000);
    assert_eq!(report.ranges, 7);
    assert_eq!(std::fs::read(named.path()).unwrap(), body);

    let requests = server.received_requests().await.unwrap();
    let gets = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(gets, 7);
}

#[tokio::test]
async fn test_http_segments_follow_probe_redirect() {
    let server = MockServer::start().await;
    let body = content(300);
    mount_file(&server, "/mirror/product.tgz", &body).await;
    Mock::given(method("HEAD"))
        .and(path("/product.tgz"))
        .respond_with(
            ResponseTemplate::new(307).insert_header(
                "Location",
                format!("{}/mirror/product.tgz", server.uri()).as_str(),
            ),
        )
        .mount(&server)
        .await;

    let engine = downloader(ReqwestTransport::new().unwrap(), 3, DownloadConfig::default());
    let (named, file) = output();
    let url = format!("{}/product.tgz", server.uri());

    let report = engine
        .fetch(file, &StaticLink::new(&url), std::io::sink())
        .await
        .expect("download should succeed");

    assert!(report.url.ends_with("/mirror/product.tgz"), "{}", report.url);
    assert_eq!(std::fs::read(named.path()).unwrap(), body);

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .all(|r| r.url.path() == "/mirror/product.tgz"),
        "segments must target the redirected URL"
    );
}

#[tokio::test]
async fn test_http_read_timeout_is_retried() {
    let server = MockServer::start().await;
    let body = content(64);
    Mock::given(method("HEAD"))
        .and(path("/slow.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(body.clone())
                .set_delay(Duration::from_secs(5)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(RangeResponder { body: body.clone() })
        .with_priority(2)
        .mount(&server)
        .await;

    let transport =
        ReqwestTransport::with_timeouts(Duration::from_secs(5), Duration::from_millis(300))
            .unwrap();
    let engine = downloader(transport, 1, DownloadConfig::default().with_retries("2"));
    let (named, file) = output();
    let url = format!("{}/slow.bin", server.uri());

    let report = engine
        .fetch(file, &StaticLink::new(&url), std::io::sink())
        .await
        .expect("timed out segment should be retried");

    assert_eq!(report.retries, 1);
    assert_eq!(std::fs::read(named.path()).unwrap(), body);
}

#[tokio::test]
async fn test_http_server_ignoring_range_fails() {
    let server = MockServer::start().await;
    let body = content(100);
    Mock::given(method("HEAD"))
        .and(path("/norange.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/norange.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let engine = downloader(ReqwestTransport::new().unwrap(), 2, DownloadConfig::default());
    let (_named, file) = output();
    let url = format!("{}/norange.bin", server.uri());

    let err = engine
        .get(file, &StaticLink::new(&url), std::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Transfer {
            source: SegmentError::UnexpectedStatus { status: 200 },
            ..
        }
    ));
}

#[tokio::test]
async fn test_http_missing_resource_fails_probe() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = downloader(ReqwestTransport::new().unwrap(), 2, DownloadConfig::default());
    let (_named, file) = output();
    let url = format!("{}/missing.bin", server.uri());

    let err = engine
        .get(file, &StaticLink::new(&url), std::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::ProbeStatus { status: 404, .. }));
    assert_eq!(
        err.to_string(),
        "probe returned unexpected status code: 404"
    );
}
