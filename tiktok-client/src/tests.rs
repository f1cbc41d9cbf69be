#[cfg(test)]
mod tests {
    use crate::{
        extension_for_content_type, parse_challenge_id, parse_item_page, status_error,
        HttpMediaDownloader, TikTokClient,
    };
    use harvest_core::{
        CoreError, FetchError, FetchOutcome, HarvestConfig, MediaDownloader, MediaError,
        MediaSettings, MediaSource, MediaTask, PostFetcher,
    };
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Clone)]
    struct Canned {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    }

    impl Canned {
        fn json(body: Value) -> Self {
            Self {
                status: 200,
                headers: vec![("Content-Type", "application/json".to_string())],
                body: body.to_string().into_bytes(),
            }
        }

        fn status(status: u16) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            }
        }

        fn bytes(content_type: &str, body: &[u8]) -> Self {
            Self {
                status: 200,
                headers: vec![("Content-Type", content_type.to_string())],
                body: body.to_vec(),
            }
        }

        fn header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.push((name, value.to_string()));
            self
        }
    }

    /// Minimal HTTP/1.1 server answering each connection with the next canned
    /// response; the last one repeats once the queue is drained.
    struct StubServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(responses: Vec<Canned>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);

            tokio::spawn(async move {
                let mut served = 0usize;
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else { break };
                    let mut buffer = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buffer);
                    let request_line = head.lines().next().unwrap_or("").to_string();
                    seen.lock().unwrap().push(request_line);

                    let canned = responses[served.min(responses.len() - 1)].clone();
                    served += 1;

                    let mut reply = format!("HTTP/1.1 {} Stub\r\n", canned.status);
                    for (name, value) in &canned.headers {
                        reply.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    reply.push_str(&format!(
                        "Content-Length: {}\r\nConnection: close\r\n\r\n",
                        canned.body.len()
                    ));
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.write_all(&canned.body).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self { base_url, requests }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn test_config(base_url: &str) -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.fetch.base_url = base_url.to_string();
        config.fetch.page_size = 2;
        config.fetch.requests_per_minute = 60_000;
        config.fetch.ms_token = Some("token123".to_string());
        config.retry.max_attempts = 2;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.retry.jitter_factor = 0.0;
        config
    }

    fn challenge(id: &str) -> Canned {
        Canned::json(json!({
            "statusCode": 0,
            "challengeInfo": {"challenge": {"id": id, "title": "cats"}}
        }))
    }

    fn page(ids: &[&str], has_more: bool, cursor: &str) -> Canned {
        let items: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
        Canned::json(json!({
            "statusCode": 0,
            "itemList": items,
            "hasMore": has_more,
            "cursor": cursor
        }))
    }

    fn ids(outcome: &FetchOutcome) -> Vec<String> {
        match outcome {
            FetchOutcome::Fetched(items) => items
                .iter()
                .map(|item| item["id"].as_str().unwrap().to_string())
                .collect(),
            other => panic!("expected fetched records, got {:?}", other),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some("12"), "cats"),
            FetchError::RateLimitExceeded { retry_after: 12 }
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, "cats"),
            FetchError::RateLimitExceeded { retry_after: 60 }
        );
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, "cats"),
            FetchError::Forbidden { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, "cats"),
            FetchError::Forbidden { .. }
        ));
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, None, "cats"),
            FetchError::HashtagNotFound {
                hashtag: "cats".to_string()
            }
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, None, "cats"),
            FetchError::ServerError { status_code: 502 }
        );
    }

    #[test]
    fn test_parse_challenge_id() {
        let body = json!({"challengeInfo": {"challenge": {"id": "1234"}}}).to_string();
        assert_eq!(parse_challenge_id(&body, "cats").unwrap(), "1234");

        let numeric = json!({"challengeInfo": {"challenge": {"id": 99}}}).to_string();
        assert_eq!(parse_challenge_id(&numeric, "cats").unwrap(), "99");

        let missing = json!({"statusCode": 10205, "challengeInfo": {}}).to_string();
        assert!(matches!(
            parse_challenge_id(&missing, "cats"),
            Err(FetchError::HashtagNotFound { .. })
        ));

        assert!(matches!(
            parse_challenge_id("", "cats"),
            Err(FetchError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_parse_item_page() {
        let body = json!({"itemList": [{"id": "1"}], "hasMore": true, "cursor": "30"}).to_string();
        let page = parse_item_page(&body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.cursor, 30);

        let bare = json!({"statusCode": 0}).to_string();
        let page = parse_item_page(&bare).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);

        let refused = json!({"statusCode": 10101}).to_string();
        assert!(matches!(
            parse_item_page(&refused),
            Err(FetchError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_content_type_extensions() {
        assert_eq!(extension_for_content_type("image/jpeg").as_deref(), Some("jpeg"));
        assert_eq!(extension_for_content_type("video/mp4; codecs=avc1").as_deref(), Some("mp4"));
        assert_eq!(extension_for_content_type("audio/mpeg").as_deref(), Some("mpeg"));
        assert_eq!(extension_for_content_type("image/svg+xml").as_deref(), Some("svg"));
        assert_eq!(extension_for_content_type("text/html"), None);
        assert_eq!(extension_for_content_type(""), None);
    }

    #[tokio::test]
    async fn test_search_pages_until_feed_ends() {
        let server = StubServer::start(vec![
            challenge("42"),
            page(&["1", "2"], true, "2"),
            page(&["3"], false, "3"),
        ])
        .await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 10).await.unwrap();
        assert_eq!(ids(&outcome), vec!["1", "2", "3"]);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].contains("/api/challenge/detail/"));
        assert!(requests[0].contains("challengeName=cats"));
        assert!(requests[0].contains("msToken=token123"));
        assert!(requests[1].contains("challengeID=42"));
        assert!(requests[1].contains("cursor=0"));
        assert!(requests[2].contains("cursor=2"));
    }

    #[tokio::test]
    async fn test_search_stops_at_limit() {
        let server = StubServer::start(vec![
            challenge("42"),
            page(&["1", "2"], true, "2"),
            page(&["3"], true, "3"),
        ])
        .await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 3).await.unwrap();
        assert_eq!(ids(&outcome), vec!["1", "2", "3"]);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].contains("count=1"));
    }

    #[tokio::test]
    async fn test_empty_first_page_is_empty_outcome() {
        let server = StubServer::start(vec![challenge("42"), page(&[], true, "0")]).await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 10).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Empty));
    }

    #[tokio::test]
    async fn test_unknown_hashtag_is_empty_outcome() {
        let server = StubServer::start(vec![Canned::status(404)]).await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("nosuchtag", 10).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Empty));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_is_an_error() {
        let server = StubServer::start(vec![Canned::status(403)]).await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let result = client.fetch("cats", 10).await;
        assert!(matches!(
            result,
            Err(CoreError::Fetch(FetchError::Forbidden { .. }))
        ));
    }

    #[tokio::test]
    async fn test_server_errors_become_transient_after_retries() {
        let server = StubServer::start(vec![Canned::status(503)]).await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 10).await.unwrap();
        assert!(matches!(
            outcome,
            FetchOutcome::Transient(FetchError::ServerError { status_code: 503 })
        ));
        assert_eq!(server.requests().len(), 2);
        assert_eq!(client.retry_metrics().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = StubServer::start(vec![
            Canned::status(429).header("Retry-After", "0"),
            challenge("42"),
            page(&["1"], false, "1"),
        ])
        .await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 10).await.unwrap();
        assert_eq!(ids(&outcome), vec!["1"]);
        assert_eq!(client.retry_metrics().successful_retries, 1);
    }

    #[tokio::test]
    async fn test_failing_later_page_keeps_collected_posts() {
        let server = StubServer::start(vec![
            challenge("42"),
            page(&["1", "2"], true, "2"),
            Canned::bytes("application/json", b""),
        ])
        .await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 10).await.unwrap();
        assert_eq!(ids(&outcome), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_zero_limit_sends_nothing() {
        let server = StubServer::start(vec![challenge("42")]).await;
        let client = TikTokClient::new(&test_config(&server.base_url)).unwrap();

        let outcome = client.fetch("cats", 0).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Empty));
        assert!(server.requests().is_empty());
    }

    fn downloader(command: Option<&str>) -> HttpMediaDownloader {
        let settings = MediaSettings {
            downloader_command: command.map(str::to_string),
            timeout_secs: 5,
            tool_timeout_secs: 5,
        };
        HttpMediaDownloader::new(&settings, "test-agent").unwrap()
    }

    #[tokio::test]
    async fn test_gallery_download_names_files() {
        let server = StubServer::start(vec![
            Canned::bytes("image/jpeg", b"first"),
            Canned::bytes("image/png", b"second"),
            Canned::bytes("audio/mpeg", b"song"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let task = MediaTask {
            post_id: "77".to_string(),
            source: MediaSource::Gallery {
                image_urls: vec![
                    format!("{}/a.jpeg", server.base_url),
                    format!("{}/b.png", server.base_url),
                ],
                audio_url: Some(format!("{}/song", server.base_url)),
            },
        };

        let files = downloader(None).download(&task, dir.path()).await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(std::fs::read(dir.path().join("77_00.jpeg")).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join("77_01.png")).unwrap(), b"second");
        assert_eq!(std::fs::read(dir.path().join("77.mpeg")).unwrap(), b"song");
    }

    #[tokio::test]
    async fn test_direct_video_download() {
        let server = StubServer::start(vec![Canned::bytes("video/mp4", b"frames")]).await;
        let dir = tempfile::tempdir().unwrap();
        let task = MediaTask {
            post_id: "5".to_string(),
            source: MediaSource::Video {
                page_url: "https://www.tiktok.com/@someone/video/5".to_string(),
                direct_url: Some(format!("{}/play", server.base_url)),
            },
        };

        let files = downloader(None).download(&task, dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("5.mp4")]);
    }

    #[tokio::test]
    async fn test_forbidden_media_is_unavailable() {
        let server = StubServer::start(vec![Canned::status(403)]).await;
        let dir = tempfile::tempdir().unwrap();

        let result = downloader(None)
            .download_file("9", &format!("{}/x", server.base_url), dir.path(), "9")
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Media(MediaError::Unavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_non_media_content_leaves_no_file() {
        let server = StubServer::start(vec![Canned::bytes("text/html", b"<html>")]).await;
        let dir = tempfile::tempdir().unwrap();

        let result = downloader(None)
            .download_file("9", &format!("{}/x", server.base_url), dir.path(), "9")
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Media(MediaError::UnsupportedContentType { .. }))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_video_page_without_downloader_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let task = MediaTask {
            post_id: "5".to_string(),
            source: MediaSource::Video {
                page_url: "https://www.tiktok.com/@someone/video/5".to_string(),
                direct_url: None,
            },
        };

        let result = downloader(None).download(&task, dir.path()).await;
        assert!(matches!(
            result,
            Err(CoreError::Media(MediaError::Unavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_external_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = downloader(Some("hashtag-harvest-no-such-downloader"))
            .run_external("5", "https://www.tiktok.com/@someone/video/5", dir.path())
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Media(MediaError::ToolFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_path_like_post_id_writes_nothing() {
        let server = StubServer::start(vec![Canned::bytes("image/jpeg", b"x")]).await;
        let root = tempfile::tempdir().unwrap();
        let media_dir = root.path().join("cats").join("media");
        let task = MediaTask {
            post_id: "../../escaped".to_string(),
            source: MediaSource::Gallery {
                image_urls: vec![format!("{}/a.jpeg", server.base_url)],
                audio_url: None,
            },
        };

        let result = downloader(None).download(&task, &media_dir).await;
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
        assert!(server.requests().is_empty());
        assert!(!root.path().join("escaped_00.jpeg").exists());
        assert!(!media_dir.exists());
    }
}
