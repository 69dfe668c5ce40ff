use common::FeedSource;
use newsdigest::ingestion::{fetch_sources, FeedClient, FetchErrorKind, HttpFeedClient};
use std::time::Duration;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>urn:example:feed</id>
  <updated>2024-04-02T10:00:00Z</updated>
  <entry>
    <title>First post</title>
    <id>urn:example:1</id>
    <link href="https://example.com/posts/1"/>
    <published>2024-04-01T09:00:00Z</published>
    <updated>2024-04-02T10:00:00Z</updated>
    <summary>Hello world</summary>
  </entry>
  <entry>
    <title>Second post</title>
    <id>urn:example:2</id>
    <link href="https://example.com/posts/2"/>
    <updated>2024-04-02T10:00:00Z</updated>
  </entry>
</feed>"#;

#[tokio::test]
async fn fetches_and_parses_atom_over_http() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/atom.xml")
        .with_status(200)
        .with_header("content-type", "application/atom+xml")
        .with_body(ATOM)
        .create_async()
        .await;

    let client = HttpFeedClient::new().expect("client");
    let feed = client
        .fetch(&format!("{}/atom.xml", server.url()), Duration::from_secs(5))
        .await
        .expect("feed");

    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.entries[0].links[0].href, "https://example.com/posts/1");
    mock.assert_async().await;
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.xml")
        .with_status(404)
        .create_async()
        .await;

    let client = HttpFeedClient::new().expect("client");
    let err = client
        .fetch(&format!("{}/missing.xml", server.url()), Duration::from_secs(5))
        .await
        .expect_err("404 must fail");

    assert_eq!(err.kind(), FetchErrorKind::HttpStatus);
    assert_eq!(err.to_string(), "feed fetch failed with status: 404");
}

#[tokio::test]
async fn malformed_document_is_a_parse_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken.xml")
        .with_status(200)
        .with_body("this is not a feed")
        .create_async()
        .await;

    let client = HttpFeedClient::new().expect("client");
    let err = client
        .fetch(&format!("{}/broken.xml", server.url()), Duration::from_secs(5))
        .await
        .expect_err("garbage must fail");

    assert_eq!(err.kind(), FetchErrorKind::Parse);
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() {
    // Nothing listens on port 9 (discard) on the loopback interface in CI.
    let client = HttpFeedClient::new().expect("client");
    let err = client
        .fetch("http://127.0.0.1:9/feed.xml", Duration::from_secs(5))
        .await
        .expect_err("connection refused");

    assert!(matches!(
        err.kind(),
        FetchErrorKind::Network | FetchErrorKind::Timeout
    ));
}

#[tokio::test]
async fn each_source_is_fetched_once_in_order_and_isolated() {
    let mut server = mockito::Server::new_async().await;
    let ok_a = server
        .mock("GET", "/a.xml")
        .with_status(200)
        .with_body(ATOM)
        .expect(1)
        .create_async()
        .await;
    let failing = server
        .mock("GET", "/b.xml")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let ok_c = server
        .mock("GET", "/c.xml")
        .with_status(200)
        .with_body(ATOM)
        .expect(1)
        .create_async()
        .await;

    let sources = vec![
        FeedSource::new("A", format!("{}/a.xml", server.url()), "one"),
        FeedSource::new("B", format!("{}/b.xml", server.url()), "one"),
        FeedSource::new("C", format!("{}/c.xml", server.url()), "two"),
    ];

    let client = HttpFeedClient::new().expect("client");
    let outcome = fetch_sources(&client, &sources, Duration::from_secs(5)).await;

    let fetched: Vec<_> = outcome.feeds.iter().map(|f| f.source.name.as_str()).collect();
    assert_eq!(fetched, vec!["A", "C"]);
    assert_eq!(outcome.entry_count(), 4);

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source_name, "B");
    assert_eq!(outcome.failures[0].kind, FetchErrorKind::HttpStatus);

    ok_a.assert_async().await;
    failing.assert_async().await;
    ok_c.assert_async().await;
}
