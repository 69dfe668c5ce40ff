use chrono::{DateTime, Local, TimeZone, Utc};
use common::{RunState, RunStateStore};
use newsdigest::capping::group_by_category;
use newsdigest::delivery::{deliver_and_commit, DigestSink, HtmlFile};
use newsdigest::normalize::Article;
use newsdigest::pipeline::Digest;
use std::sync::Mutex;

/// Records what it was asked to deliver, or fails every time.
struct RecordingSink {
    fail: bool,
    delivered: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DigestSink for RecordingSink {
    fn stage(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, html: &str, _generated_at: DateTime<Local>) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("SMTP delivery failed: connection refused");
        }
        self.delivered.lock().unwrap().push(html.to_string());
        Ok(())
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 6, 0, 0).unwrap()
}

fn digest() -> Digest {
    Digest {
        categories: group_by_category(vec![Article {
            title: "Kernel 6.9".into(),
            link: "https://lwn.example/k".into(),
            description: "Released".into(),
            published: at(2),
            source: "LWN".into(),
            category: "Linux".into(),
            fetch_date: at(3),
        }]),
    }
}

async fn seeded_store(dir: &tempfile::TempDir) -> (RunStateStore, RunState) {
    let store = RunStateStore::new(dir.path().join("state.json"));
    let previous = RunState::new(Some(at(1)));
    store.save(&previous).await.expect("seed state");
    (store, previous)
}

#[tokio::test]
async fn failed_delivery_leaves_the_state_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, previous) = seeded_store(&dir).await;
    let sink = RecordingSink::new(true);
    let next = previous.commit(at(3));

    let err = deliver_and_commit(&digest(), &sink, Local::now(), &store, &next)
        .await
        .expect_err("delivery must fail");

    assert_eq!(err.stage, "email");
    assert!(format!("{:#}", err.error).contains("connection refused"));
    assert_eq!(store.load().await.expect("reload"), previous);
}

#[tokio::test]
async fn failed_file_output_leaves_the_state_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, previous) = seeded_store(&dir).await;
    // a regular file where the output directory should be
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").expect("write blocker");
    let sink = HtmlFile::new(blocker.join("digest.html"));

    let err = deliver_and_commit(&digest(), &sink, Local::now(), &store, &previous.commit(at(3)))
        .await
        .expect_err("write must fail");

    assert_eq!(err.stage, "output");
    assert_eq!(store.load().await.expect("reload"), previous);
}

#[tokio::test]
async fn successful_delivery_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, previous) = seeded_store(&dir).await;
    let sink = RecordingSink::new(false);

    let delivered = deliver_and_commit(&digest(), &sink, Local::now(), &store, &previous.commit(at(3)))
        .await
        .expect("deliver");

    assert!(delivered);
    assert_eq!(sink.count(), 1);
    assert!(sink.delivered.lock().unwrap()[0].contains("Kernel 6.9"));
    assert_eq!(store.load().await.expect("reload").read(), Some(at(3)));
}

#[tokio::test]
async fn empty_digest_skips_delivery_but_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, previous) = seeded_store(&dir).await;
    // a failing sink proves it is never called
    let sink = RecordingSink::new(true);

    let delivered = deliver_and_commit(
        &Digest::default(),
        &sink,
        Local::now(),
        &store,
        &previous.commit(at(3)),
    )
    .await
    .expect("empty run");

    assert!(!delivered);
    assert_eq!(sink.count(), 0);
    assert_eq!(store.load().await.expect("reload").read(), Some(at(3)));
}

#[tokio::test]
async fn dry_run_writes_the_file_then_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (store, previous) = seeded_store(&dir).await;
    let path = dir.path().join("out").join("digest.html");
    let sink = HtmlFile::new(&path);

    let generated_at = Local.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap();

    deliver_and_commit(&digest(), &sink, generated_at, &store, &previous.commit(at(3)))
        .await
        .expect("dry run");

    let html = std::fs::read_to_string(&path).expect("read digest");
    assert!(html.contains("1 articles in 1 categories"));
    assert_eq!(store.load().await.expect("reload").read(), Some(at(3)));
}
