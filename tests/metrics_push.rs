// tests/metrics_push.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use news_push::dispatch::{Dispatcher, LogTransport};
use news_push::feed::JsonFeed;
use news_push::store::{MemoryLedger, MemoryPreferenceStore, PreferenceStore};
use tokio::sync::watch;

#[tokio::test]
async fn metrics_exposed_after_batch() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let prefs = Arc::new(MemoryPreferenceStore::new());
    prefs.set("U1", vec!["政治".into()]).await.unwrap();

    let d = Dispatcher::new(
        Arc::new(JsonFeed::from_fixture(include_str!("fixtures/feed.json"))),
        prefs,
        Arc::new(MemoryLedger::new()),
        Arc::new(LogTransport::new()),
    )
    .with_throttle(Duration::ZERO);

    let (_tx, rx) = watch::channel(false);
    d.push_all(&rx).await.unwrap();

    // Scrape metrics text and check series presence by substring
    let out = handle.render();
    assert!(out.contains("push_recipients_total"));
    assert!(out.contains("push_items_sent_total"));
    assert!(out.contains("push_batch_last_run_ts"));
}
