//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on key-store operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use carebase_common_storage::{
    auth::{FileKeySetStore, KeySetStore, MemoryKeySetStore},
    testutil::make_key_set,
};
use chrono::{Duration, Utc};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer — records span names as they are created
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

async fn exercise(store: &dyn KeySetStore) {
    let key_set = make_key_set("v1_aa", Utc::now(), Duration::days(7));
    store.persist_current(&key_set).await.expect("persist current");
    store.load_current().await.expect("load current");
    store.persist_retired(&[key_set]).await.expect("persist retired");
    store.load_retired().await.expect("load retired");
}

fn assert_all_spans(recorded: &[String]) {
    for name in ["persist_current", "load_current", "persist_retired", "load_retired"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_store_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    exercise(&MemoryKeySetStore::new()).await;

    assert_all_spans(&spans.lock().expect("lock poisoned"));
}

#[tokio::test]
async fn file_store_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let tmp = tempfile::TempDir::new().expect("tempdir");
    exercise(&FileKeySetStore::new(tmp.path())).await;

    assert_all_spans(&spans.lock().expect("lock poisoned"));
}
