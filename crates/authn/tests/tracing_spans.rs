//! Integration test verifying that token and rotation operations produce
//! the expected spans and never record secrets or tokens.

#![allow(clippy::expect_used)]

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use carebase_common_authn::testutil::TestAuth;
use serde_json::json;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer — records span names and every recorded field value
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    values: Arc<Mutex<Vec<String>>>,
}

struct Recorder<'a>(&'a mut Vec<String>);

impl Visit for Recorder<'_> {
    fn record_debug(&mut self, _field: &Field, value: &dyn fmt::Debug) {
        self.0.push(format!("{value:?}"));
    }
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
        attrs.record(&mut Recorder(&mut self.values.lock().expect("lock poisoned")));
    }

    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        event.record(&mut Recorder(&mut self.values.lock().expect("lock poisoned")));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn token_and_rotation_operations_create_spans() {
    let collector = Collector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let auth = TestAuth::new().await;
    let token = auth.issuer.issue_access_token(&json!({"id": "usr_1"})).expect("issue");
    auth.verifier.verify_access_token(&token).expect("verify");
    auth.service.force_rotation().await.expect("rotate");
    auth.service.shutdown().await;

    let recorded = spans.lock().expect("lock poisoned");
    for name in ["initialize", "issue", "verify", "rotate"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}

#[tokio::test]
async fn secrets_and_tokens_never_recorded() {
    let collector = Collector::default();
    let values = Arc::clone(&collector.values);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let auth = TestAuth::new().await;
    let key_set = auth.service.history().expect("initialized").current();
    let token = auth.issuer.issue_access_token(&json!({"id": "usr_1"})).expect("issue");
    auth.verifier.verify_access_token(&token).expect("verify");
    let _ = auth.verifier.verify_access_token("not-a-jwt");
    auth.service.force_rotation().await.expect("rotate");
    auth.service.shutdown().await;

    let recorded = values.lock().expect("lock poisoned");
    assert!(!recorded.is_empty());
    for value in recorded.iter() {
        assert!(!value.contains(key_set.access_secret.as_str()), "access secret leaked: {value}");
        assert!(!value.contains(key_set.refresh_secret.as_str()), "refresh secret leaked: {value}");
        assert!(!value.contains(&token), "token leaked: {value}");
    }
}
