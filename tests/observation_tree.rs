use obs_ingest::{BatchingConfig, Client, ClientConfig, ObservationCapability};
use std::time::Duration;

fn quiet_config() -> ClientConfig {
    let mut config = ClientConfig::new("pk-test", "sk-test");
    config.base_url = Some("https://obs-ingest.invalid".to_string());
    config.batching = BatchingConfig {
        batch_size: 1_000_000,
        flush_interval: Duration::from_secs(3600),
        ..config.batching
    };
    config.apply_defaults()
}

#[tokio::test]
async fn spans_and_generations_inherit_their_trace_id() {
    let client = Client::new(quiet_config()).expect("valid config builds a client");

    let trace = client.new_trace(serde_json::json!({"name": "checkout"})).await.unwrap();
    let span = trace.new_span(serde_json::json!({"name": "validate-cart"})).await.unwrap();
    let generation = span.new_generation(serde_json::json!({"model": "gpt"})).await.unwrap();
    let nested_span = generation.new_span(serde_json::json!({"name": "retry"})).await.unwrap();

    assert_eq!(span.trace_id(), trace.id());
    assert_eq!(generation.trace_id(), trace.id());
    assert_eq!(nested_span.trace_id(), trace.id());
    assert_ne!(span.id(), generation.id());
    assert_ne!(span.id(), nested_span.id());
}

#[tokio::test]
async fn events_and_scores_do_not_produce_new_observations() {
    let client = Client::new(quiet_config()).expect("valid config builds a client");
    let trace = client.new_trace(serde_json::json!({"name": "checkout"})).await.unwrap();

    trace.new_event(serde_json::json!({"message": "started"})).await.unwrap();
    trace.new_score(serde_json::json!({"name": "relevance", "value": 1.0})).await.unwrap();

    // trace create, event, and score are each one admission.
    let stats = client.stats();
    assert!(stats.admitted_accepted >= 3);
    assert_eq!(stats.admitted_rejected, 0);
}
