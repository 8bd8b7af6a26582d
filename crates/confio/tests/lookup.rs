//! End-to-end lookups through the public API, against the in-memory source.

use std::sync::Arc;

use confio_engine::source::memory::MemorySource;
use confio_engine::{ConfigError, ConfigService, Health, Settings, route};

fn orders_service() -> (Arc<MemorySource>, ConfigService) {
    let source = MemorySource::new();
    source.set_label(
        "main",
        "v1",
        [
            ("application.yml", "log.level: info\n"),
            ("orders.yml", "timeout: 5\n"),
            ("orders-prod.yml", "timeout: 30\nretries: 2\n"),
        ],
    );
    let service = ConfigService::new(source.clone(), Settings::new("memory://orders"));
    (source, service)
}

#[tokio::test]
async fn path_lookup_resolves_the_merged_document() {
    let (_source, service) = orders_service();

    let request = route::parse_path("/orders/prod/main").unwrap();
    let response = service.lookup(&request).await.unwrap();

    assert_eq!(response.name, "orders");
    assert_eq!(response.profiles, vec!["prod"]);
    assert_eq!(response.label, "main");
    assert_eq!(response.version, "v1");
    assert_eq!(response.property_sources.len(), 3);
    assert_eq!(response.effective_value("timeout"), Some("30"));
    assert_eq!(response.effective_value("retries"), Some("2"));
    assert_eq!(response.effective_value("log.level"), Some("info"));
}

#[tokio::test]
async fn document_serializes_in_the_conventional_shape() {
    let (_source, service) = orders_service();

    let request = route::parse_path("/orders/prod").unwrap();
    let response = service.lookup(&request).await.unwrap();
    let json = serde_json::to_value(&*response).unwrap();

    assert_eq!(json["name"], "orders");
    assert_eq!(json["label"], "main");
    assert_eq!(json["version"], "v1");
    assert_eq!(json["propertySources"][0]["name"], "orders-prod.yml@main");
    assert_eq!(json["propertySources"][0]["source"]["timeout"], "30");
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let (_source, service) = orders_service();

    let request = route::parse_path("/missing-app/prod").unwrap();
    let err = service.lookup(&request).await.unwrap_err();
    assert!(matches!(err, ConfigError::ApplicationNotFound { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn outage_surfaces_as_retryable_and_health_goes_down() {
    let (source, service) = orders_service();

    let request = route::parse_path("/orders/prod").unwrap();
    service.lookup(&request).await.unwrap();
    assert_eq!(service.health(), Health::Up);

    source.set_unavailable("store down");
    service.invalidate("main");
    let err = service.lookup(&request).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn version_observed_by_one_key_evicts_the_labels_stale_entries() {
    let source = MemorySource::new();
    source.set_label(
        "main",
        "v1",
        [
            ("orders.yml", "timeout: 5\n"),
            ("billing.yml", "mode: batch\n"),
        ],
    );
    let service = ConfigService::new(source.clone(), Settings::new("memory://pair"));

    let orders = service
        .lookup(&route::parse_path("/orders/prod").unwrap())
        .await
        .unwrap();
    assert_eq!(orders.version, "v1");

    // Upstream moves; a lookup for a different key of the same label
    // fetches and observes the new version.
    source.set_label(
        "main",
        "v2",
        [
            ("orders.yml", "timeout: 9\n"),
            ("billing.yml", "mode: stream\n"),
        ],
    );
    let billing = service
        .lookup(&route::parse_path("/billing/prod").unwrap())
        .await
        .unwrap();
    assert_eq!(billing.version, "v2");

    // The orders entry pinned to v1 must not outlive that observation.
    let orders = service
        .lookup(&route::parse_path("/orders/prod").unwrap())
        .await
        .unwrap();
    assert_eq!(orders.version, "v2");
    assert_eq!(orders.effective_value("timeout"), Some("9"));
}

#[tokio::test]
async fn version_bump_with_refresh_serves_the_new_revision() {
    let (source, service) = orders_service();

    let request = route::parse_path("/orders/prod").unwrap();
    assert_eq!(service.lookup(&request).await.unwrap().version, "v1");

    source.set_label("main", "v2", [("orders.yml", "timeout: 7\n")]);
    service.refresh("main").await.unwrap();

    let response = service.lookup(&request).await.unwrap();
    assert_eq!(response.version, "v2");
    assert_eq!(response.effective_value("timeout"), Some("7"));
}
