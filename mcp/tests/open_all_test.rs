//! `open_all` against the real connector with providers that cannot be reached.

use std::time::Duration;

use toolgate_mcp::{open_all, McpConnector, ProviderConfig, ProviderMap, TransportKind};

#[tokio::test]
async fn test_unreachable_providers_yield_empty_set() {
    let connector = McpConnector::new(Duration::from_secs(2));
    let configs: ProviderMap = [
        (
            "events",
            ProviderConfig::remote("http://127.0.0.1:1/sse", Some(TransportKind::Sse)),
        ),
        ("api", ProviderConfig::remote("http://127.0.0.1:1/mcp", None)),
        (
            "local",
            ProviderConfig::stdio("/nonexistent/toolgate-provider", vec![]),
        ),
    ]
    .into_iter()
    .collect();

    let set = open_all(&connector, &configs).await;
    assert!(set.is_empty());
    assert!(set.merge_catalog().is_empty());
    assert!(set.close_all().await.is_empty());
}
