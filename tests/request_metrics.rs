//! Request outcome counters, recorded through an installed Prometheus recorder.
//!
//! Kept in its own test binary since the recorder is process-global.

use metrics_exporter_prometheus::PrometheusBuilder;

mod common;

use common::client;

#[tokio::test]
async fn test_service_routes_are_counted() {
    let handle = PrometheusBuilder::new().install_recorder().unwrap();
    let proxy = common::start_proxy().await;
    let domain = proxy.server1().domain.clone();

    let res = client().get(format!("{}/hammerhead.js", domain)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let res = client().post(format!("{}/messaging", domain)).body("not json").send().await.unwrap();
    assert_eq!(res.status(), 500);
    let res = client().get(format!("{}/favicon.ico", domain)).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let rendered = handle.render();
    assert!(rendered.contains("proxy_requests_total{outcome=\"service\"} 2"), "{}", rendered);
    assert!(rendered.contains("proxy_requests_total{outcome=\"not_found\"} 1"), "{}", rendered);

    proxy.close().await;
}
