use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

/// Prometheus exposition endpoint.
pub async fn get(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
