// src/metrics.rs
use axum::{extract::State, routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process; later calls reuse it.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
            gauge!("ratelimit_table_entries").set(0.0);
            Ok::<_, anyhow::Error>(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// `GET /metrics` in Prometheus text format.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(render))
            .with_state(self.handle.clone())
    }
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
