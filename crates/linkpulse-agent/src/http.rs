//! HTTP status surface: engine status, plot-ready window, Prometheus metrics.

use std::net::SocketAddr;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use linkpulse_core::EngineStatus;
use linkpulse_core::window::{SampleWindow, WindowSlot};

#[derive(Clone)]
pub struct AppState {
    pub window: watch::Receiver<SampleWindow>,
    pub status: watch::Receiver<EngineStatus>,
}

/// One window slot as a chart consumes it. Loss is a fraction, not percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotPoint {
    pub timepoint_unix_ms: i64,
    pub bitrate: f64,
    pub rtt: f64,
    pub loss: f64,
}

impl PlotPoint {
    /// `None` for gaps and for samples without stats.
    pub fn from_slot(slot: &WindowSlot) -> Option<Self> {
        let sample = slot.as_sample()?;
        let stats = sample.stats?;
        Some(PlotPoint {
            timepoint_unix_ms: sample.timestamp_ms,
            bitrate: stats.bitrate_mbps,
            rtt: stats.rtt_ms,
            loss: stats.loss_rate_percent / 100.0,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/window", get(window_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http status server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn status_handler(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.status.borrow().clone())
}

async fn window_handler(State(state): State<AppState>) -> Json<Vec<Option<PlotPoint>>> {
    let points = state.window.borrow().iter().map(PlotPoint::from_slot).collect();
    Json(points)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = linkpulse_core::metrics::render_prometheus(&state.status.borrow());
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use linkpulse_core::lifecycle::ConnectionState;
    use linkpulse_core::sample::{InstantStats, Sample};
    use tower::ServiceExt;

    fn sample(ts: i64, loss: f64) -> Sample {
        Sample {
            timestamp_ms: ts,
            stats: Some(InstantStats {
                bitrate_mbps: 4.0,
                rtt_ms: 20.0,
                loss_rate_percent: loss,
            }),
        }
    }

    fn test_state() -> (
        AppState,
        watch::Sender<SampleWindow>,
        watch::Sender<EngineStatus>,
    ) {
        let mut window = SampleWindow::new(4);
        window.push_sample(sample(1_000, 25.0));
        window.push_gap();
        window.push_sample(Sample {
            timestamp_ms: 2_000,
            stats: None,
        });
        let status = EngineStatus {
            is_receiving: true,
            connection: ConnectionState::Connected,
            samples_admitted: 2,
            last_sample: Some(sample(1_000, 25.0)),
            ..Default::default()
        };
        let (window_tx, window_rx) = watch::channel(window);
        let (status_tx, status_rx) = watch::channel(status);
        let state = AppState {
            window: window_rx,
            status: status_rx,
        };
        (state, window_tx, status_tx)
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(&bytes);
            panic!("not valid JSON: {text}");
        })
    }

    #[tokio::test]
    async fn status_reports_engine_snapshot() {
        let (state, _w, _s) = test_state();
        let resp = get(router(state), "/api/status").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["is_receiving"], true);
        assert_eq!(body["is_disconnected"], false);
        assert_eq!(body["quality"], "good");
        assert_eq!(body["connection"], "connected");
        assert_eq!(body["samples_admitted"], 2);
        assert_eq!(body["last_sample"]["timestamp_ms"], 1_000);
    }

    #[tokio::test]
    async fn window_is_plot_ready() {
        let (state, _w, _s) = test_state();
        let body = json_body(get(router(state), "/api/window").await).await;
        let points = body.as_array().unwrap();

        assert_eq!(points.len(), 4);
        assert!(points[0].is_null());
        assert_eq!(points[1]["timepoint_unix_ms"], 1_000);
        assert_eq!(points[1]["bitrate"], 4.0);
        assert_eq!(points[1]["rtt"], 20.0);
        assert_eq!(points[1]["loss"], 0.25);
        assert!(points[2].is_null());
        // Sample without stats has nothing to plot.
        assert!(points[3].is_null());
    }

    #[tokio::test]
    async fn routes_follow_latest_publish() {
        let (state, window_tx, status_tx) = test_state();
        window_tx.send_modify(|w| {
            w.push_sample(sample(3_000, 1.0));
        });
        status_tx.send_modify(|s| s.is_receiving = false);

        let app = router(state);
        let window = json_body(get(app.clone(), "/api/window").await).await;
        assert_eq!(window[3]["timepoint_unix_ms"], 3_000);
        let status = json_body(get(app, "/api/status").await).await;
        assert_eq!(status["is_receiving"], false);
    }

    #[tokio::test]
    async fn metrics_exposition() {
        let (state, _w, _s) = test_state();
        let resp = get(router(state), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[axum::http::header::CONTENT_TYPE],
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("linkpulse_receiving 1\n"));
        assert!(text.contains("linkpulse_loss_rate_percent 25.000\n"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (state, _w, _s) = test_state();
        let resp = get(router(state), "/api/nope").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn plot_point_mapping() {
        assert_eq!(PlotPoint::from_slot(&WindowSlot::Gap), None);
        assert_eq!(
            PlotPoint::from_slot(&WindowSlot::Sample(sample(5, 50.0))),
            Some(PlotPoint {
                timepoint_unix_ms: 5,
                bitrate: 4.0,
                rtt: 20.0,
                loss: 0.5,
            })
        );
    }
}
