//! Gateway HTTP server

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::backend::DeviceRegistry;
use crate::connection::{adb_handler, admin_handler};
use crate::error::Error;
use crate::registry_cache::RegistryCache;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Directory staging files are created in
    pub staging_dir: PathBuf,
    /// Whether `/admin/adb` is served
    pub admin_enabled: bool,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Device registry used by single-target sessions
    pub registry: Arc<dyn DeviceRegistry>,
    /// Snapshot cache shared by every admin session
    pub cache: RegistryCache,
    /// Directory staging files are created in
    pub staging_dir: PathBuf,
}

impl AppState {
    /// Build state around `registry`
    pub fn new(registry: Arc<dyn DeviceRegistry>, staging_dir: PathBuf) -> Self {
        Self {
            cache: RegistryCache::new(registry.clone()),
            registry,
            staging_dir,
        }
    }
}

/// Build the gateway router
pub fn router(state: AppState, admin_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/adb", get(adb_handler));

    if admin_enabled {
        app = app.route("/admin/adb", get(admin_handler));
    }

    app.with_state(state)
}

/// Start the gateway and serve until `shutdown` resolves
pub async fn start_server<F>(
    config: ServerConfig,
    registry: Arc<dyn DeviceRegistry>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(registry, config.staging_dir.clone());
    let app = router(state, config.admin_enabled);

    let listener = TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {}: {}", config.addr, e)))?;

    info!(
        addr = %config.addr,
        staging_dir = %config.staging_dir.display(),
        admin = config.admin_enabled,
        "Starting ADB gateway"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

    info!("ADB gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::backend::MockDeviceRegistry;

    fn state() -> AppState {
        AppState::new(Arc::new(MockDeviceRegistry::new()), std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router(state(), true)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_adb_route_requires_websocket_upgrade() {
        let response = router(state(), true)
            .oneshot(Request::builder().uri("/adb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_route_absent_when_disabled() {
        let response = router(state(), false)
            .oneshot(
                Request::builder()
                    .uri("/admin/adb")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
