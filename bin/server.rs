// Freight Rotation - Web Server
// Read-only REST API: queue, share text, lookup

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Local;
use freight_rotation::{
    export, load_drivers, local_now, logging, lookup, project, Config, DriverRow, LookupResult,
    RotationEngine, RotationError, SqliteStore,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    config: Arc<Config>,
}

impl AppState {
    /// Fresh engine from whatever is stored right now
    fn load_engine(&self) -> Result<RotationEngine> {
        let store = self
            .store
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        let drivers = load_drivers(&*store, &self.config.storage_key)?;
        Ok(RotationEngine::from_drivers(drivers, self.config.penalty_strategy))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct QueueResponse {
    next_up: Option<String>,
    drivers: Vec<DriverRow>,
}

fn internal_error<T: Serialize>(context: &str, e: anyhow::Error) -> axum::response::Response {
    let reason = format!("{:#}", e);
    error!(error = %reason, "{}", context);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<T>::err(context)),
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/queue - Every driver in queue order
async fn get_queue(State(state): State<AppState>) -> impl IntoResponse {
    match state.load_engine() {
        Ok(engine) => {
            let response = QueueResponse {
                next_up: engine.next_up().map(|d| d.name.clone()),
                drivers: project(&engine, local_now()),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => internal_error::<QueueResponse>("Error loading queue", e),
    }
}

/// GET /api/share - Ranking text for the drivers' group
async fn get_share(State(state): State<AppState>) -> impl IntoResponse {
    match state.load_engine() {
        Ok(engine) => {
            let text = export::share_text(&engine, &state.config.share_title, Local::now().date_naive());
            (StatusCode::OK, Json(ApiResponse::ok(text))).into_response()
        }
        Err(e) => internal_error::<String>("Error loading queue", e),
    }
}

/// GET /api/lookup/:name - Position of one driver
async fn get_lookup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    // Decode URL-encoded name
    let decoded_name = urlencoding::decode(&name)
        .unwrap_or_else(|_| name.clone().into())
        .into_owned();

    let engine = match state.load_engine() {
        Ok(engine) => engine,
        Err(e) => return internal_error::<LookupResult>("Error loading queue", e),
    };

    match lookup(engine.drivers(), &decoded_name) {
        Ok(result) if result.found => (StatusCode::OK, Json(ApiResponse::ok(result))).into_response(),
        Ok(result) => (StatusCode::NOT_FOUND, Json(ApiResponse::ok(result))).into_response(),
        Err(e @ RotationError::EmptyName) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<LookupResult>::err(e.to_string())),
        )
            .into_response(),
        Err(e) => internal_error::<LookupResult>("Error during lookup", e.into()),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/queue", get(get_queue))
        .route("/share", get(get_share))
        .route("/lookup/:name", get(get_lookup))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let config = Config::load()?;

    println!("🌐 Freight Rotation - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if !config.database_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.database_path);
        eprintln!("   Run: freight-rotation add <name>");
        eprintln!("   to create the roster first.");
        std::process::exit(1);
    }

    let store = SqliteStore::open(&config.database_path)?;
    println!("✓ Database opened: {:?}", config.database_path);

    // Create shared state
    let addr = config.server_addr.clone();
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        config: Arc::new(config),
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   Queue:  /api/queue");
    println!("   Share:  /api/share");
    println!("   Lookup: /api/lookup/<name>");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_rotation::{save_drivers, PenaltyStrategy, DEFAULT_STORAGE_KEY};

    fn state_with(names: &[&str]) -> AppState {
        let mut engine = RotationEngine::new(PenaltyStrategy::CostPenalty);
        for name in names {
            engine.add_driver(name, chrono::Utc::now()).unwrap();
        }

        let mut store = SqliteStore::in_memory().unwrap();
        save_drivers(&mut store, DEFAULT_STORAGE_KEY, engine.drivers()).unwrap();

        AppState {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(Config::default()),
        }
    }

    #[test]
    fn test_load_engine_reads_store() {
        let state = state_with(&["Alice", "Bob"]);
        let engine = state.load_engine().unwrap();
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.next_up().map(|d| d.name.as_str()), Some("Alice"));
    }

    #[tokio::test]
    async fn test_lookup_handler_status() {
        let state = state_with(&["Alice"]);

        let found = get_lookup(State(state.clone()), Path("alice".to_string()))
            .await
            .into_response();
        assert_eq!(found.status(), StatusCode::OK);

        let missing = get_lookup(State(state.clone()), Path("Zé%20Ninguém".to_string()))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let empty = get_lookup(State(state), Path("%20".to_string()))
            .await
            .into_response();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }
}
