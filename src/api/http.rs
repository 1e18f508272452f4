use crate::api::types::*;
use crate::cache::ResolveCache;
use crate::config::{Config, TraversalConfig};
use crate::db::Db;
use crate::error::{Result, RelgraphError};
use crate::graph::{Deadline, GraphBuilder, NodeId, PathFinder, ReverseIndex};
use crate::schema::RelationshipSchema;
use crate::store::{self, SqliteStore};
use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Read-only HTTP surface over the relationship engine
pub struct RelationshipServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: Db,
    schema: Arc<RelationshipSchema>,
    traversal: Arc<TraversalConfig>,
}

impl RelationshipServer {
    pub fn new(db: Db, schema: Arc<RelationshipSchema>, config: &Config) -> Self {
        Self {
            state: AppState {
                db,
                schema,
                traversal: Arc::new(config.traversal.clone()),
            },
            allowed_origins: config.http_server.allowed_origins.clone(),
        }
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.router();

        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            RelgraphError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}. Set http_server.port in config.toml to use another port.", addr, e),
            ))
        })?;

        log::info!("Relationship API listening on http://{}", addr);

        axum::serve(listener, app).await.map_err(|e| {
            RelgraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    pub fn router(&self) -> Router {
        // No configured origins means local use: allow any.
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/relationships/schema", get(handle_schema))
            .route("/relationships/discover/:resource_type/:id", get(handle_discover))
            .route("/relationships/paths", get(handle_paths))
            .route("/relationships/statistics", get(handle_statistics))
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

fn error_response(err: &RelgraphError) -> Response {
    let status = match err {
        RelgraphError::NotFound(_) => StatusCode::NOT_FOUND,
        RelgraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            log::error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_schema(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.schema.to_json())).into_response()
}

async fn handle_discover(
    State(state): State<AppState>,
    UrlPath((resource_type, id)): UrlPath<(String, String)>,
    Query(query): Query<DiscoverQuery>,
) -> Response {
    let depth = query.depth.unwrap_or(state.traversal.default_discover_depth);
    let include_reverse = query.include_reverse.unwrap_or(true);
    let include_counts = query.include_counts;
    let schema = Arc::clone(&state.schema);
    let traversal = Arc::clone(&state.traversal);

    let result = state
        .db
        .with_connection(move |conn| {
            let store = SqliteStore::new(conn);
            let resolver = ResolveCache::new(&store, traversal.resolve_cache_capacity);
            let graph = GraphBuilder::new(&schema, &resolver, &store)
                .with_reverse_limit(traversal.reverse_limit)
                .with_deadline(Deadline::after(traversal.deadline()))
                .discover(&resource_type, &id, depth, include_reverse)?;

            let (hits, misses) = resolver.stats();
            log::debug!("Discovery resolver cache: {} hits / {} misses", hits, misses);

            let counts = include_counts.then(|| {
                graph
                    .nodes
                    .iter()
                    .map(|n| match store.count_referrers(&n.id.resource_type, &n.id.id) {
                        Ok(count) => Some(count),
                        Err(e) => {
                            log::debug!("Referrer count for {} failed: {}", n.id, e);
                            None
                        }
                    })
                    .collect()
            });

            Ok(DiscoverResponse::new(NodeId::new(resource_type, id), graph, counts))
        })
        .await;

    respond(result)
}

async fn handle_paths(State(state): State<AppState>, Query(query): Query<PathsQuery>) -> Response {
    let parse = |key: &str| {
        NodeId::parse(key).ok_or_else(|| {
            RelgraphError::InvalidInput(format!("expected Type/id, got {:?}", key))
        })
    };
    let (source, target) = match (parse(&query.source), parse(&query.target)) {
        (Ok(s), Ok(t)) => (s, t),
        (Err(e), _) | (_, Err(e)) => return error_response(&e),
    };
    let max_depth = query.max_depth.unwrap_or(state.traversal.default_path_depth);
    let schema = Arc::clone(&state.schema);
    let traversal = Arc::clone(&state.traversal);

    let result = state
        .db
        .with_connection(move |conn| {
            let store = SqliteStore::new(conn);
            let resolver = ResolveCache::new(&store, traversal.resolve_cache_capacity);
            let found = PathFinder::new(&schema, &resolver, &store)
                .with_reverse_limit(traversal.reverse_limit)
                .with_result_cap(traversal.path_result_cap)
                .with_deadline(Deadline::after(traversal.deadline()))
                .find_paths(&source, &target, max_depth)?;
            Ok(PathsResponse::new(source, target, found))
        })
        .await;

    respond(result)
}

async fn handle_statistics(State(state): State<AppState>) -> Response {
    let result = state
        .db
        .with_connection(|conn| store::link_statistics(conn))
        .await;
    respond(result)
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "relgraph",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}
