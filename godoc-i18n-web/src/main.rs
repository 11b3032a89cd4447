use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use godoc_i18n::{Config, IngestionScheduler, LanguageRegistry, RootKind, validate_package};

#[derive(Serialize, Deserialize)]
pub struct CorpusUpload {
    pub language: String,
    pub package: String,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct CorpusUploadResponse {
    pub written: usize,
    pub converted: usize,
    pub failed: Vec<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LanguageRegistry>,
}

/// One mounted documentation tree: URL prefix and the directories behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRoute {
    pub prefix: String,
    pub root: PathBuf,
    pub fallback: PathBuf,
}

/// Per-language routes in configuration order
pub fn doc_routes(registry: &LanguageRegistry) -> Vec<DocRoute> {
    registry
        .languages()
        .map(|language| DocRoute {
            prefix: format!("/lang/{}", language.code),
            root: language.mirror_root(RootKind::Primary),
            fallback: language.mirror_root(RootKind::Secondary),
        })
        .collect()
}

pub fn build_router(config: &Config, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/lang/data", post(upload_corpus))
        .route("/lib/godoc/init.js", get(serve_init_js));

    for route in doc_routes(&state.registry) {
        info!("mount {} -> {}", route.prefix, route.root.display());
        app = app.nest_service(
            &route.prefix,
            ServeDir::new(&route.root).fallback(ServeDir::new(&route.fallback)),
        );
    }

    app.fallback_service(
        ServeDir::new(&config.primary_root).fallback(ServeDir::new(&config.secondary_root)),
    )
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Accept Go-style `:8080` as well as full socket addresses
fn listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let matches = Config::command("godoc-i18n-web")
        .about("Serve translated Go source mirrors and keep them in sync")
        .get_matches();
    let config = Config::from_matches(&matches)?;
    info!("langs: {:?}", config.languages);

    let registry = Arc::new(LanguageRegistry::open(&config)?);
    let scheduler = IngestionScheduler::new(Arc::clone(&registry), &config).spawn();

    let app = build_router(&config, AppState { registry });
    let addr = listen_addr(&config.addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("start server {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn serve_init_js() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("static/init.js"),
    )
}

async fn upload_corpus(
    State(state): State<AppState>,
    Json(upload): Json<CorpusUpload>,
) -> Result<Json<CorpusUploadResponse>, (StatusCode, Json<ErrorResponse>)> {
    if state.registry.get(&upload.language).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown language: {}", upload.language),
            }),
        ));
    }
    if let Err(e) = validate_package(&upload.package) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        ));
    }
    info!("corpus upload {} {}", upload.language, upload.package);

    let registry = Arc::clone(&state.registry);
    let result = tokio::task::spawn_blocking(move || {
        let written = registry
            .ingest_text(&upload.language, &upload.text)?
            .unwrap_or(0);
        let report = registry.convert_package(&upload.language, &upload.package)?;
        Ok::<_, godoc_i18n::DocError>((written, report))
    })
    .await
    .map_err(|e| internal_error(e.to_string()))?;

    let (written, report) = result.map_err(|e| internal_error(e.to_string()))?;
    let report = report.unwrap_or_default();
    Ok(Json(CorpusUploadResponse {
        written,
        converted: report.written.len(),
        failed: report
            .failed
            .iter()
            .map(|(path, e)| format!("{}: {}", path.display(), e))
            .collect(),
    }))
}

fn internal_error(error: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error }))
}
