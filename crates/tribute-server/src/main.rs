use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use tribute_api::auth::{self, AppState, AppStateInner};
use tribute_api::middleware::{optional_auth, require_auth};
use tribute_api::{nextofkins, notifications, posts, veterans};
use tribute_core::kin::KinService;
use tribute_core::mail::LogMailer;
use tribute_core::moderation::ModerationService;
use tribute_core::notify::Notifier;
use tribute_core::storage::LocalBlobStore;
use tribute_types::models::PostKind;

/// 50 MB limit for photo and proof uploads
const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "tribute_server=debug,tribute_api=debug,tribute_core=debug,tribute_db=debug,tower_http=debug"
                        .into()
                }),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("TRIBUTE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TRIBUTE_DB_PATH").unwrap_or_else(|_| "tribute.db".into());
    let host = std::env::var("TRIBUTE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TRIBUTE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let upload_dir: PathBuf = std::env::var("TRIBUTE_UPLOAD_DIR")
        .unwrap_or_else(|_| "./uploads".into())
        .into();
    let base_url = std::env::var("TRIBUTE_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{}", port));

    // Init database, blob store, mail transport
    let db = Arc::new(tribute_db::Database::open(&PathBuf::from(&db_path))?);
    let storage = Arc::new(LocalBlobStore::new(upload_dir.clone(), base_url).await?);
    let mailer = Arc::new(LogMailer);

    // Shared state
    let notifier = Notifier::new(db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret,
        posts: ModerationService::new(db.clone(), storage.clone(), notifier.clone()),
        kins: KinService::new(db.clone(), storage.clone(), notifier.clone()),
        notifier,
        mailer,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/veterans", get(veterans::search))
        .route("/veterans/{id}", get(veterans::get_single))
        .with_state(app_state.clone());

    let admin_routes = Router::new()
        .route("/veterans", post(veterans::create))
        .route("/veterans/{id}", put(veterans::update))
        .route("/veterans/{id}", delete(veterans::remove))
        .route("/nextofkins", get(nextofkins::search))
        .route("/nextofkins", post(nextofkins::create))
        .route("/nextofkins/{id}", get(nextofkins::get_single))
        .route("/nextofkins/{id}", put(nextofkins::update))
        .route("/nextofkins/{id}", delete(nextofkins::remove))
        .route("/nextofkins/{id}/approve", put(nextofkins::approve))
        .route("/nextofkins/{id}/reject", put(nextofkins::reject))
        .route("/notifications", get(notifications::search))
        .route("/notifications", put(notifications::mark_as_read))
        .route(
            "/notifications/preferences",
            get(notifications::get_preferences),
        )
        .route(
            "/notifications/preferences",
            put(notifications::update_preferences),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(content_public(PostKind::Story, app_state.clone()))
        .merge(content_protected(PostKind::Story, app_state.clone()))
        .merge(content_public(PostKind::Photo, app_state.clone()))
        .merge(content_protected(PostKind::Photo, app_state.clone()))
        .merge(admin_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tribute server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Anonymous-tolerant read surface for one content kind.
fn content_public(kind: PostKind, state: AppState) -> Router {
    let prefix = match kind {
        PostKind::Story => "/stories",
        PostKind::Photo => "/photos",
    };

    Router::new()
        .route(prefix, get(posts::search))
        .route(&format!("{prefix}/{{id}}"), get(posts::get_single))
        .route(&format!("{prefix}/{{id}}/isSaluted"), get(posts::is_saluted))
        .route(&format!("{prefix}/{{id}}/share"), put(posts::share))
        .layer(middleware::from_fn(optional_auth))
        .layer(Extension(kind))
        .with_state(state)
}

/// Authenticated mutation surface for one content kind.
fn content_protected(kind: PostKind, state: AppState) -> Router {
    let create_update = match kind {
        PostKind::Story => Router::new()
            .route("/stories", post(posts::create_story))
            .route("/stories/{id}", put(posts::update_story)),
        PostKind::Photo => Router::new()
            .route("/photos", post(posts::create_photo))
            .route("/photos/{id}", put(posts::update_photo)),
    };

    let prefix = match kind {
        PostKind::Story => "/stories",
        PostKind::Photo => "/photos",
    };

    create_update
        .route(&format!("{prefix}/{{id}}"), delete(posts::remove))
        .route(&format!("{prefix}/{{id}}/approve"), put(posts::approve))
        .route(&format!("{prefix}/{{id}}/reject"), put(posts::reject))
        .route(&format!("{prefix}/{{id}}/salute"), put(posts::salute))
        .layer(middleware::from_fn(require_auth))
        .layer(Extension(kind))
        .with_state(state)
}
