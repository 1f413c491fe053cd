mod core;
mod features;
mod modules;
mod shared;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn, Router};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::admin::handlers::AdminState;
use crate::features::admin::routes as admin_routes;
use crate::features::assignments::routes as assignments_routes;
use crate::features::assignments::services::AssignmentManager;
use crate::features::auth::JwtValidator;
use crate::features::realtime::handlers::StreamState;
use crate::features::realtime::routes as realtime_routes;
use crate::features::realtime::Fanout;
use crate::features::reconciliation::{ReconciliationService, ReconciliationWorker};
use crate::features::reports::routes as reports_routes;
use crate::features::reports::services::ReportService;
use crate::features::verifications::routes as verifications_routes;
use crate::features::verifications::services::VerificationResolver;
use crate::modules::coordination::{CoordinationStore, MemoryCoordinationStore};
use crate::modules::storage::{DurableStore, PgStore};

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );

    // Create database connection pool
    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    // Run migrations automatically
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    let jwt_validator = Arc::new(JwtValidator::new(
        &config.auth.jwt_secret,
        config.auth.jwt_leeway,
    ));
    tracing::info!("Auth configuration initialized");

    // Stores: durable source of truth plus the derived coordination cache
    let store: Arc<dyn DurableStore> = Arc::new(PgStore::new(pool.clone()));
    let coord: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());
    let fanout = Arc::new(Fanout::new(config.dispatch.push_buffer));

    let manager = Arc::new(AssignmentManager::new(
        Arc::clone(&store),
        Arc::clone(&coord),
        Arc::clone(&fanout),
        config.dispatch.fanout_k,
    ));
    let report_service = Arc::new(ReportService::new(
        Arc::clone(&store),
        Arc::clone(&manager),
        config.dispatch.duplicate_window_secs,
    ));
    let resolver = Arc::new(VerificationResolver::new(
        Arc::clone(&store),
        Arc::clone(&manager),
        Arc::clone(&fanout),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::clone(&store),
        Arc::clone(&coord),
        Arc::clone(&manager),
        Arc::clone(&fanout),
    ));
    tracing::info!("Services initialized");

    // Seed the coordination cache from durable facts before serving
    manager.sync_roster().await?;
    let summary = reconciliation.repair().await?;
    tracing::info!(
        resolved = summary.resolved_reports,
        expired = summary.expired_assignments,
        "Startup reconciliation complete"
    );

    let worker = ReconciliationWorker::new(
        Arc::clone(&reconciliation),
        config.dispatch.reconcile_interval_secs,
    );
    tokio::spawn(async move {
        worker.run().await;
    });
    tracing::info!("Reconciliation worker spawned");

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    let stream_state = StreamState {
        fanout: Arc::clone(&fanout),
        keepalive: Duration::from_secs(config.dispatch.keepalive_secs),
    };
    let admin_state = AdminState {
        manager: Arc::clone(&manager),
        coord: Arc::clone(&coord),
        reconciliation: Arc::clone(&reconciliation),
    };

    // Protected routes (require JWT authentication)
    let protected_routes = Router::new()
        .merge(reports_routes::routes(Arc::clone(&report_service)))
        .merge(assignments_routes::routes(Arc::clone(&manager)))
        .merge(verifications_routes::routes(Arc::clone(&resolver)))
        .merge(realtime_routes::routes(stream_state))
        .merge(admin_routes::routes(admin_state))
        .route_layer(axum::middleware::from_fn_with_state(
            jwt_validator.clone(),
            middleware::auth_middleware,
        ));

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(protected_routes)
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app).await?;

    Ok(())
}
