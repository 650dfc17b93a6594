use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use transfer_api::config::AppConfig;
use transfer_api::database::connection::get_db_client;
use transfer_api::database::memory::MemoryStore;
use transfer_api::database::store::{BookingStore, MongoStore};
use transfer_api::routes;
use transfer_api::services::commission_service::CommissionService;
use transfer_api::services::notification_service::{
    LogSink, NotificationService, SmsSink,
};
use transfer_api::services::payment_service::{
    CardGatewayProvider, PaymentProvider, PaymentService, SandboxProvider,
};
use transfer_api::services::pricing_service::{PricingConfig, PricingService};
use transfer_api::services::reservation_service::ReservationService;
use transfer_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env();
    tracing::info!("🔧 Payment environment: {}", config.payment_environment);

    let store = build_store(&config).await?;
    let app_state = initialize_app_state(store, &config)?;
    spawn_activity_listener(&app_state);

    let app = build_router(app_state);
    start_server(app, &config).await
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn BookingStore>> {
    let backend = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "mongodb".to_string());

    if backend == "memory" {
        tracing::warn!("⚠️ STORE_BACKEND=memory: documents will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db = get_db_client(&config.database_url, &config.database_name).await?;
    let store = MongoStore::new(db);
    store.ensure_indexes().await?;
    Ok(Arc::new(store))
}

fn initialize_app_state(
    store: Arc<dyn BookingStore>,
    config: &AppConfig,
) -> anyhow::Result<AppState> {
    // Pricing tables: JSON file if configured, compiled defaults otherwise
    let pricing_config = match &config.pricing_config_path {
        Some(path) => {
            tracing::info!("💶 Loading pricing tables from {}", path);
            PricingConfig::from_json_file(path)?
        }
        None => PricingConfig::default(),
    };
    let pricing = PricingService::new(pricing_config);

    let commission = CommissionService::new(config.commission_rate)?;
    tracing::info!("💼 Commission rate: {}", config.commission_rate);

    // Notification sink: SMS when credentials exist, log-only otherwise
    let notifications = if config.sms_api_key.is_empty() {
        tracing::warn!("⚠️ SMS credentials missing, notifications go to the log only");
        NotificationService::new(Arc::new(LogSink))
    } else {
        tracing::info!("✅ SMS sink initialized");
        NotificationService::new(Arc::new(SmsSink::new(
            config.sms_api_key.clone(),
            config.sms_username.clone(),
            config.sms_from.clone(),
        )))
    };

    // Payment provider: the sandbox sits behind the same trait as the
    // real gateway, so nothing downstream branches on environment.
    let provider: Arc<dyn PaymentProvider> = if config.is_production() {
        tracing::info!("✅ Card gateway provider initialized (production)");
        Arc::new(CardGatewayProvider::new(config))
    } else {
        tracing::info!("🧪 Sandbox payment provider initialized");
        Arc::new(SandboxProvider::new(
            config.gateway_secret_key.clone(),
            config.gateway_callback_salt.clone(),
        ))
    };

    let reservations = ReservationService::new(
        store.clone(),
        pricing,
        commission,
        notifications.clone(),
        config.default_currency.clone(),
    );

    let payments = PaymentService::new(
        store.clone(),
        provider,
        notifications.clone(),
        config.bank_beneficiary.clone(),
        config.bank_iban.clone(),
    );

    Ok(AppState::new(store, reservations, payments, notifications))
}

fn spawn_activity_listener(app_state: &AppState) {
    let mut events = app_state.store.subscribe();
    let feed = app_state.activity.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => feed.push(event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("activity feed lagged, skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/reservations", routes::reservations::routes())
        .nest("/api/payments", routes::payments::routes())
        .nest("/api/admin", routes::admin::routes())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.host.parse()?, config.port);

    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root_handler() -> &'static str {
    "🚐 AeroRide Transfer API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
