use anyhow::Context;
use coursepay_backend::api::{build_router, AppState};
use coursepay_backend::config::AppConfig;
use coursepay_backend::database::in_memory::{
    InMemoryEnrollmentRepository, InMemoryOrderRepository, InMemoryPaymentRepository,
};
use coursepay_backend::database::repository::{
    EnrollmentRepository, OrderRepository, PaymentRepository,
};
use coursepay_backend::health::HealthChecker;
use coursepay_backend::logging::{init_tracing, mask_secret};
use coursepay_backend::payments::providers::omise::OmiseGateway;
use coursepay_backend::services::notification::notifier_from_config;
use coursepay_backend::services::{
    BankTransferProcessor, CardChargeProcessor, EnrollmentReconciler, PaymentOrchestrator,
    PaymentValidationService,
};
use coursepay_backend::uploads::image_validator::ImageValidator;
use coursepay_backend::uploads::storage::{HttpSlipStorage, InMemorySlipStorage, SlipStorage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

struct Repositories {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

fn in_memory_repositories() -> Repositories {
    Repositories {
        orders: Arc::new(InMemoryOrderRepository::new()),
        payments: Arc::new(InMemoryPaymentRepository::new()),
        enrollments: Arc::new(InMemoryEnrollmentRepository::new()),
    }
}

#[cfg(feature = "database")]
async fn connect_repositories(
    config: &AppConfig,
    health_checker: HealthChecker,
) -> anyhow::Result<(Repositories, HealthChecker)> {
    use coursepay_backend::database::enrollment_repository::PgEnrollmentRepository;
    use coursepay_backend::database::init_pool_from_config;
    use coursepay_backend::database::order_repository::PgOrderRepository;
    use coursepay_backend::database::payment_repository::PgPaymentRepository;
    use coursepay_backend::health::DatabaseProbe;

    info!("Initializing database connection pool...");
    let pool = init_pool_from_config(&config.database)
        .await
        .context("failed to initialize database pool")?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let repositories = Repositories {
        orders: Arc::new(PgOrderRepository::new(pool.clone())),
        payments: Arc::new(PgPaymentRepository::new(pool.clone())),
        enrollments: Arc::new(PgEnrollmentRepository::new(pool.clone())),
    };
    let health_checker = health_checker.with_probe(Arc::new(DatabaseProbe::new(pool)));
    Ok((repositories, health_checker))
}

#[cfg(not(feature = "database"))]
async fn connect_repositories(
    _config: &AppConfig,
    health_checker: HealthChecker,
) -> anyhow::Result<(Repositories, HealthChecker)> {
    tracing::warn!("Built without the database feature; using in-memory repositories");
    Ok((in_memory_repositories(), health_checker))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        skip_externals = config.skip_externals,
        gateway_key = %mask_secret(&config.gateway.public_key),
        "Starting course payment backend"
    );

    let health_checker = HealthChecker::new();
    let (repositories, health_checker) = if config.skip_externals {
        info!("Skipping database initialization (SKIP_EXTERNALS=true)");
        (in_memory_repositories(), health_checker)
    } else {
        connect_repositories(&config, health_checker).await?
    };

    let storage: Arc<dyn SlipStorage> = if config.skip_externals {
        info!("Using in-memory slip storage (SKIP_EXTERNALS=true)");
        Arc::new(InMemorySlipStorage::new())
    } else {
        Arc::new(
            HttpSlipStorage::new(config.storage.clone())
                .context("failed to initialize slip storage client")?,
        )
    };

    let gateway = Arc::new(
        OmiseGateway::new(config.gateway.clone())
            .context("failed to initialize card gateway client")?,
    );
    let notifier =
        notifier_from_config(&config.notification).context("failed to initialize notifier")?;

    let orchestrator = PaymentOrchestrator::new(
        PaymentValidationService::new(
            repositories.orders.clone(),
            config.payment.minimum_amount.clone(),
        ),
        CardChargeProcessor::new(
            gateway,
            repositories.payments.clone(),
            config.payment.currency.clone(),
        ),
        BankTransferProcessor::new(
            ImageValidator::new(config.upload.clone()),
            storage,
            repositories.payments.clone(),
            notifier.clone(),
            config.upload.folder.clone(),
            config.payment.currency.clone(),
        ),
        EnrollmentReconciler::new(repositories.enrollments.clone()),
        repositories.orders.clone(),
        repositories.payments.clone(),
        notifier,
    );

    let app = build_router(AppState {
        orchestrator: Arc::new(orchestrator),
        approval_secret: Arc::from(config.payment.approval_secret.as_str()),
        health_checker,
        max_upload_bytes: config.upload.max_file_bytes,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}
