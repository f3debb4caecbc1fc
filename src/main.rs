// Main entry point for the storefront identity service

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use storefront_identity::api::metrics::Metrics;
use storefront_identity::api::middleware::AdmissionState;
use storefront_identity::api::{create_router, AppState};
use storefront_identity::auth::audit_logger::AuditLogger;
use storefront_identity::auth::auth_middleware::AuthState;
use storefront_identity::auth::lifecycle::{IdentityComponents, IdentityService};
use storefront_identity::config::Config;
use storefront_identity::core::credentials::CredentialCodec;
use storefront_identity::core::errors::ServiceError;
use storefront_identity::core::models::Role;
use storefront_identity::core::tokens::TokenIssuer;
use storefront_identity::directory::memory::MemoryAccountDirectory;
use storefront_identity::directory::postgres::PgAccountDirectory;
use storefront_identity::directory::AccountDirectory;
use storefront_identity::infra::domain_check::{AllowAllDomains, DnsDomainChecker, DomainChecker};
use storefront_identity::infra::mailer::{HttpMailer, LogMailer, Mailer};
use storefront_identity::state::memory_store::{MemoryPendingStore, MemoryRevocationStore};
use storefront_identity::state::rate_limiter::ClientRateLimiter;
use storefront_identity::state::redis_store::RedisStore;
use storefront_identity::state::{PendingRegistrationStore, RevocationStore};

const MAIL_TIMEOUT: Duration = Duration::from_secs(10);
const DNS_TIMEOUT: Duration = Duration::from_secs(3);
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration first, before any logging exists
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Tracing subscriber (only once)
    init_tracing(&config)?;

    info!(
        bind_address = %config.bind_address,
        port = config.port,
        redis = config.redis_url.is_some(),
        database = config.database_url.is_some(),
        "Starting storefront identity service"
    );

    // 3. Revocation and pending-registration stores
    let (revocations, pending): (Arc<dyn RevocationStore>, Arc<dyn PendingRegistrationStore>) =
        match config.redis_url {
            Some(ref redis_url) => {
                let store = RedisStore::new(redis_url)
                    .await
                    .context("Failed to initialize Redis store")?;
                info!("Redis stores initialized");
                (Arc::new(store.clone()), Arc::new(store))
            }
            None => {
                warn!("REDIS_URL not set, using in-memory stores (not shared across instances)");
                (
                    Arc::new(MemoryRevocationStore::new()),
                    Arc::new(MemoryPendingStore::new()),
                )
            }
        };

    // 4. Account directory
    let db_pool: Option<Arc<sqlx::PgPool>> = match config.database_url {
        Some(ref database_url) => Some(Arc::new(
            sqlx::PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?,
        )),
        None => None,
    };

    let accounts: Arc<dyn AccountDirectory> = match db_pool {
        Some(ref pool) => {
            let directory = PgAccountDirectory::new(
                (**pool).clone(),
                Duration::from_secs(config.account_state_cache_secs),
            );
            directory.migrate().await.context("Failed to run database migrations")?;
            info!("Postgres account directory initialized");
            Arc::new(directory)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory account directory");
            Arc::new(MemoryAccountDirectory::new())
        }
    };

    // 5. Outbound collaborators
    let mailer: Arc<dyn Mailer> = match (&config.mail_api_url, &config.mail_api_key, &config.mail_sender) {
        (Some(url), Some(key), Some(sender)) => Arc::new(
            HttpMailer::new(url.clone(), key.clone(), sender.clone(), MAIL_TIMEOUT)
                .context("Failed to create mail client")?,
        ),
        _ => {
            warn!("Mail provider not configured, confirmation links will only be logged");
            Arc::new(LogMailer)
        }
    };

    let domains: Arc<dyn DomainChecker> = if config.domain_check_enabled {
        Arc::new(DnsDomainChecker::new(DNS_TIMEOUT))
    } else {
        Arc::new(AllowAllDomains)
    };

    // 6. Core services
    let metrics = Arc::new(Metrics::new()?);
    let audit_logger = Arc::new(AuditLogger::new(db_pool.clone()));
    let codec = CredentialCodec::new(config.kdf_params()).context("Invalid KDF parameters")?;
    let tokens = TokenIssuer::new(&config.token_secret, config.token_lifetime());

    let identity = Arc::new(IdentityService::new(
        IdentityComponents {
            codec,
            tokens,
            revocations,
            pending,
            accounts,
            mailer,
            domains,
            audit: audit_logger.clone(),
            metrics: metrics.clone(),
        },
        config.identity_settings(),
    ));

    if let Some((nickname, email, password)) = config.bootstrap_admin() {
        bootstrap_admin(&identity, nickname, email, password.clone()).await?;
    }

    // 7. Admission pipeline state
    let rate_limiter = Arc::new(ClientRateLimiter::new(
        config.rate_limit_per_minute,
        config.rate_limit_burst,
    )?);
    spawn_rate_limit_pruning(rate_limiter.clone());

    let admission = Arc::new(AdmissionState {
        settings: config.admission_settings(),
        rate_limiter,
        metrics: metrics.clone(),
    });

    let auth_state = Arc::new(AuthState {
        identity: identity.clone(),
        audit_logger,
        trusted_proxies: config.trusted_proxies(),
    });

    let app_state = AppState {
        identity,
        admission,
        metrics,
    };

    let router = create_router(app_state, auth_state);

    // 8. Serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %addr, "Server listening");

    // Peer addresses feed the rate limiter when no proxy headers are present
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the configured administrator unless an account with that nickname or email exists
async fn bootstrap_admin(
    identity: &IdentityService,
    nickname: &str,
    email: &str,
    password: secrecy::SecretString,
) -> anyhow::Result<()> {
    match identity.provision_account(nickname, email, password, Role::Admin).await {
        Ok(account_id) => {
            info!(account_id = %account_id, nickname = %nickname, "Bootstrap administrator created");
            Ok(())
        }
        Err(ServiceError::Conflict(reason)) => {
            info!(nickname = %nickname, reason = %reason, "Bootstrap administrator already present");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to create bootstrap administrator"),
    }
}

fn spawn_rate_limit_pruning(rate_limiter: Arc<ClientRateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            rate_limiter.prune();
        }
    });
}

/// Initialize tracing subscriber based on configuration
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
