use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use trailmart_api::config::{KeycloakConfig, ServerConfig, WebhookConfig};
use trailmart_api::consumers::build_consumer;
use trailmart_api::services::{
    AdminTokenCache, BasketService, BusRepublishProcessor, CatalogService, HttpProductLookup,
    IdentityService, LocalProductLookup, LoggingProcessor, WebhookIngestorBuilder,
    WebhookRegistrar,
};
use trailmart_api::{router, AppState};
use trailmart_core::defaults::EVENT_BUS_CAPACITY;
use trailmart_core::{Error, EventBus, ProductLookup, ProductRepository};
use trailmart_db::{Database, RedisBasketRepository};
use trailmart_inference::OllamaBackend;
use trailmart_jobs::ConsumerConfig;
use trailmart_search::{ProductEnricher, SemanticSearch, SemanticSearchConfig};

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "trailmart_api=debug,trailmart_jobs=info,trailmart_search=info,\
trailmart_inference=info,trailmart_db=info,tower_http=info";

/// Log output read from `LOG_FORMAT` (`json` | `text`), `LOG_FILE` and `LOG_ANSI`.
struct LogSettings {
    json: bool,
    file: Option<PathBuf>,
    ansi: Option<bool>,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            json: var("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            file: var("LOG_FILE").map(PathBuf::from),
            ansi: var("LOG_ANSI").map(|v| v == "true" || v == "1"),
        }
    }
}

/// Install the global subscriber. The returned guard flushes the file
/// writer and must live until shutdown.
fn init_tracing(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (writer, guard) = match &settings.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().unwrap_or(OsStr::new("trailmart-api.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    // Plain text in files unless asked otherwise.
    let ansi = settings.ansi.unwrap_or(settings.file.is_none());
    let output = fmt::layer().with_writer(writer).with_ansi(ansi);
    let output = if settings.json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry().with(output).with(filter).init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_settings = LogSettings::from_env();
    let _log_guard = init_tracing(&log_settings);
    info!(
        subsystem = "api",
        op = "bootstrap",
        json = log_settings.json,
        log_file = ?log_settings.file,
        "trailmart-api starting"
    );

    let server = ServerConfig::from_env();
    let keycloak = KeycloakConfig::from_env();
    let webhook = WebhookConfig::from_env();

    // Stores
    let db = Database::connect(&server.database_url).await?;
    db.migrate().await?;
    info!(subsystem = "db", "Database connected and migrated");

    let products: Arc<dyn ProductRepository> = Arc::new(db.products());
    let baskets_repo = Arc::new(RedisBasketRepository::connect(&server.redis_url).await?);
    info!(subsystem = "db", component = "redis", "Basket cache connected");

    // Bus
    let bus_capacity = std::env::var("EVENT_BUS_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(EVENT_BUS_CAPACITY);
    let bus = EventBus::new(bus_capacity);

    // Services
    let backend = Arc::new(OllamaBackend::from_env());
    let enricher = Arc::new(ProductEnricher::new(
        backend,
        products.clone(),
        Arc::new(db.tags()),
        Arc::new(db.vectors()),
    ));
    let search = Arc::new(SemanticSearch::new(
        enricher.clone(),
        SemanticSearchConfig::from_env(),
    ));
    let catalog = Arc::new(CatalogService::new(
        Arc::new(db.categories()),
        products.clone(),
        Arc::new(bus.clone()),
    ));

    let lookup: Arc<dyn ProductLookup> = match &server.catalog_lookup_url {
        Some(url) => {
            info!(subsystem = "basket", catalog_lookup_url = %url, "Using remote catalog lookup");
            Arc::new(HttpProductLookup::new(url.clone())?)
        }
        None => Arc::new(LocalProductLookup::new(products.clone())),
    };
    let baskets = Arc::new(BasketService::new(baskets_repo, lookup));
    let identity = Arc::new(IdentityService::new(Arc::new(db.identity())));

    let webhooks = Arc::new(
        WebhookIngestorBuilder::new(webhook.clone())
            .with_processor(Arc::new(LoggingProcessor))
            .with_processor(Arc::new(BusRepublishProcessor::new(Arc::new(bus.clone()))))
            .build(),
    );
    if webhook.secret.is_none() {
        warn!(subsystem = "webhook", "WEBHOOK_SECRET not set, webhook signatures are not verified");
    }

    // Consumer
    let consumer = build_consumer(
        bus.clone(),
        ConsumerConfig::from_env(),
        enricher.clone(),
        baskets.clone(),
        identity,
    );
    info!(
        subsystem = "consumer",
        op = "bootstrap",
        handlers = ?consumer.handler_names(),
        lanes = ?consumer.lane_names(),
        "Event consumer configured"
    );
    let consumer_handle = consumer.start();

    // Webhook registration with the identity provider
    let tokens = Arc::new(AdminTokenCache::new(keycloak.clone())?);
    let registrar = WebhookRegistrar::new(keycloak, webhook, tokens)?;
    match registrar.register().await {
        Ok(status) => info!(subsystem = "identity", ?status, "Webhook registration finished"),
        Err(e @ Error::Config(_)) => return Err(e.into()),
        Err(e) => error!(subsystem = "identity", error = %e, "Webhook registration failed"),
    }

    let state = AppState {
        catalog,
        baskets,
        search,
        enricher,
        webhooks,
    };
    let app = router(state);

    let addr = server.bind_addr();
    info!(subsystem = "api", op = "listen", %addr, "Serving HTTP");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(subsystem = "api", op = "shutdown", "HTTP server stopped, draining event consumer");
    if let Err(e) = consumer_handle.shutdown().await {
        warn!(subsystem = "consumer", error = %e, "Event consumer already stopped");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(subsystem = "api", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(DEFAULT_LOG_FILTER.contains("trailmart_jobs=info"));
    }

    #[test]
    fn test_log_settings_from_lookup() {
        let settings = LogSettings::from_lookup(|key| match key {
            "LOG_FORMAT" => Some("JSON".to_string()),
            "LOG_FILE" => Some("/var/log/trailmart/api.log".to_string()),
            "LOG_ANSI" => Some("  ".to_string()),
            _ => None,
        });
        assert!(settings.json);
        assert_eq!(settings.file, Some(PathBuf::from("/var/log/trailmart/api.log")));
        assert_eq!(settings.ansi, None);

        let plain = LogSettings::from_lookup(|_| None);
        assert!(!plain.json);
        assert!(plain.file.is_none());
    }
}
