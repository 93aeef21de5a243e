//! Gateway server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, header::WWW_AUTHENTICATE},
    middleware,
    routing::get,
};
use driverledger_core::{
    AuthConfig, Config, DocumentStore, Driver, Expense, Goal, Ledger, Report, Repository,
    SledDocumentStore, Trip,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::GatewayError;
use crate::api;
use crate::auth::{AuthState, TOKEN_EXPIRED_HEADER, TOKEN_EXPIRING_SOON_HEADER, expiry_notice};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Data directory for persistent storage.
    pub data_dir: PathBuf,
    /// Authentication configuration.
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            port: config.server.port,
            bind_address: config.server.bind_address.clone(),
            cors: config.server.cors,
            data_dir: config.storage.data_dir(),
            auth: config.auth.clone(),
        }
    }
}

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Authentication state.
    pub auth: Arc<AuthState>,
    /// Aggregation over the ledger collections.
    pub ledger: Ledger,
    /// Drivers.
    pub drivers: Repository<Driver>,
    /// Trips.
    pub trips: Repository<Trip>,
    /// Expenses.
    pub expenses: Repository<Expense>,
    /// Goals.
    pub goals: Repository<Goal>,
    /// Reports.
    pub reports: Repository<Report>,
}

impl AppState {
    /// Create state over a document store.
    #[must_use]
    pub fn new(auth: Arc<AuthState>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth,
            ledger: Ledger::new(Arc::clone(&store)),
            drivers: Repository::new(Arc::clone(&store)),
            trips: Repository::new(Arc::clone(&store)),
            expenses: Repository::new(Arc::clone(&store)),
            goals: Repository::new(Arc::clone(&store)),
            reports: Repository::new(store),
        }
    }
}

impl FromRef<AppState> for Arc<AuthState> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Build the full HTTP application.
#[must_use]
pub fn app(state: AppState, cors: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api::routes(&state.auth.config))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            expiry_notice,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router = router.layer(CorsLayer::permissive().expose_headers([
            WWW_AUTHENTICATE,
            HeaderName::from_static(TOKEN_EXPIRED_HEADER),
            HeaderName::from_static(TOKEN_EXPIRING_SOON_HEADER),
        ]));
    }

    router
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: AppState,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn DocumentStore>>,
    auth_state: Option<Arc<AuthState>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            store: None,
            auth_state: None,
        }
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the document store. Defaults to a sled store in the data dir.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the auth state.
    #[must_use]
    pub fn with_auth_state(mut self, auth: Arc<AuthState>) -> Self {
        self.auth_state = Some(auth);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or auth initialization fails.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let store = match self.store {
            Some(store) => store,
            None => {
                std::fs::create_dir_all(&self.config.data_dir).map_err(|e| {
                    GatewayError::Config(format!("Failed to create data dir: {e}"))
                })?;
                let store = SledDocumentStore::open(&self.config.data_dir)
                    .map_err(|e| GatewayError::Server(format!("Failed to open store: {e}")))?;
                Arc::new(store) as Arc<dyn DocumentStore>
            }
        };

        let auth = match self.auth_state {
            Some(auth) => auth,
            None => Arc::new(
                AuthState::initialize(self.config.auth.clone(), Arc::clone(&store))
                    .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?,
            ),
        };

        Ok(Gateway {
            state: AppState::new(auth, store),
            config: self.config,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create a gateway with a sled store in the configured data dir.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or auth initialization fails.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// The HTTP application.
    #[must_use]
    pub fn router(&self) -> Router {
        app(self.state.clone(), self.config.cors)
    }

    /// Run the gateway server.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the server fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Gateway API listening on http://{}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))
    }
}

async fn health_handler() -> &'static str {
    "OK"
}
