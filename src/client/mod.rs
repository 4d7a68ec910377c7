//! Bulk client implementation.
//!
//! [`BulkClient`] holds the configuration and one backend per service, and
//! creates each bulk service the first time it is asked for.

use crate::backend::{IdentityBackend, ObjectStoreBackend, QueueBackend};
use crate::config::BulkConfig;
use crate::error::{BulkError, ConfigurationError};
use crate::services::{BatchDispatcher, BulkEraser, IdentityLookup, PollingReceiver, StorageService};
use crate::transfer::{TransferConfig, TransferCoordinator};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Entry point to the bulk services.
pub struct BulkClient {
    config: Arc<BulkConfig>,
    store: Arc<dyn ObjectStoreBackend>,
    queue: Arc<dyn QueueBackend>,
    identity: Arc<dyn IdentityBackend>,

    // Lazy-initialized services
    storage: OnceCell<StorageService>,
    eraser: OnceCell<BulkEraser>,
    transfers: OnceCell<TransferCoordinator>,
    dispatcher: OnceCell<BatchDispatcher>,
    lookup: OnceCell<IdentityLookup>,
}

impl BulkClient {
    /// Create a client over the given backends.
    pub fn new(
        config: BulkConfig,
        store: Arc<dyn ObjectStoreBackend>,
        queue: Arc<dyn QueueBackend>,
        identity: Arc<dyn IdentityBackend>,
    ) -> Result<Self, BulkError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            queue,
            identity,
            storage: OnceCell::new(),
            eraser: OnceCell::new(),
            transfers: OnceCell::new(),
            dispatcher: OnceCell::new(),
            lookup: OnceCell::new(),
        })
    }

    /// Create a builder.
    pub fn builder() -> BulkClientBuilder {
        BulkClientBuilder::new()
    }

    /// Create a client over the AWS SDK, configured from `config`.
    #[cfg(feature = "aws-sdk")]
    pub async fn from_aws(config: BulkConfig) -> Result<Self, BulkError> {
        use crate::backend::aws::{load_sdk_config, IamBackend, S3Backend, SqsBackend};

        config.validate()?;
        let sdk_config = load_sdk_config(&config).await;
        let path_style = config.endpoint.is_some();
        Self::new(
            config,
            Arc::new(S3Backend::from_sdk_config(&sdk_config, path_style)),
            Arc::new(SqsBackend::from_sdk_config(&sdk_config)),
            Arc::new(IamBackend::from_sdk_config(&sdk_config)),
        )
    }

    /// The client configuration.
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Listing and existence checks.
    pub fn storage(&self) -> &StorageService {
        self.storage
            .get_or_init(|| StorageService::new(self.config.clone(), self.store.clone()))
    }

    /// Container teardown.
    pub fn eraser(&self) -> &BulkEraser {
        self.eraser.get_or_init(|| {
            BulkEraser::new(StorageService::new(self.config.clone(), self.store.clone()))
        })
    }

    /// The transfer coordinator and its worker pool.
    pub fn transfers(&self) -> &TransferCoordinator {
        self.transfers.get_or_init(|| {
            TransferCoordinator::new(TransferConfig::from_bulk(&self.config), self.store.clone())
        })
    }

    /// Chunked batch sends.
    pub fn dispatcher(&self) -> &BatchDispatcher {
        self.dispatcher
            .get_or_init(|| BatchDispatcher::new(self.queue.clone()))
    }

    /// Identity lookups.
    pub fn identity(&self) -> &IdentityLookup {
        self.lookup
            .get_or_init(|| IdentityLookup::new(self.identity.clone()))
    }

    /// A handle on the queue at `queue_url`.
    pub fn queue(&self, queue_url: impl Into<String>) -> PollingReceiver {
        PollingReceiver::new(&self.config, self.queue.clone(), queue_url)
    }
}

impl std::fmt::Debug for BulkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BulkClient`].
#[derive(Default)]
pub struct BulkClientBuilder {
    config: Option<BulkConfig>,
    from_env: bool,
    store: Option<Arc<dyn ObjectStoreBackend>>,
    queue: Option<Arc<dyn QueueBackend>>,
    identity: Option<Arc<dyn IdentityBackend>>,
}

impl BulkClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration.
    pub fn config(mut self, config: BulkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from the environment when none is given.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Use this object storage backend.
    pub fn storage(mut self, store: Arc<dyn ObjectStoreBackend>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this queue backend.
    pub fn queue(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use this identity backend.
    pub fn identity(mut self, identity: Arc<dyn IdentityBackend>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Build the client. All three backends are required.
    pub fn build(self) -> Result<BulkClient, BulkError> {
        let config = match (self.config, self.from_env) {
            (Some(config), _) => config,
            (None, true) => BulkConfig::from_env()?,
            (None, false) => BulkConfig::default(),
        };
        BulkClient::new(
            config,
            self.store.ok_or_else(|| missing("storage"))?,
            self.queue.ok_or_else(|| missing("queue"))?,
            self.identity.ok_or_else(|| missing("identity"))?,
        )
    }
}

fn missing(backend: &str) -> BulkError {
    ConfigurationError::InvalidConfiguration {
        field: backend.to_string(),
        message: format!("no {backend} backend configured"),
    }
    .into()
}
