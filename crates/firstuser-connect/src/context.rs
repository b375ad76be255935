// Shared context for request processing.
//
// Built once at startup from `ConnectOptions` + a storage adapter and passed
// to route handlers as `Arc<ConnectContext>`.

use std::sync::Arc;

use firstuser_connect_core::logger::ConnectLogger;
use firstuser_connect_core::options::ConnectOptions;
use firstuser_connect_core::Adapter;

use crate::store::ConnectStore;

/// The fully-initialized integration context, shared across request handlers.
pub struct ConnectContext {
    /// The original configuration options.
    pub options: ConnectOptions,

    /// Typed storage operations over the adapter.
    pub store: ConnectStore,

    /// Structured logger with level filtering.
    pub logger: ConnectLogger,
}

impl std::fmt::Debug for ConnectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectContext")
            .field("options", &self.options)
            .field("logger", &self.logger)
            .finish()
    }
}

impl ConnectContext {
    pub fn new(options: ConnectOptions, adapter: Arc<dyn Adapter>) -> Arc<Self> {
        Arc::new(Self {
            options,
            store: ConnectStore::new(adapter),
            logger: ConnectLogger::default(),
        })
    }

    pub fn with_logger(
        options: ConnectOptions,
        adapter: Arc<dyn Adapter>,
        logger: ConnectLogger,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            store: ConnectStore::new(adapter),
            logger,
        })
    }
}
