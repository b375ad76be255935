#![doc = include_str!("../README.md")]

pub mod db;
pub mod error;
pub mod logger;
pub mod options;
pub mod utils;

// Re-exports for convenience
pub use db::adapter::Adapter;
pub use db::models::{
    AccessCodeStatus, DeliveryStatus, FirstuserUser, IntegrationAccessCode, IntegrationApiKey,
    IntegrationApp, IntegrationIdentityLink, IntegrationUsageSession, IntegrationWebhookDelivery,
    MembershipStatus, PlanTier, PresenceStatus,
};
pub use error::{ApiError, ConnectError, ErrorCode, HttpStatus};
pub use logger::{ConnectLogger, LogHandler, LogLevel, LoggerConfig};
pub use options::{ConnectOptions, WebhookOptions};
