//! Error types for Civic Dispatch.

use uuid::Uuid;

/// Top-level error type for the dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Inbound error: {0}")]
    Inbound(#[from] InboundError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Transport-level errors raised by the email and SMS adapters.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid address on channel {name}: {reason}")]
    InvalidAddress { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Provider {name} rejected the request with status {status}: {body}")]
    ProviderRejected {
        name: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Template resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template {name} unreadable: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("Template lookup failed: {0}")]
    Lookup(#[from] DatabaseError),
}

/// Errors raised while dispatching one notification.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The destination is blocked by its channel status. Nothing was rendered or sent.
    #[error("Dispatch to {address} on {channel} rejected by channel status")]
    PolicyRejected { address: String, channel: String },

    #[error("Transport failed: {0}")]
    Transport(#[from] ChannelError),

    #[error("Template failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Database failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Comment {comment_id} not found on service request {service_request_id}")]
    CommentNotFound {
        service_request_id: Uuid,
        comment_id: Uuid,
    },

    #[error("Missing extra data for {event}: {field}")]
    MissingExtraData { event: String, field: String },

    #[error("Unknown lifecycle event: {0}")]
    UnknownEvent(String),
}

impl DispatchError {
    /// Whether this failure is a channel-status policy rejection.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::PolicyRejected { .. })
    }
}

/// Inbound payload parsing and correlation errors.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("No recipient address on inbound domain {domain}")]
    NoInboundAddress { domain: String },

    #[error("No inbound map for address {0}")]
    UnknownAddress(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),

    #[error("Database failed: {0}")]
    Database(#[from] DatabaseError),
}

/// Service-request mutation errors.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Service request {0} not found")]
    NotFound(Uuid),

    #[error("Jurisdiction {0} not found")]
    JurisdictionNotFound(String),

    #[error("Staff user {0} not found")]
    StaffNotFound(String),

    #[error("Staff user {staff_user_id} is not in department {department_id}")]
    AssigneeOutsideDepartment {
        staff_user_id: String,
        department_id: String,
    },

    #[error("Database failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Inbound failed: {0}")]
    Inbound(#[from] InboundError),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
