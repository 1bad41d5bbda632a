//! API request and response types.

use serde::{Deserialize, Serialize};

/// Request to send a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    /// The user's message
    pub content: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Model used for replies
    pub model: String,

    /// Listings in the property store, when the store is readable
    pub listings: Option<u64>,
}

/// Response after deleting a session.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}
