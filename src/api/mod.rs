//! HTTP API for the chat page.
//!
//! ## Endpoints
//!
//! - `GET /` - Chat and filter page
//! - `GET /api/health` - Health check
//! - `GET /api/tools` - Registered query tools
//! - `POST /api/sessions` - Create a session
//! - `GET /api/sessions/:id` - Transcript, filters and state
//! - `DELETE /api/sessions/:id` - Drop a session
//! - `POST /api/sessions/:id/messages` - Send a message and get the reply
//! - `POST /api/sessions/:id/clear` - Empty the transcript
//! - `GET /api/sessions/:id/filters` - Current filter selection
//! - `PUT /api/sessions/:id/filters` - Patch the filter selection
//! - `DELETE /api/sessions/:id/filters` - Restore default filters
//! - `POST /api/sessions/:id/search` - Search with the current filters, no model involved

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
