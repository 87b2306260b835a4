//! ERP Intelligence Router
//!
//! Routes a user request (free text plus an optional uploaded file) to one
//! of three specialists:
//! - Finance: money, tax, invoices, budget
//! - Operations: stock, items, shipping, vendors
//! - Risk: risk, anomalies, fraud, alerts
//!
//! ROUTING LOOP:
//! INPUT → CLASSIFY → DISPATCH → REPLY → COMPLETE

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod lookup;
pub mod models;
pub mod specialists;
pub mod staging;
pub mod state;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use agent::{Orchestrator, RunFailure, RunRequest};
pub use config::Settings;
pub use models::*;
pub use state::{Conversation, RunPhase, RunState};
