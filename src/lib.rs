//! Finance Analytics Assistant
//!
//! Deterministic spending analytics over a user's bank transactions, plus a
//! conversational assistant that answers questions by calling those analytics
//! as tools of a language model.
//!
//! TURN LOOP:
//! MESSAGE → MODEL → TOOL? → MODEL → ANSWER

pub mod analytics;
pub mod api;
pub mod assistant;
pub mod clock;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod source;
pub mod taxonomy;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{FinanceError, Result};
