//! # dart-deep-search
//!
//! Deep-search orchestrator for natural-language questions about Korean
//! corporate disclosures (the DART public filing system).
//!
//! The orchestrator plans and executes a five-phase retrieval pipeline --
//! expand, search, filter, fetch, synthesize -- with a bounded sufficiency
//! loop, coordinating a rate-limited filing API, a content cache, a company
//! name resolver, and an LLM backend.
//!
//! ## Pipeline
//!
//! ```text
//! query -> expand (C5) -> search (C6) -> filter (C7) -> fetch (C8)
//!        -> sufficiency (C9) -> [loop back to expand] -> synthesize (C10)
//! ```
//!
//! [`orchestrator::Orchestrator`] drives the state machine; each phase is its
//! own module and can be exercised independently.

#![allow(clippy::missing_errors_doc)]

pub mod model;

pub mod error;

pub mod config;

pub mod llm;

pub(crate) mod logging;

pub mod cache;
pub mod company_resolver;
pub mod dart_client;
pub mod date_parser;
pub mod rate_limited_client;

pub mod document_fetcher;
pub mod document_filter;
pub mod query_expander;
pub mod search_executor;
pub mod sufficiency;
pub mod synthesizer;

pub mod orchestrator;

pub use config::DeepSearchConfig;
pub use error::{DeepSearchError, DeepSearchResult};
pub use model::{
    ExpandedQuery, Filing, FilingRef, FilingSource, PartialFailure, Query, ResponseEnvelope,
    RunOptions, Telemetry,
};
pub use orchestrator::Orchestrator;
