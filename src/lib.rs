//! # Knowledge Gateway
//!
//! Ingestion and retrieval gateway for a product knowledge corpus.
//!
//! The gateway decides whether freshly ingested documents (PDF or web) are
//! safe and non-redundant to publish, resolves them to canonical product
//! category ("gamme") aliases, classifies user queries for intent-aware
//! retrieval, and mediates every call to the external retrieval/AI service
//! behind a circuit breaker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Ingestion    │──▶│ Frontmatter  │──▶│ Gamme/diag    │
//! │ jobs PDF/Web │   │ validation   │   │ resolution    │
//! └──────┬───────┘   └──────────────┘   └──────┬────────┘
//!        │                                     ▼
//!        │           ┌──────────────┐   ┌───────────────┐
//!        └──────────▶│ Admission    │   │ Completion    │
//!                    │ pipeline     │   │ events/audit  │
//!                    └──────┬───────┘   └───────────────┘
//!                           ▼
//!                    ┌──────────────┐   ┌───────────────┐
//!                    │ SQLite store │   │ Retrieval svc │
//!                    └──────────────┘   │ (breaker)     │
//!                                       └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Normalized-content dedup hashing |
//! | [`pipeline`] | Four-gate admission control |
//! | [`frontmatter`] | Metadata validation and quarantine |
//! | [`gammes`] | Category/diagnostic alias resolution |
//! | [`breaker`] | Circuit breaker for the external service |
//! | [`retrieval`] | External retrieval/AI service client |
//! | [`worker`] | Extraction worker interface |
//! | [`jobs`] | Job store, orchestration, sweeps |
//! | [`webhook`] | Completion handling and audit trail |
//! | [`intent`] | Query intent classification |
//! | [`events`] | Completion event fan-out |
//! | [`server`] | HTTP API |

pub mod breaker;
pub mod config;
pub mod db;
pub mod events;
pub mod fingerprint;
pub mod frontmatter;
pub mod gammes;
pub mod intent;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod webhook;
pub mod worker;
