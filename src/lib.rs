//! # srd-chat
//!
//! Chat middleware for a Dungeons & Dragons 5e rules and campaign assistant.
//!
//! A chat message is classified by cheap text heuristics, fanned out to a
//! vector-search service, a structured SQLite data service, and optionally the
//! public SRD API, and the merged results are handed to an LLM that answers
//! with inline citations.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────┐
//!  POST /chat ──▶ │  classify  │
//!                 └─────┬──────┘
//!                       ▼
//!                ┌──────────────┐   ┌──────────┐
//!                │ orchestrator │──▶│   RAG    │
//!                │  (fan-out)   │──▶│  SQLite  │
//!                │              │──▶│   SRD    │
//!                └──────┬───────┘   └──────────┘
//!                       ▼
//!                ┌──────────────┐
//!                │   context    │──▶ LLM ──▶ answer + sources
//!                └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classify`] | Query classification and entity extraction |
//! | [`traits`] | Backend seams |
//! | [`rag`] | Semantic search client |
//! | [`structured`] | Structured data client |
//! | [`srd`] | SRD reference API client |
//! | [`llm`] | Chat-completion client |
//! | [`context`] | Context assembly and citation tags |
//! | [`orchestrator`] | Concurrent retrieval and synthesis |
//! | [`health`] | Backend health aggregation |
//! | [`rate_limit`] | Per-client rate limiting |
//! | [`server`] | HTTP server |

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod rate_limit;
pub mod server;
pub mod srd;
pub mod structured;
pub mod traits;
