//! # Lectern
//!
//! A content pipeline that keeps a CMS-backed article corpus searchable by
//! AI agents.
//!
//! Lectern pulls articles from a headless CMS, flattens their rich-text
//! bodies, splits them into overlapping chunks with a metadata context
//! header, embeds each chunk, and stores the vectors in SQLite. On top of
//! that corpus it serves three retrieval tools (search, fetch, recommend)
//! over HTTP for LLM function calling, and keeps itself fresh through
//! signed CMS webhooks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │   CMS     │──▶│   Pipeline    │──▶│  SQLite    │
//! │ GraphQL   │   │ chunk+embed  │   │ vectors    │
//! └────┬─────┘   └──────────────┘   └────┬──────┘
//!      │ webhooks                        │
//!      ▼                                 ▼
//! ┌──────────┐                     ┌───────────┐
//! │   HTTP    │◀───────────────────│   Tools    │
//! │  ingress  │                    │ search etc │
//! └──────────┘                     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lectern init                       # create database
//! lectern sync all                   # sync the whole collection
//! lectern search "seasonal recipes"  # semantic search
//! lectern serve                      # webhooks + tool endpoints
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`cms`] | CMS content source and rich-text extraction |
//! | [`segment`] | Overlap-aware text chunking |
//! | [`compose`] | Context-header composition for embedding inputs |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | SQLite vector store |
//! | [`sync`] | Sync orchestration and reconciliation |
//! | [`tools`] | Agent-facing retrieval tools |
//! | [`webhook`] | Signed webhook verification and parsing |
//! | [`server`] | HTTP ingress and tool endpoints |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cms;
pub mod compose;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod migrate;
pub mod models;
pub mod segment;
pub mod server;
pub mod status;
pub mod store;
pub mod sync;
pub mod tools;
pub mod webhook;
