//! # fedreg-agent
//!
//! A retrieval-augmented chat agent over Federal Register documents.
//!
//! An ingestion pipeline pulls documents from the Federal Register API and
//! upserts them into a relational store. A conversation loop lets a language
//! model call a document search tool over that store and summarize what it
//! finds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Registry   │──▶│  Ingestion  │──▶│ MySQL/SQLite │
//! │  (HTTP API) │   │  Pipeline   │   │  documents   │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ search tool
//!                                            ▼
//!                  ┌──────────┐       ┌──────────────┐       ┌────────┐
//!                  │   CLI    │──────▶│ Conversation │◀─────▶│  LLM   │
//!                  │ (fedreg) │       │     Loop     │       │  API   │
//!                  └──────────┘       └──────▲───────┘       └────────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │ Chat server │
//!                                     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fedreg init                                   # create the table
//! fedreg ingest --start 2025-03-01 --end 2025-03-31
//! fedreg search --agency EPA --query "water quality"
//! fedreg chat "What did the EPA publish about water quality in March 2025?"
//! fedreg serve                                  # chat page on :8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML settings and environment secrets |
//! | [`error`] | Typed error categories |
//! | [`models`] | Core data types |
//! | [`db`] | Store connections |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Document store traits and backends |
//! | [`registry`] | Federal Register client and pagination |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Lenient document search |
//! | [`get`] | Single-document lookup |
//! | [`tools`] | Model-callable tools |
//! | [`llm`] | Chat model client |
//! | [`agent`] | Conversation loop |
//! | [`server`] | Chat HTTP service |

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod get;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod registry;
pub mod search;
pub mod server;
pub mod store;
pub mod tools;
