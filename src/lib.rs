//! # MotoCare
//!
//! A motorcycle maintenance log with a retrieval-augmented assistant.
//!
//! Riders register, track their bikes, and log services, odometer readings,
//! and expenses. A dashboard aggregates spending and mileage. Fred answers
//! maintenance questions from a small embedded knowledge corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  HTTP (axum) │──▶│   handlers   │──▶│    SQLite    │
//! │  JWT auth    │   │ bikes/logs/… │   │   (sqlx)     │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │ fred_chunks
//!        ┌─────────────────┐   ┌───────────────┴──┐   ┌────────────┐
//!        │ fred load (CLI) │──▶│ embedding (HTTP) │   │ chat (HTTP)│
//!        └─────────────────┘   └──────────────────┘   └─────▲──────┘
//!                                  Fred: embed → rank → prompt ┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! motocare init                 # create database
//! motocare fred load            # embed the built-in knowledge corpus
//! motocare serve                # start the HTTP API
//! motocare fred ask "How often should I change my oil?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Row types shared by the handlers |
//! | [`error`] | HTTP error contract |
//! | [`extract`] | JSON body and path extractors with JSON rejections |
//! | [`auth`] | Password hashing, JWT issue/verify, account routes |
//! | [`bikes`] | Bike CRUD, ownership checks, photo upload |
//! | [`services`] | Service history |
//! | [`mileage`] | Odometer log with per-day upsert |
//! | [`expenses`] | Expense ledger |
//! | [`dashboard`] | Aggregated per-user stats |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`chat`] | Chat-completion client |
//! | [`fred`] | Retrieval, prompt assembly, answer |
//! | [`knowledge`] | Corpus ingestion |
//! | [`server`] | Router assembly and serving |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod auth;
pub mod bikes;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod embedding;
pub mod error;
pub mod expenses;
pub mod extract;
pub mod fields;
pub mod fred;
pub mod knowledge;
pub mod migrate;
pub mod mileage;
pub mod models;
pub mod server;
pub mod services;
pub mod stats;
