//! Fred, the maintenance assistant.
//!
//! A single-pass retrieval-augmented pipeline:
//!
//! ```text
//! question ──▶ embed ──▶ cosine vs fred_chunks ──▶ top-k ──▶ prompt ──▶ chat ──▶ answer
//!                │
//!                └─ on failure: warn and continue with no context
//! ```
//!
//! Every stored chunk is scored on every question; the corpus is a few
//! dozen paragraphs, so a brute-force scan over the decoded vectors is all
//! the retrieval there is.

use anyhow::{bail, Result};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;

use crate::auth::AuthUser;
use crate::chat::ChatClient;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{bad_request, internal, ApiResult};
use crate::extract::ApiJson;
use crate::models::KnowledgeChunk;
use crate::server::AppState;

const PERSONA: [&str; 4] = [
    "You are Fred, an AI assistant that helps motorcycle owners with maintenance, troubleshooting, and ownership questions.",
    "Use only the maintenance information provided in the CONTEXT to answer.",
    "If the answer is not in the context, say you are not sure and suggest consulting the motorcycle manual or a qualified mechanic.",
    "Keep answers concise, practical, and focused on safety.",
];

/// A knowledge chunk paired with its similarity to the question.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: i64,
    pub topic: Option<String>,
    pub source: Option<String>,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FredAnswer {
    pub answer: String,
    pub retrieved_chunks: Vec<ScoredChunk>,
}

pub struct Fred {
    embedder: Box<dyn EmbeddingProvider>,
    chat: ChatClient,
    top_k: usize,
}

impl Fred {
    pub fn new(embedder: Box<dyn EmbeddingProvider>, chat: ChatClient, top_k: usize) -> Self {
        Self {
            embedder,
            chat,
            top_k,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            embedding::create_provider(&config.embedding)?,
            ChatClient::new(&config.chat)?,
            config.fred.top_k,
        ))
    }

    /// Embed the question and return the best-matching stored chunks.
    pub async fn retrieve(&self, pool: &SqlitePool, question: &str) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed(question).await?;
        let chunks = load_chunks(pool, self.embedder.model_name()).await?;
        Ok(rank_chunks(&query_vec, &chunks, self.top_k))
    }

    /// Answer a question, grounding the reply in retrieved chunks when possible.
    pub async fn ask(&self, pool: &SqlitePool, question: &str) -> Result<FredAnswer> {
        let query = question.trim();
        if query.is_empty() {
            bail!("Question is required");
        }

        let chunks = match self.retrieve(pool, query).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Fred embedding failed (answering without context): {:#}", e);
                Vec::new()
            }
        };

        tracing::debug!(
            retrieved = chunks.len(),
            model = self.chat.model_name(),
            "Fred generating answer"
        );

        let prompt = build_prompt(query, &chunks);
        let answer = self.chat.complete(&prompt).await?;

        Ok(FredAnswer {
            answer,
            retrieved_chunks: chunks,
        })
    }
}

/// Load the stored knowledge chunks embedded with `model`, decoded.
///
/// Vectors from another model are not comparable with the query vector and
/// are skipped; a warning is logged when any are present.
pub async fn load_chunks(pool: &SqlitePool, model: &str) -> Result<Vec<KnowledgeChunk>> {
    let rows = sqlx::query(
        "SELECT id, topic, source, content, embedding FROM fred_chunks WHERE model = ?",
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let other_models: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fred_chunks WHERE model != ?")
        .bind(model)
        .fetch_one(pool)
        .await?;
    if other_models > 0 {
        tracing::warn!(
            skipped = other_models,
            model,
            "knowledge chunks embedded with another model were skipped; run `motocare fred load`"
        );
    }

    Ok(rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            KnowledgeChunk {
                id: row.get("id"),
                topic: row.get("topic"),
                source: row.get("source"),
                content: row.get("content"),
                embedding: embedding::blob_to_vec(&blob),
            }
        })
        .collect())
}

/// Score chunks against the query vector and keep the best `k`.
///
/// Chunks with a non-positive similarity are dropped. Ordering is by score
/// descending, then by id ascending so equal scores rank deterministically.
pub fn rank_chunks(query: &[f32], chunks: &[KnowledgeChunk], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|c| ScoredChunk {
            id: c.id,
            topic: c.topic.clone(),
            source: c.source.clone(),
            content: c.content.clone(),
            score: embedding::cosine_similarity(query, &c.embedding),
        })
        .filter(|c| c.score > 0.0)
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    scored.truncate(k);
    scored
}

/// Build the single user message sent to the chat model.
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let label = c
                .topic
                .as_deref()
                .filter(|t| !t.is_empty())
                .or(c.source.as_deref().filter(|s| !s.is_empty()))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Chunk {}", i + 1));
            format!("{}:\n{}", label, c.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let context = if context.is_empty() {
        "No context available.".to_string()
    } else {
        context
    };

    let mut lines: Vec<&str> = PERSONA.to_vec();
    lines.extend(["", "CONTEXT:", context.as_str(), "", "QUESTION:", question]);
    lines.join("\n")
}

// ============ POST /api/fred/ask ============

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/fred/ask", post(handle_ask))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<AskRequest>,
) -> ApiResult<Json<FredAnswer>> {
    let question = req.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(bad_request("Question is required"));
    }

    tracing::info!(user_id = user.id, "Fred question received");

    match state.fred.ask(&state.pool, &question).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            tracing::error!("Fred /api/fred/ask error: {:#}", e);
            Err(internal(e.to_string()))
        }
    }
}

/// CLI entry point: ask Fred a question and print the reply.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let fred = Fred::from_config(config)?;
    let result = fred.ask(&pool, question).await;
    pool.close().await;
    let reply = result?;

    println!("{}", reply.answer);
    println!();
    if reply.retrieved_chunks.is_empty() {
        println!("  (answered without retrieved context)");
    } else {
        println!("  context:");
        for c in &reply.retrieved_chunks {
            println!(
                "    [{:.3}] {}",
                c.score,
                c.topic.as_deref().unwrap_or("(untitled)")
            );
        }
    }
    Ok(())
}
