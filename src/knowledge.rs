//! Offline ingestion of Fred's maintenance corpus.
//!
//! The corpus is a list of topic-tagged paragraphs under one source id.
//! Loading embeds each paragraph and stores it in `fred_chunks` with a
//! SHA-256 content hash and the embedding model name, so a re-run only
//! embeds paragraphs whose text or model changed:
//!
//! ```text
//! for each (topic, content) in corpus:
//!     stored row with same hash and model  -> unchanged
//!     otherwise                            -> embed, replace row
//! rows of the source whose topic is gone   -> removed
//! ```
//!
//! `--rebuild` clears the source first and embeds everything.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};

/// Built-in maintenance paragraphs, as `(topic, content)`.
const BUILTIN_CHUNKS: [(&str, &str); 25] = [
    (
        "Core Maintenance Principles",
        "Regular maintenance prevents breakdowns. Small issues become expensive if ignored. Clean bikes last longer. Fluids are the lifeblood of motorcycles. Tires affect safety more than any other component.",
    ),
    (
        "Engine Oil",
        "Change every 3,000–5,000 km or per manufacturer specification. Always replace the oil filter. Warm the engine before draining. Use the correct viscosity specified for the motorcycle.",
    ),
    (
        "Brake Fluid",
        "Replace brake fluid every 1–2 years. Keep the reservoir clean and sealed. Never mix different brake fluid types. Old fluid can cause brake fade and spongy lever feel.",
    ),
    (
        "Coolant",
        "For liquid-cooled bikes, replace coolant about every 2 years. Use motorcycle-specific coolant. Never mix incompatible coolants and keep the system properly bled of air.",
    ),
    (
        "Chain Maintenance",
        "Clean the chain every 500–1,000 km, or more often in wet or dirty conditions. Lube the chain after cleaning and after wet rides. Adjust slack to the manufacturer specification. Inspect for rust, stiff links, and uneven wear.",
    ),
    (
        "Sprockets",
        "Inspect sprockets for hooked or pointed teeth. Replace sprockets when teeth are worn or hooked. Sprockets are usually changed together with the chain as a set.",
    ),
    (
        "Tires",
        "Check tire pressure weekly and before long rides. Inspect for cracks, punctures, or embedded objects. Replace tires when tread is worn or when the rubber has aged and lost grip. Always follow the pressure recommendations on the manufacturer sticker or in the manual.",
    ),
    (
        "Brakes",
        "Inspect brake pads regularly and replace them before the friction material is too thin or metal contacts the disc. Check disc thickness and surface condition. Watch for vibration, squealing, or a soft lever, which can indicate pad, fluid, or disc issues.",
    ),
    (
        "Battery",
        "Keep battery terminals clean and tight. Charge the battery if the bike is unused for extended periods. Typical battery life is about 2–4 years. Weak batteries often cause hard starting, dim lights, and intermittent electrical issues.",
    ),
    (
        "Air Filter",
        "Clean the air filter every 5,000–10,000 km, or more often in dusty conditions. Replace the filter if it is damaged or excessively dirty. A clogged air filter reduces performance and can increase fuel consumption.",
    ),
    (
        "Spark Plugs",
        "Inspect spark plugs for deposits, wear, and correct gap. Replace plugs at the recommended service interval. Misfires, poor starting, or rough running can indicate spark plug or ignition issues.",
    ),
    (
        "Suspension",
        "Check fork seals for leaks or oil on the fork legs. Replace fork oil periodically to maintain damping performance. Inspect the rear shock for leaks, damage, and proper damping. Suspension condition affects comfort, handling, and braking.",
    ),
    (
        "Cables And Controls",
        "Lube throttle and clutch cables periodically if they are not self-lubricating. Ensure smooth, snag-free movement of controls. Adjust clutch free play to the specified range to avoid clutch slip or drag.",
    ),
    (
        "Common Problems: Hard Starting",
        "Typical causes of hard starting include a weak or discharged battery, dirty or worn spark plugs, and fuel delivery issues such as clogged jets or filters. Always check battery health and basic ignition before deeper troubleshooting.",
    ),
    (
        "Common Problems: Poor Acceleration",
        "Poor acceleration is often caused by a dirty air filter, a worn or neglected drive chain and sprockets, or fuel system problems. Check for air intake restrictions and drivetrain condition before assuming major engine issues.",
    ),
    (
        "Common Problems: Overheating",
        "Overheating can result from low coolant level, a blocked or dirty radiator, poor airflow, or lean fuel mixture. Verify coolant level, radiator cleanliness, and fan operation. Persistent overheating should be inspected promptly to avoid engine damage.",
    ),
    (
        "Common Problems: Brake Fade",
        "Brake fade is commonly caused by old or overheated brake fluid, worn pads, or excessive heat in the braking system. Replace aged fluid, ensure pads are in good condition, and avoid dragging the brakes on long descents.",
    ),
    (
        "Routine Maintenance Schedule",
        "Before every ride, check tires, brakes, and lights. Weekly, lube the chain and check tire pressures. Monthly, check oil level and fasteners. Every 3–6 months, change engine oil and check the air filter. Yearly, renew brake fluid, refresh coolant, and perform a full inspection.",
    ),
    (
        "Cleaning Tips",
        "Use mild soap and water to clean the motorcycle. Avoid high-pressure washers on bearings, seals, and electrical areas. Dry the bike completely after washing and lube the chain once it is dry.",
    ),
    (
        "Riding Habits",
        "Warm the engine gently before hard riding. Avoid frequent over-revving and harsh acceleration. Shift smoothly and keep the engine in its optimal RPM range. Smooth, controlled riding reduces wear on the engine, drivetrain, and brakes.",
    ),
    (
        "Cost Saving Tips",
        "Save money by doing basic maintenance yourself when you can. Buy parts in kits or sets when it makes sense, such as chain and sprocket kits. Track maintenance and repair expenses to spot patterns. Preventive care usually costs less than major repairs.",
    ),
    (
        "Safety Essentials",
        "Good tires are critical to safety. Brakes must be in excellent condition. All lights and indicators must function correctly. Always wear a helmet and appropriate protective gear. Never compromise on safety-related maintenance.",
    ),
    (
        "Storage Tips",
        "For storage, use fuel stabilizer if the bike will sit for weeks or months. Disconnect or maintain the battery to prevent discharge. Inflate tires to correct pressure and keep the bike covered and protected from the elements.",
    ),
    (
        "Seasonal Maintenance",
        "In rainy seasons, lube the chain more often and pay close attention to brake performance. In hot weather, monitor coolant level and tire pressure frequently. For cold storage, focus on battery care and fuel stabilizer to keep the bike ready for the next season.",
    ),
    (
        "Maintenance Mindset",
        "A motorcycle is a machine that rewards regular care. Routine attention prevents breakdowns, improves safety, and saves money over the life of the bike.",
    ),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorpusEntry {
    pub topic: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    pub source: String,
    pub chunks: Vec<CorpusEntry>,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    source: Option<String>,
    #[serde(default)]
    chunks: Vec<CorpusEntry>,
}

impl Corpus {
    /// The bundled corpus, stored under `source`.
    pub fn builtin(source: &str) -> Self {
        Self {
            source: source.to_string(),
            chunks: BUILTIN_CHUNKS
                .iter()
                .map(|(topic, content)| CorpusEntry {
                    topic: topic.to_string(),
                    content: content.to_string(),
                })
                .collect(),
        }
    }

    /// Parse a TOML corpus (`[[chunks]]` tables with `topic` and `content`).
    ///
    /// A top-level `source` key overrides `default_source`.
    pub fn from_toml(text: &str, default_source: &str) -> Result<Self> {
        let file: CorpusFile = toml::from_str(text).context("Failed to parse corpus file")?;
        let corpus = Self {
            source: file.source.unwrap_or_else(|| default_source.to_string()),
            chunks: file.chunks,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    pub fn read(path: &Path, default_source: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
        Self::from_toml(&text, default_source)
    }

    fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            bail!("Corpus source must not be empty");
        }
        if self.chunks.is_empty() {
            bail!("Corpus contains no chunks");
        }
        let mut seen = HashSet::new();
        for chunk in &self.chunks {
            if chunk.topic.trim().is_empty() || chunk.content.trim().is_empty() {
                bail!("Corpus chunks need a topic and content");
            }
            if !seen.insert(chunk.topic.as_str()) {
                bail!("Duplicate topic in corpus: {}", chunk.topic);
            }
        }
        Ok(())
    }
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub embedded: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Embed and store a corpus. Aborts on the first embedding failure.
pub async fn load_knowledge(
    pool: &SqlitePool,
    embedder: &dyn EmbeddingProvider,
    corpus: &Corpus,
    rebuild: bool,
) -> Result<LoadSummary> {
    let model = embedder.model_name().to_string();
    let mut summary = LoadSummary::default();

    if rebuild {
        let result = sqlx::query("DELETE FROM fred_chunks WHERE source = ?")
            .bind(&corpus.source)
            .execute(pool)
            .await?;
        tracing::info!(
            source = %corpus.source,
            cleared = result.rows_affected(),
            "Cleared stored chunks"
        );
    }

    for chunk in &corpus.chunks {
        let hash = content_hash(&chunk.content);

        let existing = sqlx::query(
            "SELECT content_hash, model FROM fred_chunks WHERE source = ? AND topic = ?",
        )
        .bind(&corpus.source)
        .bind(&chunk.topic)
        .fetch_all(pool)
        .await?;

        let up_to_date = existing.len() == 1
            && existing[0].get::<String, _>("content_hash") == hash
            && existing[0].get::<String, _>("model") == model;
        if up_to_date {
            summary.unchanged += 1;
            continue;
        }

        tracing::info!(topic = %chunk.topic, "Embedding chunk");
        let vector = embedder
            .embed(&chunk.content)
            .await
            .with_context(|| format!("Failed to embed topic '{}'", chunk.topic))?;

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM fred_chunks WHERE source = ? AND topic = ?")
            .bind(&corpus.source)
            .bind(&chunk.topic)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO fred_chunks (source, topic, content, content_hash, model, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&corpus.source)
        .bind(&chunk.topic)
        .bind(&chunk.content)
        .bind(&hash)
        .bind(&model)
        .bind(vector.len() as i64)
        .bind(embedding::vec_to_blob(&vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        summary.embedded += 1;
    }

    let stored_topics: Vec<Option<String>> =
        sqlx::query_scalar("SELECT DISTINCT topic FROM fred_chunks WHERE source = ?")
            .bind(&corpus.source)
            .fetch_all(pool)
            .await?;
    let wanted: HashSet<&str> = corpus.chunks.iter().map(|c| c.topic.as_str()).collect();

    for topic in stored_topics {
        let stale = topic.as_deref().map_or(true, |t| !wanted.contains(t));
        if !stale {
            continue;
        }
        let result = sqlx::query("DELETE FROM fred_chunks WHERE source = ? AND topic IS ?")
            .bind(&corpus.source)
            .bind(&topic)
            .execute(pool)
            .await?;
        summary.removed += result.rows_affected() as usize;
    }

    Ok(summary)
}

/// CLI entry point for `fred load`.
pub async fn run_load(config: &Config, file: Option<&Path>, rebuild: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let corpus = match file {
        Some(path) => Corpus::read(path, &config.fred.source)?,
        None => Corpus::builtin(&config.fred.source),
    };

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let result = load_knowledge(&pool, provider.as_ref(), &corpus, rebuild).await;
    pool.close().await;
    let summary = result?;

    println!("fred load ({})", corpus.source);
    println!("  model: {}", provider.model_name());
    println!("  chunks: {}", corpus.chunks.len());
    println!("  embedded: {}", summary.embedded);
    println!("  unchanged: {}", summary.unchanged);
    println!("  removed: {}", summary.removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embeds text as `[len, 1.0]` and counts calls.
    struct CountingProvider {
        model: String,
        calls: AtomicUsize,
        fail_on: Option<String>,
    }

    impl CountingProvider {
        fn new(model: &str) -> Self {
            Self {
                model: model.to_string(),
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            &self.model
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(text) {
                bail!("upstream unavailable");
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    async fn test_pool(tmp: &TempDir) -> SqlitePool {
        let config = Config::with_db_path(tmp.path().join("data/motocare.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();
        pool
    }

    fn corpus(entries: &[(&str, &str)]) -> Corpus {
        Corpus {
            source: "test_kb".to_string(),
            chunks: entries
                .iter()
                .map(|(t, c)| CorpusEntry {
                    topic: t.to_string(),
                    content: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_builtin_corpus_is_valid() {
        let corpus = Corpus::builtin("maintenance_kb_v1");
        assert_eq!(corpus.chunks.len(), 25);
        assert!(corpus.validate().is_ok());
        assert_eq!(corpus.chunks[1].topic, "Engine Oil");
    }

    #[test]
    fn test_corpus_from_toml() {
        let text = r#"
source = "shop_notes"

[[chunks]]
topic = "Valves"
content = "Check valve clearance at the service interval."
"#;
        let corpus = Corpus::from_toml(text, "maintenance_kb_v1").unwrap();
        assert_eq!(corpus.source, "shop_notes");
        assert_eq!(corpus.chunks.len(), 1);

        let no_source = "[[chunks]]\ntopic = \"A\"\ncontent = \"a\"\n";
        assert_eq!(
            Corpus::from_toml(no_source, "maintenance_kb_v1").unwrap().source,
            "maintenance_kb_v1"
        );
    }

    #[test]
    fn test_corpus_rejects_duplicate_topics() {
        let text = "[[chunks]]\ntopic = \"A\"\ncontent = \"a\"\n\n[[chunks]]\ntopic = \"A\"\ncontent = \"b\"\n";
        let err = Corpus::from_toml(text, "kb").unwrap_err();
        assert!(err.to_string().contains("Duplicate topic"));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[tokio::test]
    async fn test_incremental_load() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let provider = CountingProvider::new("model-a");

        let first = corpus(&[("Oil", "Change oil."), ("Chain", "Lube chain.")]);
        let summary = load_knowledge(&pool, &provider, &first, false).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(provider.calls(), 2);

        let again = load_knowledge(&pool, &provider, &first, false).await.unwrap();
        assert_eq!(
            again,
            LoadSummary {
                embedded: 0,
                unchanged: 2,
                removed: 0
            }
        );
        assert_eq!(provider.calls(), 2);

        let second = corpus(&[("Oil", "Change oil and filter."), ("Tires", "Check pressure.")]);
        let summary = load_knowledge(&pool, &provider, &second, false).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(summary.removed, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fred_chunks WHERE source = 'test_kb'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_model_change_and_rebuild_reembed() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let kb = corpus(&[("Oil", "Change oil.")]);

        load_knowledge(&pool, &CountingProvider::new("model-a"), &kb, false)
            .await
            .unwrap();

        let other = CountingProvider::new("model-b");
        let summary = load_knowledge(&pool, &other, &kb, false).await.unwrap();
        assert_eq!(summary.embedded, 1);

        let summary = load_knowledge(&pool, &other, &kb, true).await.unwrap();
        assert_eq!(summary.embedded, 1);
        assert_eq!(summary.unchanged, 0);
        assert_eq!(other.calls(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_names_topic() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let mut provider = CountingProvider::new("model-a");
        provider.fail_on = Some("Lube chain.".to_string());

        let kb = corpus(&[("Oil", "Change oil."), ("Chain", "Lube chain.")]);
        let err = load_knowledge(&pool, &provider, &kb, false).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Chain"));
    }
}
