//! Database statistics.
//!
//! Row counts for every table plus Fred's knowledge coverage per source and
//! embedding model. Used by `motocare stats` to check that `init` and
//! `fred load` did what was expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

const TABLES: [&str; 6] = [
    "users",
    "bikes",
    "services",
    "mileage_logs",
    "expenses",
    "fred_chunks",
];

struct KnowledgeStats {
    source: String,
    model: String,
    chunk_count: i64,
    dims: i64,
    last_loaded: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("MotoCare Database Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();

    for table in TABLES {
        // Table names come from the fixed list above.
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await?;
        println!("  {:<13}{}", format!("{}:", table), count);
    }

    let rows = sqlx::query(
        r#"
        SELECT source, model, COUNT(*) AS chunk_count, MAX(dims) AS dims, MAX(created_at) AS last_loaded
        FROM fred_chunks
        GROUP BY source, model
        ORDER BY source, model
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let knowledge: Vec<KnowledgeStats> = rows
        .iter()
        .map(|row| KnowledgeStats {
            source: row.get("source"),
            model: row.get("model"),
            chunk_count: row.get("chunk_count"),
            dims: row.get("dims"),
            last_loaded: row.get("last_loaded"),
        })
        .collect();

    println!();
    if knowledge.is_empty() {
        println!("  Knowledge:   not loaded (run `motocare fred load`)");
    } else {
        println!("  Knowledge:");
        println!(
            "  {:<20} {:<40} {:>6} {:>5}   {}",
            "SOURCE", "MODEL", "CHUNKS", "DIMS", "LOADED"
        );
        println!("  {}", "-".repeat(90));
        for k in &knowledge {
            println!(
                "  {:<20} {:<40} {:>6} {:>5}   {}",
                k.source,
                k.model,
                k.chunk_count,
                k.dims,
                format_ts(k.last_loaded)
            );
        }
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00");
    }
}
