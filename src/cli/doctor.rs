//! CLI `doctor` command: check every external dependency and the store.

use anyhow::{Context, Result};

use ragent::config::RagentConfig;
use ragent::db;
use ragent::embedding::{create_provider, resize};
use ragent::tools::Toolbox;

/// Probe the embedding endpoint, tool servers and store, and print a report.
pub async fn doctor(config: &RagentConfig) -> Result<()> {
    println!("ragent Health Report");
    println!("====================");
    println!();

    println!("Embedding service:  {}", config.embedding.endpoint);
    println!("  Model:            {}", config.embedding.model);
    let provider = create_provider(&config.embedding)?;
    match provider.embed("health check").await {
        Ok(vector) => {
            let native = vector.len();
            let resized = resize(vector, config.embedding.dimensions).len();
            println!("  Status:           OK ({native} dims, stored as {resized})");
        }
        Err(err) => {
            println!("  Status:           UNREACHABLE ({err})");
            println!("  Queries will fall back to random vectors until this is fixed.");
        }
    }
    println!();

    println!("Chat model:         {}", config.model.endpoint);
    println!("  Model:            {}", config.model.model);
    println!();

    println!("Tool servers:");
    if config.tools.servers.is_empty() {
        println!("  (none configured)");
    } else {
        let toolbox = Toolbox::from_config(&config.tools)?;
        for client in toolbox.clients() {
            match client.init().await {
                Ok(()) => println!("  {:<16}  OK ({} tools)", client.name(), client.list_tools().len()),
                Err(err) => println!("  {:<16}  FAILED ({err})", client.name()),
            }
        }
        toolbox.close().await?;
    }
    println!();

    println!("Vector store:       {}", config.storage.backend);
    if config.storage.backend != "sqlite" {
        println!("  In-memory; knowledge is re-ingested on every `ask`.");
        return Ok(());
    }

    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("  Database not found at {}", db_path.display());
        println!("  Run `ragent ingest` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("  Database:         {}", db_path.display());
    println!("  File size:        {}", format_bytes(file_size));
    println!("  Schema version:   {}", report.schema_version);
    println!("  sqlite-vec:       v{}", report.sqlite_vec_version);
    println!("  Documents:        {}", report.document_count);
    match report.dimensions {
        Some(dims) if dims != config.embedding.dimensions => println!(
            "  Dimensions:       {dims} (WARNING: config says {}, re-ingest required)",
            config.embedding.dimensions
        ),
        Some(dims) => println!("  Dimensions:       {dims}"),
        None => println!("  Dimensions:       (not set)"),
    }
    println!(
        "  Embedding model:  {}",
        report.embedding_model.as_deref().unwrap_or("(not set)")
    );
    if let Some(stored) = &report.embedding_model {
        if stored != &config.embedding.model {
            println!("  WARNING: configured model is {}; re-ingest to refresh vectors.", config.embedding.model);
        }
    }
    if report.integrity_ok {
        println!("  Integrity check:  PASSED");
    } else {
        println!("  Integrity check:  FAILED ({})", report.integrity_details);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
