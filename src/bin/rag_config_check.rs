//! Validates RAG pipeline configuration files.
//!
//! Usage: `rag-config-check [FILE...]`. Without arguments the file named by
//! `RAG_CONFIG_PATH` is checked, or the built-in defaults when it is unset.

use anyhow::Context;
use rag_rerank::config::{RagConfig, CONFIG_PATH_ENV};
use rag_rerank::pipeline::default_top_k;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    let mut errors = Vec::new();

    if paths.is_empty() {
        let source = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "<defaults>".to_string());
        match RagConfig::load() {
            Ok(config) => report(&source, &config)?,
            Err(e) => errors.push(format!("  {}: {}", source, e)),
        }
    } else {
        for path in &paths {
            match RagConfig::from_yaml_file(path) {
                Ok(config) => report(path, &config)?,
                Err(e) => errors.push(format!("  {}: {}", path, e)),
            }
        }
    }

    if !errors.is_empty() {
        eprintln!("\n=== Invalid configuration ===");
        for e in &errors {
            eprintln!("{}", e);
        }
        anyhow::bail!("{} configuration file(s) failed validation", errors.len());
    }
    Ok(())
}

fn report(source: &str, config: &RagConfig) -> anyhow::Result<()> {
    println!("=== {} ===", source);
    match config.rerank_top_k {
        Some(k) => println!("top_k: {}", k),
        None => println!(
            "top_k: {} with a reranker, {} without",
            default_top_k(config.search_top_k, true),
            default_top_k(config.search_top_k, false)
        ),
    }
    let yaml = serde_yaml::to_string(config).context("rendering effective configuration")?;
    println!("{}", yaml);
    Ok(())
}
