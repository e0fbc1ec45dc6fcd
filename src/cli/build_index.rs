//! CLI `index build` command — build the catalog metadata and vector index
//! from the raw ICPC-2 CSV.
//!
//! The CSV is `;` or `,` delimited with a `Kode` column and a title column
//! (`Kodetekst`, with locale variations). Rows are normalized, deduplicated
//! by code keeping the longest title, classified via the configured
//! component bands, embedded as passages, and written out as the bincode
//! index plus the metadata JSON array.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

use icpc_coder::catalog::index::FlatIndex;
use icpc_coder::catalog::{Catalog, CandidateEntry, ComponentMap};
use icpc_coder::config::AppConfig;
use icpc_coder::embedding::{self, EmbeddingProvider};

const EMBED_BATCH: usize = 32;

/// Build and write the index and metadata files.
pub async fn build_index(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("Loading CSV: {}", csv_path.display());
    let rows = load_icpc_csv(csv_path)?;
    println!("Loaded {} ICPC-2 rows", rows.len());

    let map = ComponentMap::new(config.catalog.component_bands.clone());
    let catalog = Catalog::new(to_entries(rows, &map))?;

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?);

    let index_path = config.resolved_index_path();
    let meta_path = config.resolved_meta_path();
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    println!("Encoding {} passages...", catalog.len());
    let pb = ProgressBar::new(catalog.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );

    // CPU-bound inference loop → spawn_blocking
    let entries: Vec<CandidateEntry> = catalog.entries().to_vec();
    let ep = Arc::clone(&provider);
    let pb_embed = pb.clone();
    let index = tokio::task::spawn_blocking(move || -> Result<FlatIndex> {
        let mut index = FlatIndex::new(ep.dimensions());
        for batch in entries.chunks(EMBED_BATCH) {
            let docs: Vec<String> = batch.iter().map(|e| e.doc_text()).collect();
            let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
            let vectors = ep.embed_passage_batch(&refs)?;
            for vector in &vectors {
                index.push(vector)?;
            }
            pb_embed.inc(batch.len() as u64);
        }
        Ok(index)
    })
    .await
    .context("embedding task failed")??;
    pb.finish_and_clear();

    println!("Writing index -> {}", index_path.display());
    index.save(&index_path)?;

    println!("Writing metadata -> {}", meta_path.display());
    catalog.save(&meta_path)?;

    println!("Done. {} entries indexed.", catalog.len());
    Ok(())
}

/// Parse the ICPC-2 CSV into (code, title) rows: delimiter detection,
/// whitespace normalization, bad-line skipping, and per-code dedup keeping
/// the longest title.
fn load_icpc_csv(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read CSV {}", path.display()))?;

    let mut lines = contents.lines();
    let header = lines.next().context("CSV is empty")?;
    let delimiter = detect_delimiter(header);

    let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    let code_col = columns
        .iter()
        .position(|c| *c == "Kode")
        .context("expected a 'Kode' column")?;
    // Find the text column heuristically, falling back to the second column.
    let text_col = ["Kodetekst", "Tekst", "Tittel", "Title"]
        .iter()
        .find_map(|cand| columns.iter().position(|c| c == cand))
        .or(if columns.len() > 1 { Some(1) } else { None })
        .context("expected a title column")?;

    let mut rows: Vec<(String, String)> = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(delimiter).collect();
        let (Some(code), Some(title)) = (fields.get(code_col), fields.get(text_col)) else {
            continue; // skip bad lines
        };
        let code = code.trim();
        let title = title.trim();
        if code.is_empty() || title.is_empty() {
            continue;
        }
        rows.push((code.to_string(), title.to_string()));
    }

    // Deduplicate by code, keeping the longest title.
    let mut deduped: Vec<(String, String)> = Vec::with_capacity(rows.len());
    for (code, title) in rows {
        match deduped.iter_mut().find(|(c, _)| *c == code) {
            Some((_, existing)) => {
                if title.len() > existing.len() {
                    *existing = title;
                }
            }
            None => deduped.push((code, title)),
        }
    }

    Ok(deduped)
}

/// Pick `;` when the header has more semicolons than commas.
fn detect_delimiter(header: &str) -> char {
    let semis = header.matches(';').count();
    let commas = header.matches(',').count();
    if semis > commas {
        ';'
    } else {
        ','
    }
}

fn to_entries(rows: Vec<(String, String)>, map: &ComponentMap) -> Vec<CandidateEntry> {
    rows.into_iter()
        .map(|(code, title)| {
            let (hint, guess) = map.classify(&code);
            let chapter = code.chars().next().unwrap_or('?');
            CandidateEntry {
                code,
                title,
                component_hint: hint,
                component_guess: guess,
                chapter,
            }
        })
        .collect()
}
