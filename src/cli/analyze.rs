//! CLI `analyze` command — run the pipeline on one note from the terminal.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;

use icpc_coder::analyze::{AnalysisEvent, Analyzer};
use icpc_coder::config::AppConfig;

/// Analyze a note read from a file, or from stdin when no path is given.
/// With `stream`, completion fragments are printed as they arrive before
/// the final result.
pub async fn analyze(config: &AppConfig, path: Option<PathBuf>, stream: bool) -> Result<()> {
    let note_text = match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read note {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read note from stdin")?;
            buf
        }
    };
    anyhow::ensure!(!note_text.trim().is_empty(), "note is empty");

    let analyzer = Analyzer::new(config)?;

    if stream {
        let mut events = analyzer.analyze_streaming(&note_text).await?;
        while let Some(event) = events.recv().await {
            match event? {
                AnalysisEvent::Chunk(chunk) => {
                    use std::io::Write;
                    print!("{chunk}");
                    std::io::stdout().flush().ok();
                }
                AnalysisEvent::Final(result) => {
                    println!("\n---");
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
            }
        }
    } else {
        let result = analyzer.analyze(&note_text).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
