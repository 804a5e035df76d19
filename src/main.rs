mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AnalyzeArgs, ChunkArgs, Cli, Commands, InputArgs, MergeArgs};
use comic_merge::{
    discover_comics, ChunkLimits, ComicMergeError, ComicMerger, MergeConfig, MergeReport, Result,
    SourceStatus,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Merge(args) => handle_merge_command(args, cli.verbose),
        Commands::Analyze(args) => handle_analyze_command(args, cli.verbose),
    };

    if let Err(e) = result {
        error!("Operation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn resolve_sources(input: &InputArgs) -> Result<Vec<PathBuf>> {
    let sources = if input.sources.is_empty() {
        discover_comics(&input.discovery_options())?
    } else {
        input.sources.clone()
    };

    if sources.is_empty() {
        let hint = if input.cbr { "" } else { " Use --cbr to look for .cbr files" };
        return Err(ComicMergeError::InvalidConfiguration {
            reason: format!("Found no comics for merging.{}", hint),
        });
    }

    Ok(sources)
}

fn build_config(output: &PathBuf, chunking: &ChunkArgs, verbose: bool) -> MergeConfig {
    MergeConfig {
        output: output.clone(),
        chapter_mode: chunking.chapters,
        limits: ChunkLimits {
            max_chapters: chunking.max_chapters,
            max_bytes: chunking.max_size,
        },
        verbose,
        write_manifest: false,
    }
}

fn print_sources(report: &MergeReport) {
    for source in &report.sources {
        let status = match &source.status {
            SourceStatus::Merged => format!("{} pages, {} bytes", source.pages, source.bytes),
            SourceStatus::Empty => "no pages".to_string(),
            SourceStatus::Skipped(reason) => format!("skipped: {}", reason),
        };
        println!("  {:>3}. {} ({})", source.index, source.path.display(), status);
    }
}

fn warn_skipped(report: &MergeReport) {
    let skipped: Vec<_> = report.skipped().collect();
    if skipped.is_empty() {
        return;
    }

    warn!("{} source(s) were skipped:", skipped.len());
    for source in skipped {
        if let SourceStatus::Skipped(reason) = &source.status {
            warn!("  - {}: {}", source.path.display(), reason);
        }
    }
}

fn handle_merge_command(args: &MergeArgs, verbose: bool) -> Result<()> {
    let sources = resolve_sources(&args.input)?;
    info!("Starting merge of {} comics", sources.len());

    let mut config = build_config(&args.output, &args.chunking, verbose);
    config.write_manifest = args.manifest;

    let merger = ComicMerger::new(config)?;
    let outcome = merger.run(&sources);

    // Skipped sources are reported even when the merge itself failed.
    warn_skipped(&outcome.report);
    if outcome.error.is_some() && !outcome.report.output_files.is_empty() {
        warn!("Archives written before the failure:");
        for path in &outcome.report.output_files {
            warn!("  - {}", path.display());
        }
    }
    let report = outcome.into_result()?;

    info!(
        "Successfully merged {} pages into {} file(s):",
        report.total_pages,
        report.output_files.len()
    );
    for chunk in &report.chunks {
        let oversize = if chunk.oversize { " [over size limit]" } else { "" };
        info!(
            "  - {} (pages {}-{}, {} bytes){}",
            chunk.file.display(),
            chunk.first_page,
            chunk.last_page,
            chunk.bytes,
            oversize
        );
    }

    if let Some(manifest) = &report.manifest_file {
        info!("  - {} (manifest)", manifest.display());
    }

    Ok(())
}

fn handle_analyze_command(args: &AnalyzeArgs, verbose: bool) -> Result<()> {
    let sources = resolve_sources(&args.input)?;
    info!("Starting analysis of {} comics", sources.len());

    let config = build_config(&args.output, &args.chunking, verbose);
    let merger = ComicMerger::new(config)?;
    let report = merger.preview(&sources)?;

    println!("\n=== Sources ===");
    print_sources(&report);

    println!("\n=== Merge Plan ===");
    println!("Total pages: {}", report.total_pages);
    println!("Total bytes: {}", report.total_bytes);
    println!("Output files: {}", report.chunks.len());
    for chunk in &report.chunks {
        let chapters = if chunk.chapters.is_empty() {
            String::new()
        } else {
            format!(
                ", chapters {}",
                chunk
                    .chapters
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            )
        };
        println!(
            "  {}: pages {}-{} ({} pages, {} bytes{}){}",
            chunk.file.display(),
            chunk.first_page,
            chunk.last_page,
            chunk.pages,
            chunk.bytes,
            chapters,
            if chunk.oversize { " [over size limit]" } else { "" }
        );
    }

    // Write JSON output if requested
    if let Some(json_path) = &args.json_output {
        let json_content = serde_json::to_string_pretty(&serde_json::json!({
            "sources": report.sources,
            "chunks": report.chunks,
            "total_pages": report.total_pages,
            "total_bytes": report.total_bytes,
        }))
        .context("Failed to serialize analysis results")?;

        std::fs::write(json_path, json_content).context("Failed to write JSON analysis file")?;

        info!("Analysis results written to: {}", json_path.display());
    }

    Ok(())
}
