use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gleif_graph::config::{Cli, Command};
use gleif_graph::{
    parse_lei_file, parse_rr_file, Entity, EntitySink, EntityStore, JsonLinesSink, ReferenceTables,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("🗂️  GLEIF graph import (v{})", gleif_graph::VERSION);

    // 1. Reference tables (LEI records only)
    let tables = if cli.command.needs_reference_tables() {
        ReferenceTables::load(&cli.locator()).context("Failed to load reference tables")?
    } else {
        ReferenceTables::empty()
    };

    // 2. Output
    let mut output = Output::open(cli)?;

    // 3. Map files
    match &cli.command {
        Command::Lei { file } => {
            let path = cli.lei_file(file.as_deref())?;
            ingest(&path, FileKind::Lei, &tables, &mut output)?;
        }
        Command::Rr { file } => {
            let path = cli.rr_file(file.as_deref())?;
            ingest(&path, FileKind::Rr, &tables, &mut output)?;
        }
        Command::All => {
            let lei = cli.lei_file(None)?;
            let rr = cli.rr_file(None)?;
            ingest(&lei, FileKind::Lei, &tables, &mut output)?;
            ingest(&rr, FileKind::Rr, &tables, &mut output)?;
        }
    }

    // 4. Report
    output.report()
}

#[derive(Debug, Clone, Copy)]
enum FileKind {
    Lei,
    Rr,
}

fn ingest(path: &Path, kind: FileKind, tables: &ReferenceTables, output: &mut Output) -> Result<()> {
    info!(path = %path.display(), "📂 reading {:?} file", kind);
    let started_at = Utc::now();

    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let stats = match kind {
        FileKind::Lei => parse_lei_file(reader, tables, output),
        FileKind::Rr => parse_rr_file(reader, output),
    }
    .with_context(|| format!("Failed to map {}", path.display()))?;

    if let Output::Store(store) = output {
        store.record_run(&path.display().to_string(), &stats, started_at)?;
    }

    Ok(())
}

// ============================================================================
// OUTPUT
// ============================================================================

enum Output {
    Store(EntityStore),
    Jsonl(JsonLinesSink<BufWriter<File>>),
}

impl Output {
    fn open(cli: &Cli) -> Result<Self> {
        if let Some(path) = &cli.jsonl {
            info!(path = %path.display(), "writing JSON lines");
            return Ok(Output::Jsonl(JsonLinesSink::create(path)?));
        }

        if let Some(parent) = cli.database.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut store = EntityStore::open(&cli.database)?;
        info!(path = %cli.database.display(), "🔧 store ready (WAL mode)");

        if cli.reset {
            store.reset()?;
            info!("store cleared");
        }

        Ok(Output::Store(store))
    }

    fn report(&self) -> Result<()> {
        match self {
            Output::Store(store) => {
                let counts = store.counts();
                info!(
                    inserted = counts.inserted,
                    updated = counts.updated,
                    unchanged = counts.unchanged,
                    "✓ store updated"
                );
                let (mut nodes, mut edges) = (0, 0);
                for (schema, count) in store.count_by_schema()? {
                    let kind = if schema.is_edge() { "edge" } else { "node" };
                    info!("  {} ({}): {}", schema, kind, count);
                    if schema.is_edge() {
                        edges += count;
                    } else {
                        nodes += count;
                    }
                }
                info!(nodes, edges, "✓ store contains {} entities", store.count()?);
            }
            Output::Jsonl(sink) => {
                info!("✓ wrote {} entities", sink.written());
            }
        }
        Ok(())
    }
}

impl EntitySink for Output {
    fn put(&mut self, entity: &Entity) -> Result<()> {
        match self {
            Output::Store(store) => store.put(entity),
            Output::Jsonl(sink) => sink.put(entity),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Output::Store(store) => store.flush(),
            Output::Jsonl(sink) => sink.flush(),
        }
    }
}
