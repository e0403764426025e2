//! skiff - command-line driver for the file-browser core subsystems

mod store;

use clap::{Parser, Subcommand};
use colored::Colorize;
use skiff_core::summary::{HttpProvider, SummaryCache, SummaryPipeline};
use skiff_core::{
    Config, DirectoryReader, Indexer, OperationQueue, OperationStatus, SearchRouter, SkiffError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store::SqliteStore;

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "File-browser core: indexing, search, summaries, file operations", long_about = None)]
struct Cli {
    /// Config file (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory tree into the index database
    Index {
        /// Directory to index
        dir: PathBuf,

        /// Index database path (overrides config)
        #[arg(long)]
        db: Option<String>,

        /// Include hidden files
        #[arg(long)]
        hidden: bool,
    },

    /// Fuzzy-search filenames in a directory
    Search {
        /// Query string
        query: String,

        /// Directory to search (default: current)
        dir: Option<PathBuf>,

        #[arg(long)]
        case_sensitive: bool,

        /// Cap on results shown
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Summarize a file through the completion API
    Summarize {
        path: PathBuf,

        /// brief, standard, or detailed
        #[arg(long, value_parser = ["brief", "standard", "detailed"])]
        level: Option<String>,

        /// Ignore any cached summary
        #[arg(long)]
        force: bool,

        /// Extract at most N key points instead of prose
        #[arg(long)]
        key_points: Option<usize>,

        /// API key (overrides config)
        #[arg(long, env = "SKIFF_API_KEY")]
        api_key: Option<String>,
    },

    /// Print a file's content hash
    Hash {
        path: PathBuf,

        /// MD5 instead of SHA-256
        #[arg(long)]
        md5: bool,
    },

    /// Copy a file or directory into a destination directory
    Cp { source: PathBuf, dest_dir: PathBuf },

    /// Move a file or directory into a destination directory
    Mv { source: PathBuf, dest_dir: PathBuf },

    /// Delete a file or directory tree
    Rm { path: PathBuf },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red());
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Index { dir, db, hidden } => cmd_index(config, dir, db, hidden, cli.json),
        Commands::Search {
            query,
            dir,
            case_sensitive,
            limit,
        } => cmd_search(&query, dir, case_sensitive, limit, cli.json),
        Commands::Summarize {
            path,
            level,
            force,
            key_points,
            api_key,
        } => cmd_summarize(config, &path, level, force, key_points, api_key, cli.json),
        Commands::Hash { path, md5 } => cmd_hash(&path, md5),
        Commands::Cp { source, dest_dir } => cmd_op(Op::Copy, &source, Some(&dest_dir)),
        Commands::Mv { source, dest_dir } => cmd_op(Op::Move, &source, Some(&dest_dir)),
        Commands::Rm { path } => cmd_op(Op::Delete, &path, None),
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "Error:".red());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> skiff_core::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn cmd_index(
    config: Config,
    dir: PathBuf,
    db: Option<String>,
    hidden: bool,
    json: bool,
) -> skiff_core::Result<()> {
    let mut indexer_config = config.indexer;
    indexer_config.watch_dirs = vec![std::fs::canonicalize(&dir)?];
    indexer_config.enable_fsevents = false;
    if hidden {
        indexer_config.index_hidden_files = true;
    }
    if let Some(db) = db {
        indexer_config.db_path = db;
    }

    let store = Arc::new(SqliteStore::open(&indexer_config.db_path)?);
    let mut indexer = Indexer::new(indexer_config)?;
    indexer.set_store(Arc::clone(&store) as Arc<dyn skiff_core::VectorStore>);
    indexer.start()?;

    // One-shot run: wait for the scan, drain the queue, stop
    loop {
        if indexer.status() == skiff_core::IndexerStatus::Error {
            indexer.stop();
            return Err(SkiffError::Api("indexer worker failed".to_string()));
        }
        let stats = indexer.get_stats();
        if indexer.is_scan_complete() && stats.files_pending == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    let stats = indexer.get_stats();
    indexer.stop();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "{}: {} files ({} bytes)",
            "Indexed".green(),
            stats.files_indexed,
            stats.total_bytes
        );
        println!("{}: {} files", "Skipped".yellow(), stats.files_skipped);
        println!(
            "{}: {} files total, {:.1}s",
            "Store".blue(),
            store.file_count()?,
            stats.elapsed_seconds
        );
    }
    Ok(())
}

fn cmd_search(
    query: &str,
    dir: Option<PathBuf>,
    case_sensitive: bool,
    limit: usize,
    json: bool,
) -> skiff_core::Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let snapshot = DirectoryReader::read(&dir)?;

    let router = SearchRouter {
        case_sensitive,
        max_results: limit,
        ..Default::default()
    };
    let results = router.perform(query, &snapshot, None);

    if json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": snapshot.entries[r.original_index].name,
                    "path": snapshot.entries[r.original_index].path,
                    "score": r.score,
                    "positions": r.match_positions,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if results.is_empty() {
        println!("{}", "No matches".yellow());
    } else {
        for result in &results {
            let entry = &snapshot.entries[result.original_index];
            println!("{:>6}  {}", result.score.to_string().cyan(), entry.name);
        }
    }
    Ok(())
}

fn cmd_summarize(
    config: Config,
    path: &Path,
    level: Option<String>,
    force: bool,
    key_points: Option<usize>,
    api_key: Option<String>,
    json: bool,
) -> skiff_core::Result<()> {
    let mut summary_config = config.summary;
    if let Some(key) = api_key {
        summary_config.api_key = key;
    }
    if let Some(level) = level {
        summary_config.default_level = match level.as_str() {
            "brief" => skiff_core::SummaryLevel::Brief,
            "detailed" => skiff_core::SummaryLevel::Detailed,
            _ => skiff_core::SummaryLevel::Standard,
        };
    }

    let provider = Arc::new(HttpProvider::new(&summary_config.api_key));
    let mut pipeline = SummaryPipeline::new(summary_config.clone(), provider);
    if summary_config.use_cache {
        let cache = SummaryCache::open(&summary_config.cache_path)?;
        cache.purge_older_than(summary_config.max_cache_age_days)?;
        pipeline = pipeline.with_cache(Arc::new(Mutex::new(cache)));
    }

    let result = match key_points {
        Some(max_points) => pipeline.extract_key_points(path, max_points),
        None if force => pipeline.summarize_force(path),
        None => pipeline.summarize(path),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if !result.is_ok() {
        return Err(SkiffError::Api(
            result
                .error_message
                .unwrap_or_else(|| format!("{:?}", result.status)),
        ));
    }
    if result.from_cache {
        println!("{}", "(cached)".dimmed());
    } else {
        println!(
            "{}",
            format!(
                "({} ms, {} tokens)",
                result.generation_ms, result.tokens_used
            )
            .dimmed()
        );
    }
    println!("{}", result.summary_text);
    Ok(())
}

fn cmd_hash(path: &Path, md5: bool) -> skiff_core::Result<()> {
    let digest = if md5 {
        skiff_core::hash::md5_file(path)?
    } else {
        skiff_core::hash::sha256_file(path)?
    };
    println!("{digest}  {}", path.display());
    Ok(())
}

enum Op {
    Copy,
    Move,
    Delete,
}

fn cmd_op(op: Op, source: &Path, dest_dir: Option<&Path>) -> skiff_core::Result<()> {
    let mut queue = OperationQueue::new();
    queue.start()?;

    let id = match op {
        Op::Copy => queue.enqueue_copy(source, dest_dir.unwrap_or(Path::new("."))),
        Op::Move => queue.enqueue_move(source, dest_dir.unwrap_or(Path::new("."))),
        Op::Delete => queue.enqueue_delete(source),
    }
    .ok_or_else(|| SkiffError::Api("operation queue full".to_string()))?;

    let finished = loop {
        let Some(record) = queue.get(id) else {
            return Err(SkiffError::Api("operation record lost".to_string()));
        };
        match record.status {
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled => {
                break record
            }
            _ => std::thread::sleep(Duration::from_millis(20)),
        }
    };
    queue.stop();

    match finished.status {
        OperationStatus::Completed => {
            println!(
                "{} {} ({} bytes)",
                "Done:".green(),
                source.display(),
                finished.total_bytes
            );
            Ok(())
        }
        _ => Err(SkiffError::Api(
            finished
                .error_message
                .unwrap_or_else(|| "operation failed".to_string()),
        )),
    }
}
