//! CLI entry point for `archivist`.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use archivist::config::{self, Config};
use archivist::index::FileIndex;
use archivist::model::record::{ThreadEntry, ThreadInfo};
use archivist::store::FileStore;
use archivist::{ArchiveError, DocId, Message, MetaIndex, QueryCursor, ThreadId};

type Archive = MetaIndex<FileStore, FileIndex>;

#[derive(Parser)]
#[command(
    name = "archivist",
    version,
    about = "Threaded, labeled, searchable mail metadata"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the store, index and log
    #[arg(long, global = true, env = "ARCHIVIST_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Add one message given as JSON (`-` reads stdin)
    Add {
        file: PathBuf,
        /// Initial state (starred, unread, deleted)
        #[arg(long = "state", value_name = "STATE")]
        states: Vec<String>,
        /// Initial thread labels
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
    },
    /// Add messages from a JSON-lines file, one message per line
    Import { file: PathBuf },
    /// Search threads
    Search {
        query: String,
        /// Page to show, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Threads per page
        #[arg(long)]
        per_page: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Count threads matching a query
    Count { query: String },
    /// Show a thread and its messages
    Thread {
        id: ThreadId,
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Message {
        docid: DocId,
        #[arg(long)]
        json: bool,
    },
    /// Set the mutable state of a message, or of every message in a thread
    State {
        /// Docid, or thread id with --thread
        id: String,
        states: Vec<String>,
        #[arg(long)]
        thread: bool,
    },
    /// Replace the labels of a thread
    Labels { thread: ThreadId, labels: Vec<String> },
    /// List every known label
    AllLabels,
    /// Drop labels no live message carries
    PruneLabels,
    /// List correspondents
    Contacts {
        prefix: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show archive statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Write the effective configuration to the config file
    InitConfig,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// One line of an import file.
#[derive(Deserialize)]
struct ImportRecord {
    #[serde(flatten)]
    message: Message,
    #[serde(default)]
    state: Vec<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load_config();
    if let Some(dir) = cli.data_dir {
        config.general.data_dir = Some(dir);
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Add {
            file,
            states,
            labels,
        } => cmd_add(&config, &file, &states, &labels),
        Commands::Import { file } => cmd_import(&config, &file),
        Commands::Search {
            query,
            page,
            per_page,
            json,
        } => cmd_search(&config, &query, page, per_page, json),
        Commands::Count { query } => cmd_count(&config, &query),
        Commands::Thread { id, json } => cmd_thread(&config, id, json),
        Commands::Message { docid, json } => cmd_message(&config, docid, json),
        Commands::State { id, states, thread } => cmd_state(&config, &id, &states, thread),
        Commands::Labels { thread, labels } => cmd_labels(&config, thread, &labels),
        Commands::AllLabels => cmd_all_labels(&config),
        Commands::PruneLabels => cmd_prune_labels(&config),
        Commands::Contacts { prefix, limit } => cmd_contacts(&config, prefix.as_deref(), limit),
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::InitConfig => cmd_init_config(&config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::data_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, config::log_file_name());
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open the archive in the configured data directory.
fn open_archive(config: &Config) -> anyhow::Result<Archive> {
    let dir = config::data_dir(config);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create data directory {}", dir.display()))?;

    let store = FileStore::open(config::store_path(config))?;
    let index = FileIndex::open(config::index_path(config))?;
    match MetaIndex::open(store, index, config.index.meta_options()) {
        Ok(meta) => Ok(meta),
        Err(e @ ArchiveError::VersionMismatch { .. }) => {
            Err(anyhow::Error::new(e).context("the archive must be rebuilt with this version"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Flush both backends, surfacing any write error.
fn close_archive(meta: Archive) -> anyhow::Result<()> {
    let (mut store, mut index) = meta.into_parts();
    index.flush().context("cannot write index")?;
    store.flush().context("cannot write store")?;
    Ok(())
}

fn read_input(file: &Path) -> anyhow::Result<String> {
    let mut text = String::new();
    if file == Path::new("-") {
        std::io::stdin().read_to_string(&mut text)?;
    } else {
        text = std::fs::read_to_string(file)
            .with_context(|| format!("cannot read {}", file.display()))?;
    }
    Ok(text)
}

/// Add a single message.
fn cmd_add(config: &Config, file: &Path, states: &[String], labels: &[String]) -> anyhow::Result<()> {
    let message: Message = serde_json::from_str(&read_input(file)?)
        .with_context(|| format!("{} is not a message record", file.display()))?;

    let mut meta = open_archive(config)?;
    let (docid, thread_id) = meta.add_message(&message, states, labels, BTreeMap::new())?;
    close_archive(meta)?;

    println!("  {:<12} {}", "Message", docid);
    println!("  {:<12} {}", "Thread", thread_id);
    Ok(())
}

/// Bulk-add messages from a JSON-lines file.
fn cmd_import(config: &Config, file: &Path) -> anyhow::Result<()> {
    let handle = std::fs::File::open(file)
        .with_context(|| format!("cannot open {}", file.display()))?;
    let file_size = handle.metadata()?.len();

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Importing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let mut meta = open_archive(config)?;
    meta.reset_timers();
    let start = Instant::now();
    let before = meta.size()?;
    let mut skipped = 0usize;
    let mut read = 0u64;

    for (lineno, line) in BufReader::new(handle).lines().enumerate() {
        let line = line?;
        read += line.len() as u64 + 1;
        pb.set_position(read.min(file_size));
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "Skipping malformed record");
                skipped += 1;
                continue;
            }
        };
        match meta.add_message(&record.message, &record.state, &record.labels, record.extra) {
            Ok(_) => {}
            Err(e) if e.is_caller_error() => {
                tracing::warn!(line = lineno + 1, error = %e, "Skipping rejected message");
                skipped += 1;
            }
            Err(e) => {
                pb.abandon();
                return Err(e.into());
            }
        }
    }
    pb.finish_and_clear();

    let added = meta.size()? - before;
    let timings = meta.timings();
    close_archive(meta)?;

    println!();
    println!("  {:<20} {}", "Added", added);
    println!("  {:<20} {}", "Skipped", skipped);
    println!("  {:<20} {:.2?}", "Elapsed", start.elapsed());
    println!("  {:<20} {:.2?}", "Index time", timings.index);
    println!("  {:<20} {:.2?}", "Store time", timings.store);
    println!("  {:<20} {:.2?}", "Thread time", timings.thread);
    println!();
    Ok(())
}

/// Search threads and print one page.
fn cmd_search(
    config: &Config,
    query: &str,
    page: usize,
    per_page: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    let per_page = per_page.unwrap_or(config.index.default_page_size).max(1);
    let mut cursor = QueryCursor::parse(query)?;

    // Earlier pages still have to be walked to skip their threads.
    for _ in 1..page.max(1) {
        if meta.get_some_results(&mut cursor, per_page)?.is_empty() {
            break;
        }
    }
    let results = meta.get_some_results(&mut cursor, per_page)?;

    if json {
        print_threads_json(&results)?;
    } else {
        print_threads_table(&results);
    }
    Ok(())
}

fn cmd_count(config: &Config, query: &str) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    let cursor = QueryCursor::parse(query)?;
    println!("{}", meta.count_results(&cursor)?);
    Ok(())
}

fn cmd_thread(config: &Config, id: ThreadId, json: bool) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    let info = meta
        .load_threadinfo(id)?
        .ok_or(ArchiveError::UnknownThread(id))?;
    let entries = meta.load_thread_messageinfos(id)?.unwrap_or_default();

    if json {
        let output = serde_json::json!({
            "thread": info,
            "messages": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_threads_table(std::slice::from_ref(&info));
    print_thread_tree(&entries);
    Ok(())
}

fn cmd_message(config: &Config, docid: DocId, json: bool) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    let info = meta
        .load_messageinfo(docid)?
        .ok_or(ArchiveError::UnknownMessage(docid))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!();
    println!("  {:<12} {}", "Message", info.docid);
    println!("  {:<12} {}", "Thread", info.thread_id);
    println!("  {:<12} {}", "Date", info.record.date.format("%Y-%m-%d %H:%M"));
    println!("  {:<12} {}", "From", info.record.from);
    println!("  {:<12} {}", "To", info.record.to.join(", "));
    if !info.record.cc.is_empty() {
        println!("  {:<12} {}", "Cc", info.record.cc.join(", "));
    }
    println!("  {:<12} {}", "Subject", info.record.subject);
    println!("  {:<12} {}", "State", join_words(info.state.iter()));
    println!("  {:<12} {}", "Labels", join_words(info.labels.iter()));
    println!();
    println!("  {}", info.snippet);
    println!();
    Ok(())
}

fn cmd_state(config: &Config, id: &str, states: &[String], thread: bool) -> anyhow::Result<()> {
    let mut meta = open_archive(config)?;
    let state = if thread {
        let thread_id: ThreadId = id
            .parse()
            .with_context(|| format!("{id:?} is not a thread id"))?;
        meta.update_thread_state(thread_id, states)?
    } else {
        let docid: DocId = id
            .parse()
            .with_context(|| format!("{id:?} is not a message id"))?;
        meta.update_message_state(docid, states)?
    };
    close_archive(meta)?;
    println!("{}", join_words(state.iter()));
    Ok(())
}

fn cmd_labels(config: &Config, thread: ThreadId, labels: &[String]) -> anyhow::Result<()> {
    let mut meta = open_archive(config)?;
    let labels = meta.update_thread_labels(thread, labels)?;
    close_archive(meta)?;
    println!("{}", join_words(labels.iter()));
    Ok(())
}

fn cmd_all_labels(config: &Config) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    for label in meta.all_labels()? {
        println!("{label}");
    }
    Ok(())
}

fn cmd_prune_labels(config: &Config) -> anyhow::Result<()> {
    let mut meta = open_archive(config)?;
    let pruned = meta.prune_labels()?;
    close_archive(meta)?;
    println!("  Pruned {} label(s)", pruned.len());
    for label in pruned {
        println!("    {label}");
    }
    Ok(())
}

fn cmd_contacts(config: &Config, prefix: Option<&str>, limit: Option<usize>) -> anyhow::Result<()> {
    let meta = open_archive(config)?;
    let limit = limit.unwrap_or(config.contacts.default_limit);
    for contact in meta.list_contacts(prefix, limit)? {
        let seen = chrono::DateTime::from_timestamp(contact.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        match contact.name {
            Some(name) => println!("  {:<10} {name} <{}>", seen, contact.email),
            None => println!("  {:<10} {}", seen, contact.email),
        }
    }
    Ok(())
}

/// Show archive statistics.
fn cmd_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store_path = config::store_path(config);
    let index_path = config::index_path(config);
    let meta = open_archive(config)?;
    let size = meta.size()?;
    let labels = meta.all_labels()?.len();
    let file_size = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);

    if json {
        let stats = serde_json::json!({
            "version": Archive::version(),
            "data_dir": config::data_dir(config).to_string_lossy(),
            "message_count": size,
            "label_count": labels,
            "store_size": file_size(&store_path),
            "index_size": file_size(&index_path),
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Version", Archive::version());
    println!("  {:<20} {}", "Data directory", config::data_dir(config).display());
    println!("  {:<20} {}", "Messages", size);
    println!("  {:<20} {}", "Labels", labels);
    println!(
        "  {:<20} {}",
        "Store size",
        format_size(file_size(&store_path), BINARY)
    );
    println!(
        "  {:<20} {}",
        "Index size",
        format_size(file_size(&index_path), BINARY)
    );
    println!();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "archivist", &mut std::io::stdout());
    Ok(())
}

/// Write the effective configuration to the config file.
fn cmd_init_config(config: &Config) -> anyhow::Result<()> {
    config::save_config(config)?;
    if let Some(path) = config::config_file_path() {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn join_words<T: std::fmt::Display>(words: impl Iterator<Item = T>) -> String {
    words.map(|w| w.to_string()).collect::<Vec<_>>().join(" ")
}

/// Print threads as a human-readable table.
fn print_threads_table(threads: &[ThreadInfo]) {
    println!();
    println!("  {} thread(s)", threads.len());
    println!();

    if threads.is_empty() {
        return;
    }

    println!(
        "  {:<8} {:<17} {:<25} {:<40} {:>4}",
        "Thread", "Date", "From", "Subject", "Msgs"
    );
    println!("  {}", "-".repeat(98));

    for t in threads {
        let date = t.record.date.format("%Y-%m-%d %H:%M").to_string();
        let from = t.record.participants.first().map(String::as_str).unwrap_or("");
        let from_trunc: String = from.chars().take(24).collect();
        let subj_trunc: String = t.record.subject.chars().take(39).collect();
        let marker = if t.unread_participants.is_empty() { ' ' } else { '*' };

        println!(
            "{marker} {:<8} {:<17} {:<25} {:<40} {:>4}",
            t.thread_id.to_string(),
            date,
            from_trunc,
            subj_trunc,
            t.record.size
        );
    }
    println!();
}

fn print_thread_tree(entries: &[ThreadEntry]) {
    for entry in entries {
        let indent = "  ".repeat(entry.depth);
        match &entry.message {
            Some(m) => println!(
                "  {indent}{:>6}  {}  {}",
                m.docid,
                m.record.date.format("%Y-%m-%d"),
                m.record.from
            ),
            None => println!("  {indent}     -  (missing parent)"),
        }
    }
    println!();
}

/// Print threads as JSON.
fn print_threads_json(threads: &[ThreadInfo]) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "result_count": threads.len(),
        "results": threads,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
