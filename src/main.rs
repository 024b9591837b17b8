//! nestset CLI - Command line interface for a file-backed nested set store
//!
//! Reads JSON documents where arrays are nested sets and every other value is
//! a leaf. Identical sub-arrays in one document are interned into a single
//! node, so they are stored once.

use anyhow::Context;
use clap::{Parser, Subcommand};
use nestset::{Entry, FileEndpoint, Fingerprint, JsonCodec, NestedSetStore, Node, StoreConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nestset")]
#[command(about = "A content-addressed store for recursively shared nested sets")]
#[command(version)]
struct Cli {
    /// Path to the store file
    #[arg(short, long, default_value = "store.nestset")]
    store: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Store every node uncompressed
    #[arg(long)]
    no_compression: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store file
    Init,

    /// Store a JSON document and print its fingerprint
    Put {
        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Reconstruct the document stored under a fingerprint
    Get {
        /// The fingerprint (hex)
        fingerprint: String,
    },

    /// List the leaves of a stored set, expanding each shared subset once
    Flatten {
        /// The fingerprint (hex)
        fingerprint: String,
    },

    /// Show store status
    Status,
}

type JsonStore = NestedSetStore<JsonCodec<Value>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let file = FileEndpoint::create(&cli.store)?;
            file.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created store at {}", cli.store.display())
                }),
            )?;
        }

        Commands::Put { ref file } => {
            let input = match file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let document: Value = serde_json::from_str(&input).context("Input is not valid JSON")?;
            let items = match document {
                Value::Array(items) => items,
                _ => anyhow::bail!("Top-level value must be an array"),
            };

            let mut builder = NodeBuilder::default();
            let node = builder.build(items)?;

            let endpoint = FileEndpoint::open_or_create(&cli.store)?;
            let store = open_store(&cli, &endpoint)?;
            let fingerprint = store.store(&node).await?;
            endpoint.sync()?;

            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "fingerprint": fingerprint.to_hex(),
                    "nodes": builder.len(),
                    "objects": endpoint.object_count(),
                }),
            )?;
        }

        Commands::Get { ref fingerprint } => {
            let fingerprint = parse_fingerprint(fingerprint)?;
            let endpoint = open_existing(&cli.store)?;
            let store = open_store(&cli, &endpoint)?;
            let node = store.resolve(fingerprint).await?;

            output(
                cli.format,
                &serde_json::json!({
                    "fingerprint": fingerprint.to_hex(),
                    "contents": node_to_json(&node),
                }),
            )?;
        }

        Commands::Flatten { ref fingerprint } => {
            let fingerprint = parse_fingerprint(fingerprint)?;
            let endpoint = open_existing(&cli.store)?;
            let store = open_store(&cli, &endpoint)?;
            let node = store.resolve(fingerprint).await?;
            let leaves: Vec<Value> = node.leaves().into_iter().cloned().collect();

            output(
                cli.format,
                &serde_json::json!({
                    "fingerprint": fingerprint.to_hex(),
                    "count": leaves.len(),
                    "leaves": leaves,
                }),
            )?;
        }

        Commands::Status => {
            let endpoint = open_existing(&cli.store)?;
            output(
                cli.format,
                &serde_json::json!({
                    "path": endpoint.path().display().to_string(),
                    "objects": endpoint.object_count(),
                }),
            )?;
        }
    }

    Ok(())
}

fn open_existing(path: &Path) -> anyhow::Result<FileEndpoint> {
    FileEndpoint::open(path).with_context(|| format!("Failed to open store {}", path.display()))
}

fn open_store(cli: &Cli, endpoint: &FileEndpoint) -> anyhow::Result<JsonStore> {
    let mut config = StoreConfig::from_env()?;
    if cli.no_compression {
        config = config.without_compression();
    }
    Ok(NestedSetStore::with_config(
        Arc::new(endpoint.clone()),
        JsonCodec::new(),
        config,
    )?)
}

fn parse_fingerprint(s: &str) -> anyhow::Result<Fingerprint> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid fingerprint: {}", s))
}

/// Builds nodes from JSON arrays, reusing one node for identical sub-arrays
#[derive(Default)]
struct NodeBuilder {
    interned: HashMap<String, Node<Value>>,
}

impl NodeBuilder {
    fn build(&mut self, items: Vec<Value>) -> anyhow::Result<Node<Value>> {
        let key = serde_json::to_string(&items)?;
        if let Some(node) = self.interned.get(&key) {
            return Ok(node.clone());
        }

        let entries = items
            .into_iter()
            .map(|item| match item {
                Value::Array(inner) => self.build(inner).map(Entry::Child),
                leaf => Ok(Entry::Leaf(leaf)),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let node = Node::new(entries);
        self.interned.insert(key, node.clone());
        Ok(node)
    }

    /// Number of distinct nodes built
    fn len(&self) -> usize {
        self.interned.len()
    }
}

fn node_to_json(node: &Node<Value>) -> Value {
    Value::Array(
        node.entries()
            .iter()
            .map(|entry| match entry {
                Entry::Leaf(leaf) => leaf.clone(),
                Entry::Child(child) => node_to_json(child),
            })
            .collect(),
    )
}

fn output(format: OutputFormat, value: &Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
