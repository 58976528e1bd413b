//! smt CLI - Command line interface for shortcut_smt
//!
//! Keeps one sparse Merkle tree in a single store file, with its shape in a
//! `<store>.config` file beside it. Every command opens the store, runs, and
//! records the new root before exiting.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};
use shortcut_smt::{
    BatchItem, BigUint, FileStore, Hash, HasherKind, KvStore, LeafData, LeafValue, MerkleProof,
    SparseMerkleTree, TreeConfig, TreeHasher,
};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};

/// Store key holding the current root hash
const ROOT_KEY: &[u8] = b"meta:root";

type CliTree = SparseMerkleTree<FileStore, Box<dyn TreeHasher>>;

#[derive(Parser)]
#[command(name = "smt")]
#[command(about = "A persistent sparse Merkle tree with compressed single-leaf subtrees")]
#[command(version)]
struct Cli {
    /// Path to the store file
    #[arg(short, long, default_value = "tree.smt")]
    store: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

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
    /// Create a new, empty tree
    Init {
        /// Number of levels, root and leaves included (2 to 257)
        #[arg(long, default_value = "257")]
        height: usize,
        /// Hash function: blake3 or sha256
        #[arg(long, default_value = "blake3")]
        hasher: HasherKind,
        /// Value of a never-written leaf, as 64 hex characters
        #[arg(long)]
        empty_leaf: Option<String>,
        /// Start from this root hash without its contents; fill the tree
        /// in with `import`
        #[arg(long)]
        root: Option<String>,
    },

    /// Show the current root
    Root,

    /// Read a leaf
    Get {
        /// Leaf key (decimal)
        key: String,
    },

    /// Write a leaf
    Set {
        /// Leaf key (decimal)
        key: String,
        /// Leaf value as 64 hex characters
        value: String,
        /// Treat `value` as the leaf hash and store no value
        #[arg(long)]
        unknown: bool,
    },

    /// Print a proof that a leaf holds a value
    Proof {
        /// Leaf key (decimal)
        key: String,
        /// Leaf value as 64 hex characters
        value: String,
        /// Treat `value` as the leaf hash
        #[arg(long)]
        unknown: bool,
    },

    /// Check a proof file against the current root
    Verify {
        /// Proof file (JSON, as printed by `proof`)
        file: PathBuf,
    },

    /// Store the path described by a proof of the current root
    Import {
        /// Proof file (JSON)
        file: PathBuf,
    },

    /// Apply a list of proven updates
    Batch {
        /// Batch file: a JSON array of `{ "proof": .., "new_leaf": .. }`
        file: PathBuf,
    },

    /// Drop superseded records from the store file
    Compact,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Init {
            height,
            hasher,
            empty_leaf,
            root,
        } => {
            if cli.store.exists() {
                bail!("Store {} already exists", cli.store.display());
            }
            let mut config = TreeConfig::new(height).with_hasher(hasher);
            if let Some(hex) = empty_leaf {
                config = config.with_empty_leaf(parse_value(&hex)?);
            }
            config.validate()?;
            let root = root
                .map(|hex| Hash::from_hex(&hex))
                .transpose()
                .context("Invalid root: expected 64 hex characters")?;

            let store = FileStore::create(&cli.store)?;
            let tree =
                SparseMerkleTree::create_with_config(store, config.hasher.build(), &config, root)
                    .await?;
            config.save(&cli.store)?;
            save_root(&tree).await?;

            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created tree at {}", cli.store.display()),
                    "height": config.height,
                    "hasher": config.hasher,
                    "root": tree.root_hash(),
                }),
            )?;
        }

        Commands::Root => {
            let (config, tree) = open_tree(&cli.store).await?;
            output(
                cli.format,
                &serde_json::json!({
                    "root": tree.root_hash(),
                    "height": config.height,
                    "hasher": config.hasher,
                    "num_leaves": tree.num_leaves().to_string(),
                    "empty": tree.root_hash() == tree.zero_hashes()[0],
                }),
            )?;
        }

        Commands::Get { key } => {
            let (_, tree) = open_tree(&cli.store).await?;
            let key = parse_key(&key)?;
            let leaf = tree.get_leaf(&key, None).await?;
            let json = match leaf {
                Some(leaf) => serde_json::json!({
                    "key": key.to_string(),
                    "value": leaf.value().map(hex::encode),
                    "leaf_hash": leaf.hash(tree.hasher()),
                }),
                None => serde_json::json!({
                    "key": key.to_string(),
                    "value": null,
                    "leaf_hash": null,
                }),
            };
            output(cli.format, &json)?;
        }

        Commands::Set {
            key,
            value,
            unknown,
        } => {
            let (_, mut tree) = open_tree(&cli.store).await?;
            let key = parse_key(&key)?;
            let leaf = parse_leaf(&value, unknown)?;
            if !tree.update_leaf(&key, leaf).await? {
                bail!(
                    "Cannot write key {}: out of range or inside an unimported subtree",
                    key
                );
            }
            save_root(&tree).await?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key.to_string(),
                    "root": tree.root_hash(),
                }),
            )?;
        }

        Commands::Proof {
            key,
            value,
            unknown,
        } => {
            let (_, tree) = open_tree(&cli.store).await?;
            let key = parse_key(&key)?;
            let leaf = parse_leaf(&value, unknown)?;
            let proof = tree
                .get_merkle_proof(&key, &leaf)
                .await?
                .ok_or_else(|| anyhow!("Key {} does not hold that leaf", key))?;
            output(cli.format, &serde_json::to_value(&proof)?)?;
        }

        Commands::Verify { file } => {
            let (_, tree) = open_tree(&cli.store).await?;
            let proof: MerkleProof = read_json(&file)?;
            output(
                cli.format,
                &serde_json::json!({
                    "valid": tree.verify_merkle_proof(&proof.key, &proof),
                    "self_consistent": proof.verify(tree.hasher()),
                    "root": tree.root_hash(),
                }),
            )?;
        }

        Commands::Import { file } => {
            let (_, mut tree) = open_tree(&cli.store).await?;
            let proof: MerkleProof = read_json(&file)?;
            let imported = tree.verify_and_store(&proof).await?;
            if imported {
                save_root(&tree).await?;
            }
            output(
                cli.format,
                &serde_json::json!({
                    "imported": imported,
                    "key": proof.key.to_string(),
                    "root": tree.root_hash(),
                }),
            )?;
        }

        Commands::Batch { file } => {
            let (_, mut tree) = open_tree(&cli.store).await?;
            let items: Vec<BatchItem> = read_json(&file)?;
            let applied = tree.batch_update(&items).await?;
            // Earlier items may have landed even when the batch failed
            save_root(&tree).await?;
            output(
                cli.format,
                &serde_json::json!({
                    "applied": applied,
                    "items": items.len(),
                    "root": tree.root_hash(),
                }),
            )?;
        }

        Commands::Compact => {
            let store = FileStore::open(&cli.store)?;
            let before = store.log_size();
            store.compact()?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "entries": store.len(),
                    "bytes_before": before,
                    "bytes_after": store.log_size(),
                }),
            )?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}

async fn open_tree(path: &Path) -> anyhow::Result<(TreeConfig, CliTree)> {
    let config = TreeConfig::load(path)?;
    let store = FileStore::open(path)
        .with_context(|| format!("Failed to open store {}", path.display()))?;

    let root = match store.read(ROOT_KEY)? {
        Some(bytes) => {
            let bytes: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("Malformed root record in {}", path.display()))?;
            Some(Hash::from_bytes(bytes))
        }
        None => None,
    };
    debug!("Opening {} at root {:?}", path.display(), root);

    let tree =
        SparseMerkleTree::create_with_config(store, config.hasher.build(), &config, root).await?;
    Ok((config, tree))
}

async fn save_root(tree: &CliTree) -> anyhow::Result<()> {
    tree.store()
        .set(ROOT_KEY, tree.root_hash().as_bytes())
        .await?;
    tree.store().sync()?;
    Ok(())
}

fn parse_key(s: &str) -> anyhow::Result<BigUint> {
    s.parse::<BigUint>()
        .with_context(|| format!("Invalid key {:?}: expected a decimal number", s))
}

fn parse_value(s: &str) -> anyhow::Result<LeafValue> {
    hex::FromHex::from_hex(s)
        .with_context(|| format!("Invalid value {:?}: expected 64 hex characters", s))
}

fn parse_leaf(s: &str, unknown: bool) -> anyhow::Result<LeafData> {
    if unknown {
        let hash = Hash::from_hex(s)
            .with_context(|| format!("Invalid leaf hash {:?}: expected 64 hex characters", s))?;
        Ok(LeafData::Hash(hash))
    } else {
        Ok(LeafData::Value(parse_value(s)?))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
