use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "wardrobe",
    about = "Wardrobe: inspect and edit cosmetic ownership through the console cache",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// JSON fixture to seed the in-memory data source
    #[arg(long, global = true)]
    pub seed: Option<PathBuf>,

    /// TOML console configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StoreName {
    Players,
    Cosmetics,
    Items,
    Events,
    Snapshots,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum KeyedStore {
    Players,
    Items,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the cached contents of a store
    List(ListArgs),
    /// Resolve a loose key to a player or item
    Resolve(ResolveArgs),
    /// Grant an item to a player
    Grant(OwnershipArgs),
    /// Revoke an item from a player
    Revoke(OwnershipArgs),
    /// Show a player's net inventory
    Inventory(InventoryArgs),
    /// Show per-store cache state
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct ListArgs {
    pub store: StoreName,
}

#[derive(Args)]
pub struct ResolveArgs {
    pub store: KeyedStore,
    /// Internal id, external id / SKU, or display name
    pub key: String,
}

#[derive(Args)]
pub struct OwnershipArgs {
    pub player: String,
    pub item: String,
    #[arg(short, long, default_value = "1")]
    pub quantity: u32,
}

#[derive(Args)]
pub struct InventoryArgs {
    pub player: String,
}

#[derive(Args)]
pub struct StatsArgs {}
