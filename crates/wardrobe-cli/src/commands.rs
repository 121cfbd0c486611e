use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use wardrobe_sdk::{Console, ConsoleConfig, Fixture};
use wardrobe_store::{EntityStore, StoreState};
use wardrobe_types::{Entity, OwnershipEvent};

use crate::cli::*;

const CASCADE_WAIT: Duration = Duration::from_secs(5);

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let console = open_console(&cli)?;
    console.load_all().await.context("initial load failed")?;
    let format = cli.format;

    match cli.command {
        Command::List(args) => cmd_list(&console, args, format),
        Command::Resolve(args) => cmd_resolve(&console, args, format),
        Command::Grant(args) => cmd_ownership(&console, args, true, format).await,
        Command::Revoke(args) => cmd_ownership(&console, args, false, format).await,
        Command::Inventory(args) => cmd_inventory(&console, args, format),
        Command::Stats(_) => cmd_stats(&console, format),
    }
}

fn open_console(cli: &Cli) -> anyhow::Result<Console> {
    let config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::default(),
    };
    let fixture = match &cli.seed {
        Some(path) => Fixture::load(path)?,
        None => Fixture::default(),
    };
    // One-shot commands never live long enough for a data set to go stale.
    let console = Console::in_memory(&config.without_auto_refresh(), fixture)?;
    Ok(console)
}

fn cmd_list(console: &Console, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.store {
        StoreName::Players => print_list(console.players(), format, |p| {
            let external = p.external_id.as_deref().unwrap_or("-");
            format!("{}  {}  {}", p.id.yellow(), p.username.bold(), external.dimmed())
        }),
        StoreName::Cosmetics => print_list(console.cosmetics(), format, |c| {
            format!("{}  {}  {} / {}", c.id.yellow(), c.name.bold(), c.slot, c.rarity.to_string().cyan())
        }),
        StoreName::Items => print_list(console.items(), format, |i| {
            let sku = i.sku.as_deref().unwrap_or("-");
            format!("{}  {}  {}", i.id.yellow(), i.name.bold(), sku.dimmed())
        }),
        StoreName::Events => print_list(console.events(), format, describe_event),
        StoreName::Snapshots => print_list(console.snapshots(), format, |s| {
            format!("{} × {}  {}", s.player_id.bold(), s.item_id, s.quantity.to_string().green())
        }),
    }
}

fn cmd_resolve(console: &Console, args: ResolveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let found = match args.store {
        KeyedStore::Players => console
            .players()
            .resolve(&args.key)
            .map(|p| (p.id.clone(), serde_json::to_value(&*p))),
        KeyedStore::Items => console
            .items()
            .resolve(&args.key)
            .map(|i| (i.id.clone(), serde_json::to_value(&*i))),
    };
    let Some((id, value)) = found else {
        anyhow::bail!("no match for {:?}", args.key);
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value?)?),
        OutputFormat::Text => println!("{} {} → {}", "✓".green(), args.key.bold(), id.yellow()),
    }
    Ok(())
}

async fn cmd_ownership(
    console: &Console,
    args: OwnershipArgs,
    grant: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut inventory = console.snapshots().subscribe();
    let before = inventory.borrow().state.last_fetched;

    let event = if grant {
        console.grant(&args.player, &args.item, args.quantity).await?
    } else {
        console.revoke(&args.player, &args.item, args.quantity).await?
    };

    // The inventory refresh runs after the mutation resolves; wait for it
    // so the printed totals include this event.
    let timed_out = tokio::time::timeout(
        CASCADE_WAIT,
        inventory.wait_for(|snap| {
            snap.state.last_fetched != before || snap.state.error.is_some()
        }),
    )
    .await
    .is_err();
    if timed_out {
        tracing::warn!("inventory refresh still pending");
    }

    let held = console.inventory_of(&event.player_id);
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Out<'a> {
                event: &'a OwnershipEvent,
                inventory: Vec<&'a wardrobe_types::InventorySnapshot>,
            }
            let out = Out {
                event: &event,
                inventory: held.iter().map(|s| &**s).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), describe_event(&event));
            print_holdings(&event.player_id, &held);
        }
    }
    Ok(())
}

fn cmd_inventory(console: &Console, args: InventoryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let held = console.inventory_of(&args.player);
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = held.iter().map(|s| &**s).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => print_holdings(&args.player, &held),
    }
    Ok(())
}

#[derive(Serialize)]
struct StoreStats {
    store: String,
    entities: usize,
    total_count: Option<u64>,
    pending: usize,
    fetched: bool,
    error: Option<String>,
}

fn stats_of<E: Entity>(store: &EntityStore<E>) -> StoreStats {
    let snap = store.snapshot();
    StoreStats {
        store: store.name().to_string(),
        entities: snap.collection.len(),
        total_count: snap.total_count,
        pending: snap.optimistic.len(),
        fetched: snap.state.last_fetched.is_some(),
        error: snap.state.error.clone(),
    }
}

fn cmd_stats(console: &Console, format: OutputFormat) -> anyhow::Result<()> {
    let stats = [
        stats_of(console.players()),
        stats_of(console.cosmetics()),
        stats_of(console.items()),
        stats_of(console.events()),
        stats_of(console.snapshots()),
    ];
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            for s in &stats {
                let status = match (&s.error, s.fetched) {
                    (Some(err), _) => err.red().to_string(),
                    (None, true) => "fresh".green().to_string(),
                    (None, false) => "not loaded".dimmed().to_string(),
                };
                let total = s.total_count.map(|n| format!(" of {n}")).unwrap_or_default();
                println!("{:<10} {:>5}{}  {}", s.store.bold(), s.entities, total, status);
            }
            println!("Cascade links: {}", console.bus().links().len());
        }
    }
    Ok(())
}

fn print_list<E: Entity>(
    store: &EntityStore<E>,
    format: OutputFormat,
    line: impl Fn(&E) -> String,
) -> anyhow::Result<()> {
    let entities = store.entities();
    match format {
        OutputFormat::Json => {
            let rows: Vec<&E> = entities.iter().map(Arc::as_ref).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if entities.is_empty() {
                println!("No {}.", store.name());
            }
            for entity in &entities {
                println!("{}", line(entity));
            }
            print_state(&store.state());
        }
    }
    Ok(())
}

fn print_state(state: &StoreState) {
    if let Some(err) = &state.error {
        println!("{} {}", "!".red().bold(), err.red());
    }
}

fn print_holdings(player: &str, held: &[Arc<wardrobe_types::InventorySnapshot>]) {
    if held.is_empty() {
        println!("{} holds nothing.", player.bold());
        return;
    }
    for s in held {
        println!("  {} × {}", s.item_id.yellow(), s.quantity.to_string().green());
    }
}

fn describe_event(e: &OwnershipEvent) -> String {
    format!(
        "{}  {} {} × {} → {}",
        e.id.yellow(),
        e.action.to_string().cyan(),
        e.quantity,
        e.item_id,
        e.player_id.bold()
    )
}
