use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use blobs_store::{
    GarbageCollector, GracePeriod, MarkAndSweep, ObjectId, Store, StoreConfig, StoreError,
};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store = open_store(&cli)?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Put(args) => cmd_put(&store, args, json),
        Command::Cat(args) => cmd_cat(&store, &args.id),
        Command::Exists(args) => cmd_exists(&store, &args.id, json),
        Command::Ls => cmd_ls(&store, json),
        Command::Rm(args) => cmd_rm(&store, &args.id),
        Command::Link(args) => cmd_link(&store, &args.id, &args.path),
        Command::Unlink(args) => cmd_unlink(&store, &args.path),
        Command::Linked => cmd_linked(&store, json),
        Command::Verify(args) => cmd_verify(&store, args.id.as_deref(), json),
        Command::Gc(args) => cmd_gc(&store, args, json),
    }
}

fn open_store(cli: &Cli) -> anyhow::Result<Store> {
    let mut config = match cli.config.as_deref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str::<StoreConfig>(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => StoreConfig::default(),
    };
    if let Some(algorithm) = cli.algorithm {
        config.algorithm = algorithm;
    }
    Store::with_config(&cli.root, config)
        .with_context(|| format!("failed to open store at {}", cli.root.display()))
}

fn parse_id(hex: &str) -> anyhow::Result<ObjectId> {
    ObjectId::from_hex(hex).with_context(|| format!("invalid object id {hex:?}"))
}

/// Paths need not be UTF-8; JSON output replaces invalid sequences.
fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn paths_json(paths: &[PathBuf]) -> serde_json::Value {
    paths.iter().map(|p| serde_json::Value::String(lossy(p))).collect()
}

fn cmd_put(store: &Store, args: PutArgs, json: bool) -> anyhow::Result<()> {
    let _lock = store.lock().context("store is busy")?;
    let id = match args.path.as_deref() {
        None => store.put(io::stdin().lock())?,
        Some(p) if p == Path::new("-") => store.put(io::stdin().lock())?,
        Some(p) => {
            let file = File::open(p).with_context(|| format!("failed to open {}", p.display()))?;
            store.put(file)?
        }
    };
    if let Some(link) = &args.link {
        store.link(&id, link)?;
    }

    if json {
        println!("{}", json!({ "id": id, "link": args.link.as_deref().map(lossy) }));
    } else {
        println!("{} {}", "✓".green().bold(), id.to_hex().yellow());
        if let Some(link) = &args.link {
            println!("  linked at {}", link.display().to_string().cyan());
        }
    }
    Ok(())
}

fn cmd_cat(store: &Store, hex: &str) -> anyhow::Result<()> {
    let id = store.load_hex(hex)?;
    let mut file = store.open(&id)?;
    let mut stdout = io::stdout().lock();
    io::copy(&mut file, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_exists(store: &Store, hex: &str, json: bool) -> anyhow::Result<()> {
    let present = match store.load_hex(hex) {
        Ok(_) => true,
        Err(StoreError::NotFound(_)) => false,
        Err(e) => return Err(e.into()),
    };
    if json {
        println!("{}", json!({ "id": hex, "exists": present }));
    } else if present {
        println!("{} {}", "✓".green(), hex.yellow());
    } else {
        println!("{} {} not found", "✗".red(), hex.yellow());
    }
    Ok(())
}

fn cmd_ls(store: &Store, json: bool) -> anyhow::Result<()> {
    let ids = store.list()?;
    if json {
        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            entries.push(json!({ "id": id, "size": store.size(id)? }));
        }
        println!("{}", serde_json::Value::Array(entries));
        return Ok(());
    }
    for id in &ids {
        println!("{}  {:>10}", id.to_hex().yellow(), store.size(id)?);
    }
    println!("{} objects", ids.len().to_string().bold());
    Ok(())
}

fn cmd_rm(store: &Store, hex: &str) -> anyhow::Result<()> {
    let _lock = store.lock().context("store is busy")?;
    let id = store.load_hex(hex)?;
    store.remove(&id)?;
    println!("Removed {}", id.to_hex().yellow());
    Ok(())
}

fn cmd_link(store: &Store, hex: &str, path: &Path) -> anyhow::Result<()> {
    let _lock = store.lock().context("store is busy")?;
    let id = parse_id(hex)?;
    store.link(&id, path)?;
    println!(
        "{} {} → {}",
        "✓".green(),
        path.display().to_string().cyan(),
        id.short_hex().yellow()
    );
    Ok(())
}

fn cmd_unlink(store: &Store, path: &Path) -> anyhow::Result<()> {
    let _lock = store.lock().context("store is busy")?;
    if store.unlink(path)? {
        println!("Unlinked {}", path.display().to_string().cyan());
    } else {
        println!("Nothing linked at {}", path.display());
    }
    Ok(())
}

fn cmd_linked(store: &Store, json: bool) -> anyhow::Result<()> {
    let linked = store.linked()?;
    if json {
        let map: serde_json::Map<String, serde_json::Value> = linked
            .iter()
            .map(|(id, paths)| (id.to_hex(), paths_json(paths)))
            .collect();
        println!("{}", serde_json::Value::Object(map));
        return Ok(());
    }
    if linked.is_empty() {
        println!("No staging links.");
    }
    for (id, paths) in &linked {
        println!("{}", id.to_hex().yellow());
        for path in paths {
            println!("  {}", path.display().to_string().cyan());
        }
    }
    Ok(())
}

fn cmd_verify(store: &Store, hex: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ids = match hex {
        Some(hex) => vec![store.load_hex(hex)?],
        None => store.list()?,
    };

    let mut corrupt = Vec::new();
    for id in &ids {
        match store.verify(id) {
            Ok(()) => {}
            Err(StoreError::HashMismatch { id, computed }) => corrupt.push((id, computed)),
            Err(e) => return Err(e.into()),
        }
    }

    if json {
        let bad: Vec<_> = corrupt
            .iter()
            .map(|(id, computed)| json!({ "id": id, "computed": computed }))
            .collect();
        println!("{}", json!({ "checked": ids.len(), "corrupt": bad }));
    } else {
        for (id, computed) in &corrupt {
            println!("{} {} hashes to {}", "✗".red().bold(), id.to_hex().yellow(), computed.short_hex());
        }
        if corrupt.is_empty() {
            println!("{} {} objects verified", "✓".green().bold(), ids.len());
        }
    }
    if !corrupt.is_empty() {
        bail!("{} of {} objects are corrupt", corrupt.len(), ids.len());
    }
    Ok(())
}

fn cmd_gc(store: &Store, args: GcArgs, json: bool) -> anyhow::Result<()> {
    let lock = store.lock().context("store is busy")?;
    let collector: Box<dyn GarbageCollector> = match args.grace {
        Some(secs) => Box::new(GracePeriod::new(Duration::from_secs(secs))),
        None => Box::new(MarkAndSweep),
    };

    let removed = if args.dry_run {
        collector.find(store)?
    } else {
        store.run_gc(collector.as_ref(), &lock)?.removed
    };
    let pruned: Vec<PathBuf> = match args.temp {
        Some(secs) if !args.dry_run => store.prune_temp(Duration::from_secs(secs))?,
        _ => Vec::new(),
    };

    if json {
        println!(
            "{}",
            json!({ "dry_run": args.dry_run, "removed": removed, "pruned_temp": paths_json(&pruned) })
        );
        return Ok(());
    }
    let verb = if args.dry_run { "would be removed" } else { "removed" };
    for id in &removed {
        println!("  {}", id.to_hex().dimmed());
    }
    println!("{} GC: {} objects {}.", "✓".green(), removed.len(), verb);
    if !pruned.is_empty() {
        println!("  pruned {} abandoned temp files", pruned.len());
    }
    Ok(())
}
