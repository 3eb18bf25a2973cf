use anyhow::{bail, Context};
use colored::Colorize;
use keyscope_owner::walk;
use keyscope_store::{FileStore, KvConfig, KvStore};
use keyscope_types::{Resolved, Value};

use crate::cli::*;

/// Configuration from `--config` (or defaults), with `--root` applied on top.
pub fn load_config(cli: &Cli) -> anyhow::Result<KvConfig> {
    let mut config = match &cli.config {
        Some(path) => KvConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => KvConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root_dir = root.clone();
    }
    Ok(config)
}

pub fn run_command(cli: Cli, config: &KvConfig) -> anyhow::Result<()> {
    let store = config
        .open_store(&cli.id)
        .with_context(|| format!("failed to open store {}", cli.id))?;
    match cli.command {
        Command::Get(args) => cmd_get(&store, args, cli.format),
        Command::Set(args) => cmd_set(&store, args),
        Command::Rm(args) => cmd_rm(&store, args),
        Command::Keys => cmd_keys(&store, cli.format),
        Command::Tree(args) => cmd_tree(&store, args, cli.format),
        Command::Clear => cmd_clear(&store),
    }
}

pub fn parse_value(kind: ValueKindArg, raw: &str) -> anyhow::Result<Value> {
    let value = match kind {
        ValueKindArg::I32 => Value::I32(raw.parse().with_context(|| format!("not an i32: {raw}"))?),
        ValueKindArg::I64 => Value::I64(raw.parse().with_context(|| format!("not an i64: {raw}"))?),
        ValueKindArg::F32 => Value::F32(raw.parse().with_context(|| format!("not an f32: {raw}"))?),
        ValueKindArg::F64 => Value::F64(raw.parse().with_context(|| format!("not an f64: {raw}"))?),
        ValueKindArg::Bool => Value::Bool(raw.parse().with_context(|| format!("not a bool: {raw}"))?),
        ValueKindArg::String => Value::Str(raw.to_string()),
        ValueKindArg::BytesHex => {
            let digits = raw.strip_prefix("0x").unwrap_or(raw);
            Value::Bytes(hex::decode(digits).with_context(|| format!("not hex: {raw}"))?)
        }
        ValueKindArg::StringSet => Value::StrSet(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect(),
        ),
    };
    Ok(value)
}

fn cmd_get(store: &FileStore, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(value) = store.get(&args.key) else {
        bail!("no value stored at {}", args.key);
    };
    match format {
        OutputFormat::Text => {
            println!("{} = {} {}", args.key.bold(), value, format!("({})", value.kind()).dimmed());
        }
        OutputFormat::Json => {
            let kind = value.kind().to_string();
            let output = serde_json::json!({
                "key": args.key,
                "kind": kind,
                "value": Resolved::from(value),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn cmd_set(store: &FileStore, args: SetArgs) -> anyhow::Result<()> {
    let value = store_value(store, &args)?;
    println!("{} {} = {}", "✓".green(), args.key.bold(), value);
    Ok(())
}

/// Parse and write the value for `set`, returning what was stored.
fn store_value(store: &dyn KvStore, args: &SetArgs) -> anyhow::Result<Value> {
    let value = parse_value(args.kind, &args.value)?;
    store
        .set(&args.key, value.clone())
        .with_context(|| format!("failed to write {}", args.key))?;
    Ok(value)
}

fn cmd_rm(store: &FileStore, args: RmArgs) -> anyhow::Result<()> {
    let present = args.keys.iter().filter(|key| store.contains(key)).count();
    store.remove_many(&args.keys)?;
    println!("{} Removed {} of {} keys", "✓".green(), present, args.keys.len());
    Ok(())
}

fn cmd_keys(store: &FileStore, format: OutputFormat) -> anyhow::Result<()> {
    let keys = store.keys();
    match format {
        OutputFormat::Text => {
            if keys.is_empty() {
                println!("Store is empty.");
            }
            for key in &keys {
                println!("{key}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
    }
    Ok(())
}

fn cmd_tree(store: &FileStore, args: TreeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let tree = walk(store, &args.base);
    match format {
        OutputFormat::Text => {
            for line in render_tree(&args.base, &tree) {
                println!("{line}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
    }
    Ok(())
}

fn cmd_clear(store: &FileStore) -> anyhow::Result<()> {
    let count = store.len();
    store.clear_all()?;
    println!("{} Cleared {} keys from {}", "✓".green().bold(), count, store.path().display());
    Ok(())
}

/// Indented text rendering of a resolved tree, one line per node.
fn render_tree(name: &str, node: &Resolved) -> Vec<String> {
    let mut lines = Vec::new();
    render_node(name, node, 0, &mut lines);
    lines
}

fn render_node(name: &str, node: &Resolved, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match node {
        Resolved::Map(children) => {
            lines.push(format!("{indent}{}", name.bold()));
            for (segment, child) in children {
                render_node(segment, child, depth + 1, lines);
            }
        }
        Resolved::List(items) => {
            lines.push(format!("{indent}{} [{}]", name.bold(), items.len()));
            for (i, item) in items.iter().enumerate() {
                render_node(&i.to_string(), item, depth + 1, lines);
            }
        }
        Resolved::Value(value) => lines.push(format!("{indent}{} = {value}", name.cyan())),
        Resolved::Structured(json) => lines.push(format!("{indent}{} = {json}", name.cyan())),
        Resolved::Null => lines.push(format!("{indent}{} = {}", name.cyan(), "null".dimmed())),
    }
}
