use std::collections::HashMap;
use std::env;

use scrivener_core::config::Config;
use scrivener_core::logging::init_tracing;

mod commands;

const USAGE: &str = "Usage: scrivener <command> [args...]
  ingest <dir> [--user <id>]
  search <dir> <query> [--user <id>] [--strategy semantic|hybrid|adaptive] [--limit <n>]
  classify <query> [--documents] [--selection <chars>] [--target <document-id>] [--dir <dir>]
  train-router <samples.jsonl> <out.json> [--epochs <n>]";

/// Positional arguments plus `--flag [value]` pairs.
pub struct Args {
    pub positional: Vec<String>,
    pub flags: HashMap<String, Option<String>>,
}

impl Args {
    fn parse(raw: Vec<String>) -> Self {
        let mut positional = Vec::new();
        let mut flags = HashMap::new();
        let mut i = 0;
        while i < raw.len() {
            if let Some(name) = raw[i].strip_prefix("--") {
                let value = raw.get(i + 1).filter(|v| !v.starts_with("--")).cloned();
                if value.is_some() { i += 1; }
                flags.insert(name.to_string(), value);
            } else {
                positional.push(raw[i].clone());
            }
            i += 1;
        }
        Self { positional, flags }
    }

    pub fn value(&self, name: &str) -> Option<&str> { self.flags.get(name).and_then(|v| v.as_deref()) }

    pub fn has(&self, name: &str) -> bool { self.flags.contains_key(name) }

    pub fn number(&self, name: &str) -> anyhow::Result<Option<usize>> {
        self.value(name).map(|v| v.parse::<usize>().map_err(|_| anyhow::anyhow!("--{} requires a number, got '{}'", name, v))).transpose()
    }

    pub fn user(&self) -> String { self.value("user").unwrap_or("local").to_string() }
}

fn main() -> anyhow::Result<()> {
    init_tracing("warn");
    let mut raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() || raw[0] == "--help" || raw[0] == "-h" { eprintln!("{}", USAGE); std::process::exit(1); }
    let cmd = raw.remove(0);
    let args = Args::parse(raw);
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;

    let rt = tokio::runtime::Runtime::new()?;
    match cmd.as_str() {
        "ingest" => rt.block_on(commands::ingest(&settings, &args)),
        "search" => rt.block_on(commands::search(&settings, &args)),
        "classify" => rt.block_on(commands::classify(&settings, &args)),
        "train-router" => commands::train_router(&args),
        _ => { eprintln!("Unknown command: {}\n{}", cmd, USAGE); std::process::exit(1); }
    }
}
