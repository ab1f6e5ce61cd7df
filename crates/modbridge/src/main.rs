use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use serde_json::Map;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use modbridge::Bridge;
use modbridge::BridgeConfig;
use modbridge::CallRequest;

/// Run a WASI command module in-process and print its result envelope.
///
/// Without MODULE, a call request is read from stdin:
/// {"options": ["<module>"], "arguments": {...}}
#[derive(Parser, Debug)]
#[command(name = "modbridge", version)]
struct Cli {
    /// Module identifier or path
    module: Option<String>,

    /// Module arguments as a JSON object
    #[arg(short, long, value_name = "JSON")]
    args: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "MODBRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the shared library root
    #[arg(long, value_name = "DIR")]
    sharelib: Option<PathBuf>,

    /// List available modules and exit
    #[arg(short, long)]
    list: bool,
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    Ok(match &cli.sharelib {
        Some(dir) => config.with_sharelib(dir),
        None => config,
    })
}

fn read_call(cli: &Cli) -> Result<(Vec<Vec<Value>>, Map<String, Value>)> {
    if let Some(module) = &cli.module {
        let args = match &cli.args {
            Some(text) => serde_json::from_str(text).context("--args must be a JSON object")?,
            None => Map::new(),
        };
        return Ok((vec![vec![Value::from(module.as_str())]], args));
    }

    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text).context("Cannot read call request from stdin")?;
    Ok(CallRequest::parse(&text).context("Invalid call request")?.into_parts())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bridge = Bridge::new(load_config(&cli)?)?;

    if cli.list {
        let modules = bridge.loader().available()?;
        println!("Available modules in {}:", bridge.loader().modules_dir().display());
        for (i, name) in modules.iter().enumerate() {
            println!(" {}. {}", i + 1, name);
        }
        return Ok(());
    }

    let (opts, args) = read_call(&cli)?;
    println!("{}", bridge.dispatch(&opts, args).await);
    Ok(())
}
