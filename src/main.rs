//! uibridge - CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uibridge::runtime::scope::ApiEvent;
use uibridge::util::{config, logger};
use uibridge::{Element, Handle, HandleScope, NativeValue, RecordingApi, Value, NAME, VERSION};

/// Engine bridge diagnostics
#[derive(Parser, Debug)]
#[command(name = "uibridge")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $UIBRIDGE_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the nested scope scenario against an in-process engine
    Demo,

    /// Marshal a JSON document into a value and back
    Marshal {
        /// JSON text
        #[arg(value_name = "JSON")]
        json: String,
    },

    /// Print the effective configuration
    Config,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.verbose {
        logger::init_debug();
    } else {
        logger::init_with_level(cfg.log_level()?);
    }
    uibridge::init(&cfg);

    match args.command {
        Commands::Demo => demo()?,
        Commands::Marshal { json } => marshal(&json)?,
        Commands::Config => {
            print!("{}", cfg.to_toml_string()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

fn demo() -> Result<()> {
    let api = RecordingApi::shared();
    let body = Handle::from_raw(0xAAAA);

    let outer = HandleScope::open_with(api.clone());
    let wrapper = Element::wrap(body)?;
    report("S1 wrapped", &api.events());

    let inner = HandleScope::open();
    let again = Element::wrap(body)?;
    println!("S2 lookup returns the S1 wrapper: {}", again.ptr_eq(&wrapper));
    report("S2 looked up", &api.events());

    inner.close()?;
    report("S2 closed", &api.events());

    outer.close()?;
    report("S1 closed", &api.events());
    println!("wrapper dropped: {}", wrapper.is_dropped());

    Ok(())
}

fn report(
    step: &str,
    events: &[ApiEvent],
) {
    let calls: Vec<String> = events.iter().map(ApiEvent::to_string).collect();
    println!("{:<13} [{}]", step, calls.join(", "));
}

fn marshal(json: &str) -> Result<()> {
    let doc: serde_json::Value = serde_json::from_str(json).context("Invalid JSON")?;
    let native = NativeValue::from_json(&doc);
    let value = Value::from_native(&native);

    println!("type:      {}", value.value_type());
    println!("length:    {}", value.len());
    println!("refcount:  {}", value.ref_count());
    println!("native:    {}", value.get_value());
    println!("json:      {}", value.get_value().to_json());

    Ok(())
}
