//! Config command

use crate::cli::{ConfigCommands, ConfigShowArgs};
use crate::output;
use anyhow::Result;
use retrier_core::ConfigLoader;

pub fn run(cmd: ConfigCommands, loader: &ConfigLoader) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, loader),
    }
}

fn show(args: ConfigShowArgs, loader: &ConfigLoader) -> Result<()> {
    let config = loader.load_runtime_config()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    output::header("Sources");
    output::kv("config file", loader.config_path().as_str());
    output::kv(
        "file present",
        if loader.config_path().exists() { "yes" } else { "no" },
    );

    output::header("Resolved configuration");
    println!("{}", serde_yaml_ng::to_string(&config)?);

    Ok(())
}
