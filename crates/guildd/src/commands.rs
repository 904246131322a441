//! One-shot operator commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use guild_core::ServiceConfig;
use guild_greeter::{ConfigResolver, Greeter};
use guild_state::StateStore;

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join("guild.redb");
    StateStore::open(&path).with_context(|| format!("opening state store {}", path.display()))
}

/// Print the greeting `guildd serve` would return for `name`.
pub fn greet(config: &ServiceConfig, data_dir: &Path, name: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let greeter = Greeter::new(
        ConfigResolver::from_config(Arc::new(store), &config.greeting),
        &config.greeting.default_name,
    );
    println!("{}", greeter.handle(b"", Some(name)));
    Ok(())
}

pub fn param_get(config: &ServiceConfig, data_dir: &Path, key: Option<&str>) -> anyhow::Result<()> {
    let key = key.unwrap_or(&config.greeting.parameter);
    match open_store(data_dir)?.get_parameter(key)? {
        Some(value) => println!("{value}"),
        None => anyhow::bail!("parameter {key} is not set"),
    }
    Ok(())
}

pub fn param_put(
    config: &ServiceConfig,
    data_dir: &Path,
    key: Option<&str>,
    value: &str,
) -> anyhow::Result<()> {
    let key = key.unwrap_or(&config.greeting.parameter);
    open_store(data_dir)?.put_parameter(key, value)?;
    tracing::info!(%key, "parameter updated");
    Ok(())
}

pub fn param_delete(config: &ServiceConfig, data_dir: &Path, key: Option<&str>) -> anyhow::Result<()> {
    let key = key.unwrap_or(&config.greeting.parameter);
    if open_store(data_dir)?.delete_parameter(key)? {
        tracing::info!(%key, "parameter deleted");
    } else {
        tracing::warn!(%key, "parameter was not set");
    }
    Ok(())
}

pub fn show_config(config: &ServiceConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
