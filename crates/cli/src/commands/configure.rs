//! Persisted CLI defaults

use anyhow::{Context, Result};

use crate::config::Config;
use crate::output::{print_json, print_success, OutputFormat};

pub fn show_config(config: &Config) -> Result<()> {
    print_json(config);
    Ok(())
}

pub fn set_config(
    mut config: Config,
    extender_url: Option<String>,
    namespace: Option<String>,
    format: Option<OutputFormat>,
) -> Result<()> {
    if let Some(url) = extender_url {
        url::Url::parse(&url).context("Invalid extender URL")?;
        config.extender_url = Some(url);
    }
    if let Some(namespace) = namespace {
        config.default_namespace = Some(namespace);
    }
    if let Some(format) = format {
        let name = match format {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        };
        config.default_format = Some(name.to_string());
    }

    let path = Config::config_path().context("Could not determine home directory")?;
    config.save_to(&path)?;
    print_success(&format!("Configuration saved to {}", path.display()));
    Ok(())
}
