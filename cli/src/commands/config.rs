use anyhow::Result;
use serde::Serialize;

use crate::config::Config;

use super::helpers::{mask, print_json};

#[derive(Serialize)]
struct ConfigView {
    data_dir: String,
    config_file: String,
    cache_db: String,
    mirror: String,
    edamam_app_id: Option<String>,
    edamam_app_key: Option<String>,
    mirror_api_key: Option<String>,
    max_background_tasks: usize,
}

pub(crate) fn cmd_config(config: &Config, json: bool) -> Result<()> {
    let s = &config.settings;
    let view = ConfigView {
        data_dir: config.data_dir.display().to_string(),
        config_file: config.config_path().display().to_string(),
        cache_db: config.db_path.display().to_string(),
        mirror: s
            .mirror_url
            .clone()
            .unwrap_or_else(|| format!("local ({})", config.mirror_db_path.display())),
        edamam_app_id: s.edamam_app_id.clone(),
        edamam_app_key: s.edamam_app_key.as_deref().map(mask),
        mirror_api_key: s.mirror_api_key.as_deref().map(mask),
        max_background_tasks: config.max_background_tasks(),
    };

    if json {
        return print_json(&view);
    }

    let unset = || "(not set)".to_string();
    println!("Data directory:   {}", view.data_dir);
    println!("Config file:      {}", view.config_file);
    println!("Recipe cache:     {}", view.cache_db);
    println!("Favorites mirror: {}", view.mirror);
    println!(
        "Edamam app ID:    {}",
        view.edamam_app_id.unwrap_or_else(unset)
    );
    println!(
        "Edamam app key:   {}",
        view.edamam_app_key.unwrap_or_else(unset)
    );
    println!(
        "Mirror API key:   {}",
        view.mirror_api_key.unwrap_or_else(unset)
    );
    println!("Background tasks: {}", view.max_background_tasks);
    Ok(())
}
