use anyhow::{Result, bail};
use serde::Serialize;
use std::process;

use savor_core::mirror::MirrorAction;
use savor_core::models::{HealthFilter, Recipe, RecipeEdit};
use savor_core::sync::{Ingested, SyncCoordinator};

use super::helpers::{print_json, print_recipe_detail, print_recipe_table};

fn print_results(recipes: &[Recipe], empty_message: &str, json: bool) -> Result<()> {
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("{empty_message}");
        }
        process::exit(2);
    }

    if json {
        print_json(&recipes)
    } else {
        print_recipe_table(recipes);
        Ok(())
    }
}

async fn settle(sync: &SyncCoordinator, ingested: Ingested) -> Result<Vec<Recipe>> {
    ingested.persisted.await??;
    // Shown results now carry the cached favorite flags.
    Ok(sync.state().results())
}

pub(crate) async fn cmd_search(
    sync: &SyncCoordinator,
    term: &str,
    health: HealthFilter,
    offline: bool,
    json: bool,
) -> Result<()> {
    let recipes = if offline {
        sync.search_cached(term)?
    } else {
        let ingested = sync.search(term, health).await?;
        settle(sync, ingested).await?
    };
    print_results(&recipes, &format!("No recipes found for '{term}'"), json)
}

pub(crate) async fn cmd_featured(sync: &SyncCoordinator, json: bool) -> Result<()> {
    let ingested = sync.refresh_featured().await?;
    let recipes = settle(sync, ingested).await?;
    print_results(&recipes, "No featured recipes right now", json)
}

pub(crate) fn cmd_show(sync: &SyncCoordinator, key: &str, json: bool) -> Result<()> {
    let recipe = sync.get_recipe(key)?;
    if json {
        print_json(&recipe)
    } else {
        print_recipe_detail(&recipe);
        Ok(())
    }
}

pub(crate) fn cmd_saved(sync: &SyncCoordinator, json: bool) -> Result<()> {
    let saved = sync.saved_recipes()?;
    print_results(&saved, "No saved recipes yet", json)
}

#[derive(Serialize)]
struct FavoriteOutput<'a> {
    key: &'a str,
    is_favorite: bool,
    mirror: Option<MirrorAction>,
    mirror_error: Option<String>,
}

pub(crate) async fn cmd_favorite(sync: &SyncCoordinator, key: &str, json: bool) -> Result<()> {
    let toggle = sync.toggle_favorite(key)?;
    let (mirror, mirror_error) = match toggle.mirrored.await? {
        Ok(action) => (Some(action), None),
        Err(e) => (None, Some(e.to_string())),
    };

    if json {
        return print_json(&FavoriteOutput {
            key,
            is_favorite: toggle.is_favorite,
            mirror,
            mirror_error,
        });
    }

    if toggle.is_favorite {
        println!("Saved {key} to favorites");
    } else {
        println!("Removed {key} from favorites");
    }
    if let Some(err) = mirror_error {
        eprintln!("Warning: favorites mirror not updated: {err}");
    }
    Ok(())
}

#[derive(Serialize)]
struct EditOutput<'a> {
    recipe: &'a Recipe,
    mirror: Option<MirrorAction>,
    mirror_error: Option<String>,
}

pub(crate) async fn cmd_edit(
    sync: &SyncCoordinator,
    key: &str,
    edit: &RecipeEdit,
    json: bool,
) -> Result<()> {
    if edit.is_empty() {
        bail!("Nothing to change. Pass at least one of --label, --calories, --time, --image, --ingredient");
    }

    let edited = sync.edit_recipe(key, edit)?;
    let (mirror, mirror_error) = match edited.mirrored {
        Some(handle) => match handle.await? {
            Ok(action) => (Some(action), None),
            Err(e) => (None, Some(e.to_string())),
        },
        None => (None, None),
    };

    if json {
        return print_json(&EditOutput {
            recipe: &edited.recipe,
            mirror,
            mirror_error,
        });
    }

    print_recipe_detail(&edited.recipe);
    if let Some(err) = mirror_error {
        eprintln!("Warning: favorites mirror not updated: {err}");
    }
    Ok(())
}
