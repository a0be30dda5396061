use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use savor_core::models::Recipe;

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Recipe")]
        label: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Fav")]
        favorite: &'static str,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .enumerate()
        .map(|(i, r)| RecipeRow {
            idx: i + 1,
            key: truncate(r.composite_key(), 40),
            label: r
                .label
                .as_deref()
                .map(|l| truncate(l, 35))
                .unwrap_or_default(),
            calories: format_calories(r.calories),
            time: format_minutes(r.total_time),
            favorite: if r.is_favorite { "*" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_detail(recipe: &Recipe) {
    let label = recipe.label.as_deref().unwrap_or("(untitled)");
    let star = if recipe.is_favorite { " *" } else { "" };
    println!("{label}{star}");
    println!("  Key:       {}", recipe.composite_key());
    println!("  Calories:  {}", format_calories(recipe.calories));
    println!("  Time:      {}", format_minutes(recipe.total_time));
    if let Some(labels) = recipe.health_labels.as_ref().filter(|l| !l.is_empty()) {
        println!("  Health:    {}", labels.join(", "));
    }
    if let Some(url) = &recipe.url {
        println!("  Source:    {url}");
    }
    if let Some(image) = &recipe.image {
        println!("  Image:     {image}");
    }
    if let Some(lines) = recipe.ingredient_lines.as_ref().filter(|l| !l.is_empty()) {
        println!("\nIngredients:");
        for line in lines {
            println!("  - {line}");
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn format_calories(calories: Option<f64>) -> String {
    calories.map_or("-".into(), |c| format!("{c:.0}"))
}

/// Minutes as `45 min` or `1h 30m`; zero means the catalog did not know.
pub(crate) fn format_minutes(minutes: Option<f64>) -> String {
    match minutes {
        Some(m) if m > 0.0 => {
            let total = m.round() as i64;
            if total < 60 {
                format!("{total} min")
            } else if total % 60 == 0 {
                format!("{}h", total / 60)
            } else {
                format!("{}h {}m", total / 60, total % 60)
            }
        }
        _ => "-".into(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Show `secret` as its last four characters.
pub(crate) fn mask(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}
