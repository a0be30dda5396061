use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::identity::composite_key;

/// A recipe as cached locally and shown to the user.
///
/// The composite key is derived from `label` and `url` when the recipe is
/// constructed and never recomputed, so editing the label later does not
/// move the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    composite_key: String,
    pub label: Option<String>,
    pub calories: Option<f64>,
    pub total_time: Option<f64>,
    pub health_labels: Option<Vec<String>>,
    pub image: Option<String>,
    pub ingredient_lines: Option<Vec<String>>,
    pub url: Option<String>,
    pub is_favorite: bool,
}

impl Recipe {
    #[must_use]
    pub fn new(label: Option<String>, url: Option<String>) -> Self {
        let key = composite_key(label.as_deref(), url.as_deref());
        let mut recipe = Self::with_key(key);
        recipe.label = label;
        recipe.url = url;
        recipe
    }

    /// Rebuild a recipe around a key that was derived earlier (storage rows).
    pub(crate) fn with_key(composite_key: String) -> Self {
        Self {
            composite_key,
            label: None,
            calories: None,
            total_time: None,
            health_labels: None,
            image: None,
            ingredient_lines: None,
            url: None,
            is_favorite: false,
        }
    }

    #[must_use]
    pub fn composite_key(&self) -> &str {
        &self.composite_key
    }

    pub fn apply_edit(&mut self, edit: &RecipeEdit) {
        if let Some(label) = &edit.label {
            self.label = Some(label.clone());
        }
        if let Some(calories) = edit.calories {
            self.calories = Some(calories);
        }
        if let Some(total_time) = edit.total_time {
            self.total_time = Some(total_time);
        }
        if let Some(image) = &edit.image {
            self.image = Some(image.clone());
        }
        if let Some(lines) = &edit.ingredient_lines {
            self.ingredient_lines = Some(lines.clone());
        }
    }

    /// Project this recipe into its mirror document, carrying `is_favorite`
    /// as the document's flag.
    #[must_use]
    pub fn to_mirror_document(&self, is_favorite: bool) -> MirrorDocument {
        MirrorDocument {
            composite_key: self.composite_key.clone(),
            label: self.label.clone(),
            calories: self.calories,
            total_time: self.total_time,
            image: self.image.clone(),
            ingredient_lines: self.ingredient_lines.clone(),
            url: self.url.clone(),
            is_favorite,
        }
    }
}

/// Field replacements for a cached recipe. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeEdit {
    pub label: Option<String>,
    pub calories: Option<f64>,
    pub total_time: Option<f64>,
    pub image: Option<String>,
    pub ingredient_lines: Option<Vec<String>>,
}

impl RecipeEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.calories.is_none()
            && self.total_time.is_none()
            && self.image.is_none()
            && self.ingredient_lines.is_none()
    }
}

/// Flat document stored in the favorites mirror, keyed by composite key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorDocument {
    #[serde(rename = "recipe_compositeKey")]
    pub composite_key: String,
    #[serde(rename = "recipe_label")]
    pub label: Option<String>,
    #[serde(rename = "recipe_calories")]
    pub calories: Option<f64>,
    #[serde(rename = "recipe_totalTime")]
    pub total_time: Option<f64>,
    #[serde(rename = "recipe_image")]
    pub image: Option<String>,
    #[serde(rename = "recipe_ingredientLines")]
    pub ingredient_lines: Option<Vec<String>>,
    #[serde(rename = "recipe_url")]
    pub url: Option<String>,
    #[serde(rename = "isFavorite", default)]
    pub is_favorite: bool,
}

/// Health label filter offered by the search screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthFilter {
    #[default]
    All,
    Vegan,
    GlutenFree,
    LowSugar,
    Paleo,
}

impl HealthFilter {
    pub const ALL: [HealthFilter; 5] = [
        HealthFilter::All,
        HealthFilter::Vegan,
        HealthFilter::GlutenFree,
        HealthFilter::LowSugar,
        HealthFilter::Paleo,
    ];

    /// Value for the catalog's `health` query parameter; `All` sends none.
    #[must_use]
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            HealthFilter::All => None,
            HealthFilter::Vegan => Some("vegan"),
            HealthFilter::GlutenFree => Some("gluten-free"),
            HealthFilter::LowSugar => Some("low-sugar"),
            HealthFilter::Paleo => Some("paleo"),
        }
    }
}

impl fmt::Display for HealthFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_value().unwrap_or("all"))
    }
}

impl FromStr for HealthFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "all" | "" => Ok(HealthFilter::All),
            "vegan" => Ok(HealthFilter::Vegan),
            "gluten-free" | "glutenfree" => Ok(HealthFilter::GlutenFree),
            "low-sugar" | "lowsugar" => Ok(HealthFilter::LowSugar),
            "paleo" => Ok(HealthFilter::Paleo),
            _ => {
                let valid: Vec<String> = HealthFilter::ALL.iter().map(ToString::to_string).collect();
                bail!(
                    "Invalid health filter '{s}'. Must be one of: {}",
                    valid.join(", ")
                )
            }
        }
    }
}
