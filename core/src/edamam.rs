use serde::Deserialize;

use crate::models::Recipe;

/// Response body of the Edamam recipe search (`/api/recipes/v2`).
#[derive(Debug, Deserialize)]
pub struct RecipeData {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub hits: Vec<Hit>,
    #[serde(rename = "_links", default)]
    pub links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    pub recipe: RecipePayload,
    #[serde(rename = "_links", default)]
    pub links: Option<HitLinks>,
}

#[derive(Debug, Deserialize)]
pub struct PageLinks {
    pub next: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub struct HitLinks {
    #[serde(rename = "self")]
    pub self_link: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Recipe fields as the catalog returns them. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePayload {
    pub label: Option<String>,
    pub calories: Option<f64>,
    pub total_time: Option<f64>,
    pub health_labels: Option<Vec<String>>,
    pub image: Option<String>,
    pub ingredient_lines: Option<Vec<String>>,
    pub url: Option<String>,
}

#[must_use]
pub fn payload_to_recipe(p: RecipePayload) -> Recipe {
    let mut recipe = Recipe::new(p.label, p.url);
    recipe.calories = p.calories;
    recipe.total_time = p.total_time;
    recipe.health_labels = p.health_labels;
    recipe.image = p.image;
    recipe.ingredient_lines = p.ingredient_lines;
    recipe
}

impl RecipeData {
    #[must_use]
    pub fn into_recipes(self) -> Vec<Recipe> {
        self.hits
            .into_iter()
            .map(|hit| payload_to_recipe(hit.recipe))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "from": 1,
        "to": 2,
        "count": 7000,
        "_links": {
            "next": { "href": "https://api.edamam.com/api/recipes/v2?page=2", "title": "Next page" }
        },
        "hits": [
            {
                "recipe": {
                    "label": "Chicken Soup",
                    "image": "https://img/1.jpg",
                    "url": "http://x/1",
                    "healthLabels": ["Dairy-Free", "Gluten-Free"],
                    "ingredientLines": ["1 chicken", "2 carrots"],
                    "calories": 1234.5,
                    "totalTime": 90.0,
                    "cuisineType": ["american"]
                },
                "_links": { "self": { "href": "https://api.edamam.com/api/recipes/v2/abc", "title": "Self" } }
            },
            {
                "recipe": { "label": "Mystery" }
            }
        ]
    }"#;

    #[test]
    fn test_parse_search_response() {
        let data: RecipeData = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(data.count, 7000);
        assert_eq!(data.hits.len(), 2);
        let next = data.links.as_ref().and_then(|l| l.next.as_ref()).unwrap();
        assert!(next.href.ends_with("page=2"));
        let self_link = data.hits[0]
            .links
            .as_ref()
            .and_then(|l| l.self_link.as_ref())
            .unwrap();
        assert_eq!(self_link.title.as_deref(), Some("Self"));
    }

    #[test]
    fn test_into_recipes_complete() {
        let data: RecipeData = serde_json::from_str(SAMPLE).unwrap();
        let recipes = data.into_recipes();
        let soup = &recipes[0];
        assert_eq!(soup.composite_key(), "Chicken Soup_155258120");
        assert_eq!(soup.calories, Some(1234.5));
        assert_eq!(soup.total_time, Some(90.0));
        assert_eq!(soup.health_labels.as_ref().unwrap().len(), 2);
        assert_eq!(soup.ingredient_lines.as_ref().unwrap()[1], "2 carrots");
        assert!(!soup.is_favorite);
    }

    #[test]
    fn test_into_recipes_partial_payload() {
        let data: RecipeData = serde_json::from_str(SAMPLE).unwrap();
        let recipes = data.into_recipes();
        let mystery = &recipes[1];
        assert_eq!(mystery.composite_key(), "Mystery_null");
        assert!(mystery.url.is_none());
        assert!(mystery.calories.is_none());
        assert!(mystery.ingredient_lines.is_none());
    }

    #[test]
    fn test_empty_response() {
        let data: RecipeData = serde_json::from_str(r#"{"count": 0, "hits": []}"#).unwrap();
        assert!(data.into_recipes().is_empty());
    }
}
