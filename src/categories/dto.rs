use serde::Deserialize;

/// Body for creating or renaming a category.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: String,
}
