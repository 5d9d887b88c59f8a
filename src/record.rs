use serde::{de::DeserializeOwned, Deserialize, Deserializer};

pub const DEFAULT_BRAND: &str = "CompGen";

/// The subset of a model file the index cares about. Every key is optional
/// and a value of the wrong type counts as absent; unknown keys (LED
/// mappings etc.) are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModelRecord {
    /// Defaults to the file name without `.json`.
    #[serde(default, deserialize_with = "lenient")]
    pub product_name: Option<String>,
    /// Defaults to 0.
    #[serde(default, deserialize_with = "lenient")]
    pub led_count: Option<u64>,
    /// Defaults to 0.
    #[serde(default, deserialize_with = "lenient")]
    pub width: Option<u64>,
    /// Defaults to 0.
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<u64>,
    /// Defaults to `CompGen`.
    #[serde(default, deserialize_with = "lenient")]
    pub brand: Option<String>,
    /// Base64 image, optionally with a `data:...;base64,` header.
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<String>,
    /// Absolute URL of an image.
    #[serde(default, deserialize_with = "lenient")]
    pub image_url: Option<String>,
}

/// Reads any JSON value and keeps it only if it has the expected type.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(de)?;
    Ok(T::deserialize(value).ok())
}

/// Where a record's preview comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Embedded(&'a str),
    Remote(&'a str),
    None,
}

impl ModelRecord {
    /// A non-empty `Image` wins over `ImageUrl`.
    pub fn image_source(&self) -> ImageSource<'_> {
        if let Some(img) = non_empty(&self.image) {
            ImageSource::Embedded(img)
        } else if let Some(url) = non_empty(&self.image_url) {
            ImageSource::Remote(url)
        } else {
            ImageSource::None
        }
    }

    pub fn title(&self, file_name: &str) -> String {
        self.product_name.clone().unwrap_or_else(|| stem(file_name))
    }

    pub fn brand(&self) -> &str {
        self.brand.as_deref().unwrap_or(DEFAULT_BRAND)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

pub fn stem(file_name: &str) -> String {
    file_name.replace(".json", "")
}
