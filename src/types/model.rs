use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a Gemini model identifier.
///
/// This can be a predefined model version or a custom string value
/// for models that may be added in the future.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier (for future models or tuned models)
    Custom(String),
}

/// Known Gemini model versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Gemini 2.5 Pro
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,

    /// Gemini 2.5 Flash
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,

    /// Gemini 2.0 Flash
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,

    /// Gemini 2.0 Flash-Lite
    #[serde(rename = "gemini-2.0-flash-lite")]
    Gemini20FlashLite,

    /// Gemini 1.5 Pro
    #[serde(rename = "gemini-1.5-pro")]
    Gemini15Pro,

    /// Gemini 1.5 Flash
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,
}

impl KnownModel {
    const ALL: [KnownModel; 6] = [
        KnownModel::Gemini25Pro,
        KnownModel::Gemini25Flash,
        KnownModel::Gemini20Flash,
        KnownModel::Gemini20FlashLite,
        KnownModel::Gemini15Pro,
        KnownModel::Gemini15Flash,
    ];

    /// The API identifier of this model.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gemini25Pro => "gemini-2.5-pro",
            KnownModel::Gemini25Flash => "gemini-2.5-flash",
            KnownModel::Gemini20Flash => "gemini-2.0-flash",
            KnownModel::Gemini20FlashLite => "gemini-2.0-flash-lite",
            KnownModel::Gemini15Pro => "gemini-1.5-pro",
            KnownModel::Gemini15Flash => "gemini-1.5-flash",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gemini20Flash)
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<&str> for Model {
    /// Accepts both `gemini-2.0-flash` and the resource form `models/gemini-2.0-flash`.
    fn from(model: &str) -> Self {
        let model = model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        KnownModel::ALL
            .into_iter()
            .find(|known| known.as_str() == model)
            .map(Model::Known)
            .unwrap_or_else(|| Model::Custom(model.to_string()))
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::from(model.as_str())
    }
}

impl FromStr for Model {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Model::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_serialization() {
        let model = Model::Known(KnownModel::Gemini20Flash);
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#""gemini-2.0-flash""#);
    }

    #[test]
    fn custom_model_serialization() {
        let model = Model::Custom("gemini-exp-1206".to_string());
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#""gemini-exp-1206""#);
    }

    #[test]
    fn model_deserialization() {
        let model: Model = serde_json::from_str(r#""gemini-1.5-pro""#).unwrap();
        assert_eq!(model, Model::Known(KnownModel::Gemini15Pro));

        let model: Model = serde_json::from_str(r#""tunedModels/mine""#).unwrap();
        assert_eq!(model, Model::Custom("tunedModels/mine".to_string()));
    }

    #[test]
    fn parse_strips_resource_prefix() {
        let model: Model = "models/gemini-2.5-flash".parse().unwrap();
        assert_eq!(model, Model::Known(KnownModel::Gemini25Flash));
        assert_eq!(model.to_string(), "gemini-2.5-flash");
    }

    #[test]
    fn default_is_flash() {
        assert_eq!(Model::default().to_string(), "gemini-2.0-flash");
    }
}
