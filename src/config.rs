use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExternalResourceMode {
    /// Resolve external references through the embedded-image visitor.
    Allow,
    /// Skip external references silently.
    #[default]
    Ignore,
    /// Record a diagnostic for every external reference and skip it.
    Throw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub text_as_geometry: bool,
    pub optimize_path: bool,
    /// When set, groups carry name/class metadata from the id and class
    /// visitors.
    pub include_runtime_metadata: bool,
    /// BCP 47 language tag used by `systemLanguage` switch predicates.
    pub culture: String,
    pub default_font_name: String,
    pub ensure_viewbox_position: bool,
    pub ensure_viewbox_size: bool,
    pub ignore_root_viewbox: bool,
    pub external_resources: ExternalResourceMode,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            text_as_geometry: false,
            optimize_path: true,
            include_runtime_metadata: true,
            culture: "en".to_string(),
            default_font_name: "Arial".to_string(),
            ensure_viewbox_position: true,
            ensure_viewbox_size: true,
            ignore_root_viewbox: false,
            external_resources: ExternalResourceMode::Ignore,
        }
    }
}

impl RenderOptions {
    /// Primary language subtag of the configured culture, lowercased.
    pub fn primary_language(&self) -> String {
        self.culture
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase()
    }
}

pub fn load_options(path: Option<&Path>) -> anyhow::Result<RenderOptions> {
    let Some(path) = path else {
        return Ok(RenderOptions::default());
    };
    let contents = std::fs::read_to_string(path)?;
    let options: RenderOptions = serde_json::from_str(&contents)?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_through_json() {
        let mut options = RenderOptions::default();
        options.optimize_path = false;
        options.culture = "de-DE".to_string();
        let json = serde_json::to_string(&options).unwrap();
        let back: RenderOptions = serde_json::from_str(&json).unwrap();
        assert!(!back.optimize_path);
        assert_eq!(back.primary_language(), "de");
    }

    #[test]
    fn partial_json_uses_defaults() {
        let back: RenderOptions = serde_json::from_str(r#"{"ignore_root_viewbox":true}"#).unwrap();
        assert!(back.ignore_root_viewbox);
        assert!(back.optimize_path);
        assert_eq!(back.default_font_name, "Arial");
    }
}
