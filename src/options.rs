//! Add-on options loaded from the Home Assistant options file.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ConfigError;

/// Fixed defaults for values the add-on options may omit.
#[derive(Debug, Clone, Copy)]
pub struct OptionsDefaults {
    pub container_name: &'static str,
    pub container_image: &'static str,
    pub container_tag: &'static str,
    /// Host directory backing the agent's persistent run directory.
    pub run_directory: &'static str,
}

/// Defaults applied when loading options.
pub const DEFAULTS: OptionsDefaults = OptionsDefaults {
    container_name: "dd-agent",
    container_image: "public.ecr.aws/datadog/agent",
    container_tag: "7",
    run_directory: "/mnt/data/datadog-agent/run",
};

/// Feature toggles from the options file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub logging_enabled: bool,
    pub process_collection_enabled: bool,
    pub apm_enabled: bool,
    pub network_performance_monitoring_enabled: bool,
}

/// Immutable snapshot of the add-on options.
///
/// Shared read-only with every feature hook for the lifetime of the run.
#[derive(Debug)]
pub struct Options {
    api_key: SecretString,
    pub site: String,
    pub features: FeatureToggles,
    pub container_name: String,
    pub container_image: String,
    pub container_tag: String,
    pub run_directory: String,
}

/// On-disk shape of the options file.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawOptions {
    api_key: String,
    site: String,
    features: FeatureToggles,
    container_name: String,
    container_image: String,
    container_tag: String,
    run_directory: String,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            site: String::new(),
            features: FeatureToggles::default(),
            container_name: DEFAULTS.container_name.to_string(),
            container_image: DEFAULTS.container_image.to_string(),
            container_tag: DEFAULTS.container_tag.to_string(),
            run_directory: DEFAULTS.run_directory.to_string(),
        }
    }
}

impl TryFrom<RawOptions> for Options {
    type Error = ConfigError;

    fn try_from(raw: RawOptions) -> Result<Self, ConfigError> {
        for (key, value) in [
            ("container_name", &raw.container_name),
            ("container_image", &raw.container_image),
            ("container_tag", &raw.container_tag),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(Self {
            api_key: SecretString::from(raw.api_key),
            site: raw.site,
            features: raw.features,
            container_name: raw.container_name,
            container_image: raw.container_image,
            container_tag: raw.container_tag,
            run_directory: raw.run_directory,
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            site: String::new(),
            features: FeatureToggles::default(),
            container_name: DEFAULTS.container_name.to_string(),
            container_image: DEFAULTS.container_image.to_string(),
            container_tag: DEFAULTS.container_tag.to_string(),
            run_directory: DEFAULTS.run_directory.to_string(),
        }
    }
}

impl Options {
    /// Load options from a JSON file, filling in defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawOptions =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let options = Self::try_from(raw)?;

        tracing::debug!(
            path = %path.display(),
            image = %options.image_ref(),
            features = ?options.features,
            "loaded add-on options"
        );
        Ok(options)
    }

    /// Parse options from a JSON document, with the same defaults and
    /// checks as [`load`](Self::load).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions = serde_json::from_str(json).map_err(ConfigError::Json)?;
        Self::try_from(raw)
    }

    /// Build options with the given credentials and toggles, defaults elsewhere.
    pub fn new(api_key: impl Into<String>, site: impl Into<String>, features: FeatureToggles) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            site: site.into(),
            features,
            ..Self::default()
        }
    }

    /// The Datadog API key (exposes the secret).
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Full image reference, `image:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.container_image, self.container_tag)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "api_key": "abc123",
                "site": "datadoghq.com",
                "features": {{
                    "logging_enabled": true,
                    "process_collection_enabled": true,
                    "apm_enabled": false
                }}
            }}"#
        )
        .unwrap();

        let options = Options::load(file.path()).unwrap();

        assert_eq!(options.api_key(), "abc123");
        assert_eq!(options.site, "datadoghq.com");
        assert_eq!(
            options.features,
            FeatureToggles {
                logging_enabled: true,
                process_collection_enabled: true,
                apm_enabled: false,
                network_performance_monitoring_enabled: false,
            }
        );
        assert_eq!(options.container_name, DEFAULTS.container_name);
        assert_eq!(options.container_image, DEFAULTS.container_image);
        assert_eq!(options.container_tag, DEFAULTS.container_tag);
        assert_eq!(options.run_directory, DEFAULTS.run_directory);
        assert_eq!(options.image_ref(), "public.ecr.aws/datadog/agent:7");
    }

    #[test]
    fn test_load_overrides_container_fields() {
        let options = Options::from_json(
            r#"{"container_name": "agent", "container_image": "datadog/agent", "container_tag": "7.50.0"}"#,
        )
        .unwrap();

        assert_eq!(options.container_name, "agent");
        assert_eq!(options.image_ref(), "datadog/agent:7.50.0");
        assert_eq!(options.features, FeatureToggles::default());
        assert_eq!(options.api_key(), "");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Options::load(Path::new("/nonexistent/options.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Options::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_rejects_empty_container_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"container_name": ""}}"#).unwrap();

        let err = Options::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_json_rejects_empty_container_fields() {
        for key in ["container_name", "container_image", "container_tag"] {
            let err = Options::from_json(&format!(r#"{{"{key}": ""}}"#)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn test_from_json_malformed() {
        let err = Options::from_json("[1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_default_matches_empty_document() {
        let parsed = Options::from_json("{}").unwrap();
        let default = Options::default();

        assert_eq!(parsed.container_name, default.container_name);
        assert_eq!(parsed.image_ref(), default.image_ref());
        assert_eq!(parsed.run_directory, default.run_directory);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let options = Options::new("super-secret", "datadoghq.eu", FeatureToggles::default());
        assert!(!format!("{:?}", options).contains("super-secret"));
    }
}
