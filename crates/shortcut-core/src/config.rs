use crate::builder::DataFlow;
use crate::document::{DocumentMetadata, Icon, DEFAULT_CLIENT_VERSION, DEFAULT_GLYPH};
use crate::error::{Result, ShortcutError};
use crate::flows::{FlowSettings, Variant};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `api_key`.
pub const API_KEY_ENV: &str = "SAVE_VIDEO_API_KEY";

pub const DEFAULT_API_URL: &str = "https://cobalt-production-97bf.up.railway.app/";
pub const DEFAULT_SIGNING_URL: &str = "https://hubsign.routinehub.services/sign";
pub const DEFAULT_INSTALL_BASE_URL: &str =
    "https://github.com/chrisb4096-alt/cobalt-downloader/raw/master/";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// VariantConfig
// ---------------------------------------------------------------------------

/// Display name (also the file stem) and icon color of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    pub color: i64,
}

impl VariantConfig {
    fn defaults_for(variant: Variant) -> Self {
        Self {
            name: variant.default_name().to_string(),
            color: variant.default_color(),
        }
    }
}

fn default_main() -> VariantConfig {
    VariantConfig::defaults_for(Variant::Main)
}

fn default_debug() -> VariantConfig {
    VariantConfig::defaults_for(Variant::Debug)
}

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_signing_url")]
    pub signing_url: String,
    #[serde(default = "default_sign_timeout")]
    pub sign_timeout_secs: u64,
    /// Relative paths are taken from the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Where signed documents are published; `null` disables the install
    /// hints.
    #[serde(default = "default_install_base_url")]
    pub install_base_url: Option<String>,
    #[serde(default)]
    pub data_flow: DataFlow,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_icon_glyph")]
    pub icon_glyph: i64,
    #[serde(default = "default_main")]
    pub main: VariantConfig,
    #[serde(default = "default_debug")]
    pub debug: VariantConfig,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_signing_url() -> String {
    DEFAULT_SIGNING_URL.to_string()
}

fn default_sign_timeout() -> u64 {
    30
}

fn default_install_base_url() -> Option<String> {
    Some(DEFAULT_INSTALL_BASE_URL.to_string())
}

fn default_client_version() -> String {
    DEFAULT_CLIENT_VERSION.to_string()
}

fn default_icon_glyph() -> i64 {
    DEFAULT_GLYPH
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            signing_url: default_signing_url(),
            sign_timeout_secs: default_sign_timeout(),
            output_dir: None,
            install_base_url: default_install_base_url(),
            data_flow: DataFlow::default(),
            client_version: default_client_version(),
            icon_glyph: default_icon_glyph(),
            main: default_main(),
            debug: default_debug(),
        }
    }
}

impl GeneratorConfig {
    /// Load `<root>/shortcut.yaml`; a missing file means all defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: GeneratorConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// The API key from the environment, falling back to the file.
    pub fn api_key(&self) -> Result<String> {
        self.api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with(&self, env: Option<String>) -> Result<String> {
        env.filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or(ShortcutError::MissingApiKey)
    }

    pub fn settings(&self) -> Result<FlowSettings> {
        Ok(FlowSettings {
            api_url: self.api_url.clone(),
            api_key: self.api_key()?,
            data_flow: self.data_flow,
        })
    }

    pub fn variant(&self, variant: Variant) -> &VariantConfig {
        match variant {
            Variant::Main => &self.main,
            Variant::Debug => &self.debug,
        }
    }

    pub fn metadata(&self, variant: Variant) -> DocumentMetadata {
        DocumentMetadata {
            client_version: self.client_version.clone(),
            icon: Icon {
                glyph: self.icon_glyph,
                start_color: self.variant(variant).color,
            },
            ..DocumentMetadata::default()
        }
    }

    pub fn output_dir(&self, root: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if matches!(&self.api_key, Some(k) if k.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api_key is set but empty".to_string(),
            });
        }

        for (field, url) in [("api_url", &self.api_url), ("signing_url", &self.signing_url)] {
            if !url.starts_with("https://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{field} '{url}' is not an https URL"),
                });
            }
        }

        if self.sign_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "sign_timeout_secs must be greater than zero".to_string(),
            });
        }

        for variant in Variant::all() {
            let name = &self.variant(variant).name;
            if name.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{variant}.name must not be empty"),
                });
            }
            // The name becomes the multipart filename and a path component.
            if name.contains(['"', '\r', '\n', '/']) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "{variant}.name {name:?} must not contain quotes, line breaks or '/'"
                    ),
                });
            }
        }
        if self.main.name == self.debug.name {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "main and debug share the name '{}'; one would overwrite the other",
                    self.main.name
                ),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = GeneratorConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.sign_timeout_secs, 30);
        assert_eq!(cfg.main.name, "Save Video");
        assert_eq!(cfg.debug.color, 4282601983);
        assert_eq!(cfg.data_flow, DataFlow::Explicit);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "api_url: https://api.local/\ndata_flow: implicit\ndebug:\n  name: Dbg\n  color: 1\n";
        let cfg: GeneratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.api_url, "https://api.local/");
        assert_eq!(cfg.data_flow, DataFlow::Implicit);
        assert_eq!(cfg.debug.name, "Dbg");
        assert_eq!(cfg.main.name, "Save Video");
        assert_eq!(cfg.install_base_url.as_deref(), Some(DEFAULT_INSTALL_BASE_URL));
    }

    #[test]
    fn null_install_base_disables_links() {
        let cfg: GeneratorConfig = serde_yaml::from_str("install_base_url: null\n").unwrap();
        assert!(cfg.install_base_url.is_none());
    }

    #[test]
    fn env_key_wins_over_file() {
        let cfg = GeneratorConfig {
            api_key: Some("from-file".into()),
            ..GeneratorConfig::default()
        };
        assert_eq!(cfg.api_key_with(Some("from-env".into())).unwrap(), "from-env");
        assert_eq!(cfg.api_key_with(None).unwrap(), "from-file");
        assert_eq!(cfg.api_key_with(Some("  ".into())).unwrap(), "from-file");
    }

    #[test]
    fn missing_key_is_an_error() {
        let cfg = GeneratorConfig::default();
        assert!(matches!(
            cfg.api_key_with(None),
            Err(ShortcutError::MissingApiKey)
        ));
    }

    #[test]
    fn metadata_uses_variant_color() {
        let cfg = GeneratorConfig::default();
        assert_eq!(cfg.metadata(Variant::Main).icon.start_color, 463140863);
        assert_eq!(cfg.metadata(Variant::Debug).icon.start_color, 4282601983);
        assert_eq!(cfg.metadata(Variant::Debug).client_version, "2612.0.15");
    }

    #[test]
    fn output_dir_resolves_against_root() {
        let root = Path::new("/proj");
        let mut cfg = GeneratorConfig::default();
        assert_eq!(cfg.output_dir(root), PathBuf::from("/proj"));
        cfg.output_dir = Some(PathBuf::from("dist"));
        assert_eq!(cfg.output_dir(root), PathBuf::from("/proj/dist"));
        cfg.output_dir = Some(PathBuf::from("/abs"));
        assert_eq!(cfg.output_dir(root), PathBuf::from("/abs"));
    }

    #[test]
    fn validate_default_config_is_clean() {
        assert!(GeneratorConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_problems() {
        let mut cfg = GeneratorConfig::default();
        cfg.api_url = "http://plain/".into();
        cfg.sign_timeout_secs = 0;
        cfg.debug.name = cfg.main.name.clone();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("api_url")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("sign_timeout_secs")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("overwrite")));
    }

    #[test]
    fn validate_rejects_names_that_break_the_upload_header() {
        for bad in ["Save \"Video\"", "Save\r\nVideo", "a/b"] {
            let mut cfg = GeneratorConfig::default();
            cfg.main.name = bad.to_string();
            let warnings = cfg.validate();
            assert!(
                warnings
                    .iter()
                    .any(|w| w.level == WarnLevel::Error && w.message.contains("main.name")),
                "{bad:?} accepted"
            );
        }
    }
}
