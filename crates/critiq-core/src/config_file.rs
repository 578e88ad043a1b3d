use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub model: Option<ModelConfig>,
    pub authorities: Option<AuthoritiesConfig>,
    pub analysis: Option<AnalysisFileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub openai_api_key: Option<String>,
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthoritiesConfig {
    pub disabled: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisFileConfig {
    pub personas: Option<Vec<String>>,
    pub max_section_chars: Option<usize>,
    pub critique_temperature: Option<f32>,
    pub suggest_supplementary: Option<bool>,
}

/// Platform config directory path: `<config_dir>/critiq/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("critiq").join("config.toml"))
}

/// Load config by cascading CWD `.critiq.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".critiq.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            openai_api_key: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.openai_api_key.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.openai_api_key.clone())),
            s2_api_key: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.s2_api_key.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.s2_api_key.clone())),
            crossref_mailto: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.crossref_mailto.clone())
                .or_else(|| {
                    base.api_keys
                        .as_ref()
                        .and_then(|a| a.crossref_mailto.clone())
                }),
        }),
        model: Some(ModelConfig {
            name: overlay
                .model
                .as_ref()
                .and_then(|m| m.name.clone())
                .or_else(|| base.model.as_ref().and_then(|m| m.name.clone())),
            base_url: overlay
                .model
                .as_ref()
                .and_then(|m| m.base_url.clone())
                .or_else(|| base.model.as_ref().and_then(|m| m.base_url.clone())),
            timeout_secs: overlay
                .model
                .as_ref()
                .and_then(|m| m.timeout_secs)
                .or_else(|| base.model.as_ref().and_then(|m| m.timeout_secs)),
        }),
        authorities: Some(AuthoritiesConfig {
            disabled: overlay
                .authorities
                .as_ref()
                .and_then(|a| a.disabled.clone())
                .or_else(|| base.authorities.as_ref().and_then(|a| a.disabled.clone())),
            timeout_secs: overlay
                .authorities
                .as_ref()
                .and_then(|a| a.timeout_secs)
                .or_else(|| base.authorities.as_ref().and_then(|a| a.timeout_secs)),
            max_candidates: overlay
                .authorities
                .as_ref()
                .and_then(|a| a.max_candidates)
                .or_else(|| base.authorities.as_ref().and_then(|a| a.max_candidates)),
        }),
        analysis: Some(AnalysisFileConfig {
            personas: overlay
                .analysis
                .as_ref()
                .and_then(|a| a.personas.clone())
                .or_else(|| base.analysis.as_ref().and_then(|a| a.personas.clone())),
            max_section_chars: overlay
                .analysis
                .as_ref()
                .and_then(|a| a.max_section_chars)
                .or_else(|| base.analysis.as_ref().and_then(|a| a.max_section_chars)),
            critique_temperature: overlay
                .analysis
                .as_ref()
                .and_then(|a| a.critique_temperature)
                .or_else(|| {
                    base.analysis
                        .as_ref()
                        .and_then(|a| a.critique_temperature)
                }),
            suggest_supplementary: overlay
                .analysis
                .as_ref()
                .and_then(|a| a.suggest_supplementary)
                .or_else(|| {
                    base.analysis
                        .as_ref()
                        .and_then(|a| a.suggest_supplementary)
                }),
        }),
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}
