//! Configuration file loading.
//!
//! TOML is the documented format; YAML, JSON, and INI are accepted for
//! operators embedding the gateway in an existing config tree.
use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Result, WrapErr, eyre};

use crate::config::models::ServerConfig;

/// Resolve the file format from the path extension (case-insensitive).
/// Unrecognized or missing extensions fall back to TOML.
fn format_for(path: &Path) -> FileFormat {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "yaml" | "yml" => FileFormat::Yaml,
        "json" => FileFormat::Json,
        "ini" => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}

/// Read and deserialize a gateway configuration file.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Synchronous variant for callers outside the runtime (CLI validation).
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let path = Path::new(config_path);
    let source = path
        .to_str()
        .ok_or_else(|| eyre!("config path is not valid UTF-8: {}", path.display()))?;

    Config::builder()
        .add_source(File::new(source, format_for(path)))
        .build()
        .and_then(|settings| settings.try_deserialize::<ServerConfig>())
        .wrap_err_with(|| format!("could not read gateway config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn extension_resolution_ignores_case() {
        assert!(matches!(format_for(Path::new("warren.TOML")), FileFormat::Toml));
        assert!(matches!(format_for(Path::new("warren.Yml")), FileFormat::Yaml));
        assert!(matches!(format_for(Path::new("warren.JSON")), FileFormat::Json));
        assert!(matches!(format_for(Path::new("warren")), FileFormat::Toml));
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"

[dispatch]
buffered_timeout_secs = 120

[recorder]
retention_days = 7
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.dispatch.buffered_timeout_secs, 120);
        assert_eq!(config.recorder.retention_days, 7);
        // Untouched sections keep their defaults.
        assert_eq!(config.inspector.default_limit, 50);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen_addr": "127.0.0.1:3000",
  "inspector": {
    "path_prefix": "/_inspect",
    "default_limit": 25
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.inspector.path_prefix, "/_inspect");
        assert_eq!(config.inspector.default_limit, 25);
    }

    #[tokio::test]
    async fn unreadable_file_reports_the_path() {
        let err = load_config("/definitely/not/here/warren.toml")
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("/definitely/not/here/warren.toml"));
    }
}
