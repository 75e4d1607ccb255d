use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 指定 PowerShell 可执行文件（默认自动探测 pwsh / powershell）
    #[serde(default)]
    pub shell: Option<String>,
    /// 单条命令的超时秒数（默认不限制）
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// 搜索结果缓存条数
    #[serde(default = "default_search_cache_size")]
    pub search_cache_size: usize,
}

fn default_search_cache_size() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            timeout_secs: None,
            search_cache_size: default_search_cache_size(),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        let config_path = PathBuf::from(home).join(".config/shaozi/config.toml");

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.shell.is_none());
        assert!(config.timeout_secs.is_none());
        assert_eq!(config.search_cache_size, 5);
    }

    #[test]
    fn parses_full_config() {
        let config: Config =
            toml::from_str("shell = \"pwsh\"\ntimeout_secs = 120\nsearch_cache_size = 3\n")
                .unwrap();
        assert_eq!(config.shell.as_deref(), Some("pwsh"));
        assert_eq!(config.timeout_secs, Some(120));
        assert_eq!(config.search_cache_size, 3);
    }
}
