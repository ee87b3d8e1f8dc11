use std::path::PathBuf;

/// Process-level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub base_dir: PathBuf,
    pub bundled_dir: PathBuf,
    pub config_path: PathBuf,
    pub exit_delay_ms: u64,
    pub platform: String,
    pub http_addr: String,
    pub account: String,
}

impl ShellSettings {
    pub fn from_env() -> Self {
        let base_dir = PathBuf::from(
            std::env::var("BOTSHELL_BASE_DIR").unwrap_or_else(|_| "./data".to_string()),
        );
        Self {
            bundled_dir: std::env::var("BOTSHELL_BUNDLED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_bundled_dir()),
            config_path: std::env::var("BOTSHELL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| base_dir.join("config.json")),
            exit_delay_ms: std::env::var("BOTSHELL_EXIT_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(2000),
            platform: std::env::var("BOTSHELL_PLATFORM").unwrap_or_else(|_| "botshell".to_string()),
            http_addr: std::env::var("BOTSHELL_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:5500".to_string()),
            account: std::env::var("BOTSHELL_ACCOUNT").unwrap_or_else(|_| "local".to_string()),
            base_dir,
        }
    }

    pub fn engines_dir(&self) -> PathBuf {
        self.base_dir.join("engines")
    }
}

fn default_bundled_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engines_dir_is_under_base() {
        let settings = ShellSettings {
            base_dir: PathBuf::from("/srv/shell"),
            bundled_dir: PathBuf::from("/opt/shell"),
            config_path: PathBuf::from("/srv/shell/config.json"),
            exit_delay_ms: 0,
            platform: "test".to_string(),
            http_addr: "127.0.0.1:0".to_string(),
            account: "local".to_string(),
        };
        assert_eq!(settings.engines_dir(), PathBuf::from("/srv/shell/engines"));
    }
}
