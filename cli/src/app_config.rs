//! Process configuration for `kvevents run`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use kvevents_fleet::FleetConfig;
use kvevents_observability::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub fleet: FleetConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = kvevents_fleet::load_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?;
        config
            .fleet
            .validate()
            .with_context(|| format!("invalid fleet in '{}'", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log:
  level: debug
  components:
    kvevents-stream: trace
fleet:
  endpoints:
    - name: vllm-0
      address: 10.0.0.7
      port: 5557
      model_name: llama-3-8b
    - name: vllm-1
      address: "fd00::12"
      port: 5557
      lora_id: 3
  client:
    reconnect_delay_ms: 250
"#;

    #[test]
    fn parses_log_and_fleet_sections() {
        let config: AppConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.components["kvevents-stream"], "trace");
        assert_eq!(config.fleet.endpoints.len(), 2);
        assert_eq!(config.fleet.endpoints[1].lora_id, Some(3));
        assert_eq!(config.fleet.client.reconnect_delay_ms, 250);
        assert_eq!(config.fleet.client.poll_timeout_ms, 100);
    }

    #[test]
    fn log_section_is_optional() {
        let config: AppConfig =
            serde_yaml::from_str("fleet:\n  endpoints: []\n").unwrap();
        assert_eq!(config.log, LogConfig::default());
        assert!(config.fleet.endpoints.is_empty());
    }

    #[test]
    fn load_rejects_duplicate_endpoints() {
        let dir = std::env::temp_dir().join(format!("kvevents-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dup.yaml");
        std::fs::write(
            &path,
            "fleet:\n  endpoints:\n    - {name: a, address: h, port: 1}\n    - {name: a, address: h, port: 2}\n",
        )
        .unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
