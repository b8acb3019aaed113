//! Agent configuration loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fsmon_engine::WatchTarget;
use serde::Deserialize;

fn default_report_interval() -> u64 {
    60
}

/// Top-level agent configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between metric reports.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Emit snapshots as JSON objects instead of metric lines.
    #[serde(default)]
    pub json: bool,

    /// Directory trees to watch.
    pub targets: Vec<TargetConfig>,
}

/// One watched directory tree.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Name under which this target's metrics are reported.
    pub name: String,

    /// Absolute base directory to watch.
    pub base_dir: PathBuf,

    /// Include globs, relative to `base_dir`. Empty matches everything
    /// not excluded.
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude globs, relative to `base_dir`. Exclude wins.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl AgentConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse and validate configuration text.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("config lists no targets");
        }

        for target in &self.targets {
            if target.name.is_empty() {
                bail!("target with empty name");
            }
            if !target.base_dir.is_absolute() {
                bail!(
                    "target {}: base_dir {} must be absolute",
                    target.name,
                    target.base_dir.display()
                );
            }
        }

        let mut names: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.targets.len() {
            bail!("duplicate target names in config");
        }

        Ok(())
    }

    /// Reporting cadence.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl TargetConfig {
    /// Engine-side view of this target.
    pub fn to_watch_target(&self) -> WatchTarget {
        let mut target = WatchTarget::new(&self.base_dir);
        for pattern in &self.include {
            target = target.include(pattern);
        }
        for pattern in &self.exclude {
            target = target.exclude(pattern);
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = AgentConfig::parse(
            r#"
report_interval_secs: 30
targets:
  - name: app-logs
    base_dir: /var/log/app
    include: ["**/*.log"]
    exclude: ["archive/**"]
  - name: spool
    base_dir: /var/spool
"#,
        )
        .unwrap();

        assert_eq!(config.report_interval(), Duration::from_secs(30));
        assert!(!config.json);
        assert_eq!(config.targets.len(), 2);

        let target = config.targets[0].to_watch_target();
        assert_eq!(target.base_dir, PathBuf::from("/var/log/app"));
        assert_eq!(target.include, vec!["**/*.log".to_string()]);
        assert_eq!(target.exclude, vec!["archive/**".to_string()]);

        // rules default to empty
        assert!(config.targets[1].include.is_empty());
        assert!(config.targets[1].exclude.is_empty());
    }

    #[test]
    fn test_report_interval_defaults() {
        let config = AgentConfig::parse(
            r#"
targets:
  - name: spool
    base_dir: /var/spool
"#,
        )
        .unwrap();

        assert_eq!(config.report_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_empty_target_list() {
        assert!(AgentConfig::parse("targets: []").is_err());
    }

    #[test]
    fn test_rejects_relative_base_dir() {
        let result = AgentConfig::parse(
            r#"
targets:
  - name: spool
    base_dir: var/spool
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let result = AgentConfig::parse(
            r#"
targets:
  - name: spool
    base_dir: /var/spool
  - name: spool
    base_dir: /var/spool2
"#,
        );
        assert!(result.is_err());
    }
}
