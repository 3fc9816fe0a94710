//! Versioned knowledge base (economic timeline + stakeholder directory).
//!
//! Loaded from YAML and handed to whatever needs narrative context. Nothing
//! in the workspace reads it from a global.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub version: String,
    /// Date the content was last reviewed, free-form (e.g. "2026-01-10").
    #[serde(default)]
    pub as_of: Option<String>,
    #[serde(default)]
    pub timeline: Vec<TimelinePeriod>,
    #[serde(default)]
    pub stakeholders: Vec<Stakeholder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePeriod {
    pub key: String,
    pub period: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
    #[serde(default)]
    pub economic_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub year: i32,
    #[serde(default)]
    pub month: Option<String>,
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Stakeholder {
    fn mentioned_in(&self, lowered: &str) -> bool {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .any(|n| !n.is_empty() && lowered.contains(&n.to_lowercase()))
    }
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw).map_err(|e| match e {
            ConfigError::Yaml { message, .. } => ConfigError::Yaml {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let kb: KnowledgeBase = serde_yaml::from_str(raw).map_err(|e| ConfigError::Yaml {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        if kb.version.trim().is_empty() {
            return Err(ConfigError::Invalid("knowledge base version is empty".into()));
        }
        Ok(kb)
    }

    pub fn events_for_year(&self, year: i32) -> Vec<&TimelineEvent> {
        self.timeline
            .iter()
            .flat_map(|p| p.events.iter())
            .filter(|e| e.year == year)
            .collect()
    }

    /// Background lines relevant to `text`: events for any year it mentions
    /// and stakeholders it names.
    pub fn context_for(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut lines = Vec::new();

        let mut years: Vec<i32> = text
            .split(|c: char| !c.is_ascii_digit())
            .filter(|t| t.len() == 4)
            .filter_map(|t| t.parse().ok())
            .filter(|y| (1990..=2100).contains(y))
            .collect();
        years.sort_unstable();
        years.dedup();
        for year in years {
            for e in self.events_for_year(year) {
                match &e.month {
                    Some(m) => lines.push(format!("{} {}: {}", m, e.year, e.event)),
                    None => lines.push(format!("{}: {}", e.year, e.event)),
                }
            }
        }

        for s in self.stakeholders.iter().filter(|s| s.mentioned_in(&lowered)) {
            let mut line = s.name.clone();
            if let Some(role) = &s.role {
                line.push_str(&format!(", {}", role));
            }
            if let Some(org) = &s.organization {
                line.push_str(&format!(" ({})", org));
            }
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
version: "2026.01"
as_of: "2026-01-10"
timeline:
  - key: dual_authority
    period: "2017-2019"
    events:
      - year: 2018
        month: December
        event: Stockholm Agreement on Hodeidah port signed
      - year: 2019
        event: Riyadh Agreement between IRG and STC
stakeholders:
  - id: cby-aden
    name: Central Bank of Yemen - Aden
    aliases: ["CBY Aden"]
    role: monetary authority
"#;

    #[test]
    fn loads_versioned_fixture() {
        let kb = KnowledgeBase::from_yaml(FIXTURE).unwrap();
        assert_eq!(kb.version, "2026.01");
        assert_eq!(kb.events_for_year(2018).len(), 1);
        assert!(kb.events_for_year(2030).is_empty());
    }

    #[test]
    fn empty_version_is_rejected() {
        let err = KnowledgeBase::from_yaml("version: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn context_picks_years_and_stakeholders() {
        let kb = KnowledgeBase::from_yaml(FIXTURE).unwrap();
        let ctx = kb.context_for("In 2018 the CBY Aden rate moved sharply.");
        assert_eq!(ctx.len(), 2);
        assert!(ctx[0].starts_with("December 2018"));
        assert!(ctx[1].contains("monetary authority"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.yaml");
        std::fs::write(&path, FIXTURE).unwrap();
        let kb = KnowledgeBase::load(&path).unwrap();
        assert_eq!(kb.stakeholders.len(), 1);
    }
}
