//! Source registry entries and their closed vocabularies.
//!
//! A [`Source`] keeps vocabulary fields as raw text, exactly as stored, so
//! the lint can report values that fall outside the vocabulary instead of
//! failing to load the row.

use serde::{Deserialize, Serialize};

use crate::policy::UsageTag;

/// Declares a closed, upper-case vocabulary with parse/format helpers.
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Exact match against the stored spelling.
            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary!(
    /// Lifecycle status of a registry entry.
    SourceStatus {
        Active => "ACTIVE",
        NeedsKey => "NEEDS_KEY",
        PendingReview => "PENDING_REVIEW",
        Inactive => "INACTIVE",
        Deprecated => "DEPRECATED",
    }
);

vocabulary!(
    /// Credibility tier, T0 most authoritative.
    Tier {
        T0 => "T0",
        T1 => "T1",
        T2 => "T2",
        T3 => "T3",
        T4 => "T4",
        Unknown => "UNKNOWN",
    }
);

vocabulary!(
    AccessType {
        Api => "API",
        Sdmx => "SDMX",
        Rss => "RSS",
        Web => "WEB",
        Pdf => "PDF",
        Csv => "CSV",
        Xlsx => "XLSX",
        Manual => "MANUAL",
        Partner => "PARTNER",
        RemoteSensing => "REMOTE_SENSING",
    }
);

vocabulary!(
    UpdateFrequency {
        Realtime => "REALTIME",
        Daily => "DAILY",
        Weekly => "WEEKLY",
        Monthly => "MONTHLY",
        Quarterly => "QUARTERLY",
        Annual => "ANNUAL",
        Irregular => "IRREGULAR",
    }
);

impl AccessType {
    /// Access types that are fed by hand and need no machine endpoint.
    pub fn is_offline(&self) -> bool {
        matches!(self, AccessType::Manual | AccessType::Partner)
    }
}

// ── Source ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    pub tier: String,
    pub access_type: String,
    pub update_frequency: String,
    /// Raw usage tags, possibly containing spellings outside the vocabulary.
    #[serde(default)]
    pub allowed_use: Vec<String>,
    #[serde(default)]
    pub endpoint_count: u32,
    #[serde(default)]
    pub needs_partnership: bool,
    #[serde(default)]
    pub partnership_contact: Option<String>,
}

impl Source {
    pub fn status(&self) -> Option<SourceStatus> {
        SourceStatus::parse(&self.status)
    }

    pub fn tier(&self) -> Option<Tier> {
        Tier::parse(&self.tier)
    }

    pub fn access_type(&self) -> Option<AccessType> {
        AccessType::parse(&self.access_type)
    }

    pub fn update_frequency(&self) -> Option<UpdateFrequency> {
        UpdateFrequency::parse(&self.update_frequency)
    }

    pub fn is_active(&self) -> bool {
        self.status() == Some(SourceStatus::Active)
    }

    /// Recognized usage tags, de-duplicated, in first-seen order.
    pub fn usage_tags(&self) -> Vec<UsageTag> {
        let mut tags = Vec::new();
        for tag in self.allowed_use.iter().filter_map(|raw| UsageTag::parse(raw)) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Tags that do not map to any known usage.
    pub fn unknown_usage_tags(&self) -> Vec<&str> {
        self.allowed_use
            .iter()
            .filter(|raw| UsageTag::parse(raw).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.source_id)
    }
}
