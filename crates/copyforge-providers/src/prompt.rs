//! Platform-specific prompt shaping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Social platform a post is written for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Short post, at most 280 characters.
    Twitter,
    /// Caption with emoji and hashtags.
    Instagram,
    /// Professional post.
    Linkedin,
    /// No platform constraints.
    #[default]
    Generic,
}

impl Platform {
    /// Get the platform name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
            Self::Linkedin => "linkedin",
            Self::Generic => "generic",
        }
    }

    const fn guidance(self) -> &'static str {
        match self {
            Self::Twitter => {
                "Write a single tweet of at most 280 characters. Be punchy and \
                 end with one or two relevant hashtags."
            }
            Self::Instagram => {
                "Write an Instagram caption. Open with a hook, keep it upbeat, \
                 use a few emoji and finish with up to five hashtags."
            }
            Self::Linkedin => {
                "Write a LinkedIn post in a professional, insightful tone. Use \
                 short paragraphs and close with a question that invites discussion."
            }
            Self::Generic => "Write an engaging social media post.",
        }
    }

    /// Build the full prompt for a post about `idea`.
    #[must_use]
    pub fn prompt(self, idea: &str) -> String {
        format!(
            "{}\n\nTopic: {}\n\nReply with the post text only.",
            self.guidance(),
            idea.trim()
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized platform names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Self::Twitter),
            "instagram" => Ok(Self::Instagram),
            "linkedin" => Ok(Self::Linkedin),
            "generic" | "" => Ok(Self::Generic),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}
