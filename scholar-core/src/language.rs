//! Output language selection and the few user-visible strings the core emits.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Language the insight is written in and user-facing errors are shown in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Short language code used on the wire (`en`, `zh`).
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }

    /// Name used inside model prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Zh => "Chinese (Simplified)",
        }
    }

    /// The single error string shown as the whole insight when synthesis fails.
    pub fn insight_failed_message(&self) -> &'static str {
        match self {
            Language::En => "Failed to generate research insights",
            Language::Zh => "无法生成研究洞察",
        }
    }

    /// Inline marker shown in place of a summary that could not be generated.
    pub fn summary_failed_marker(&self) -> &'static str {
        match self {
            Language::En => "Could not summarize this paper",
            Language::Zh => "生成摘要时出错",
        }
    }

    /// Marker shown for papers that have no abstract to summarize.
    pub fn no_abstract_marker(&self) -> &'static str {
        match self {
            Language::En => "No abstract available",
            Language::Zh => "暂无摘要",
        }
    }

    /// Visible marker for a citation whose id matches no known paper.
    pub fn citation_error_marker(&self) -> &'static str {
        match self {
            Language::En => "[citation error]",
            Language::Zh => "[引用错误]",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "zh-cn" | "chinese" => Ok(Language::Zh),
            other => Err(format!("unsupported language '{other}' (expected en or zh)")),
        }
    }
}
