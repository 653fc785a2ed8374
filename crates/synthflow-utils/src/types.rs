use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one of the six sequential stages of the research pipeline.
///
/// Stages are numbered 1 through 6 on the wire and in human-readable
/// messages; this enum is the typed form used inside the engine.
///
/// # Serialization
///
/// `StageId` serializes to its stage number (e.g. `1`, `6`) so that API
/// bodies such as `{"stage": 3}` deserialize directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StageId {
    /// Refines the raw problem statement and breaks it into topics.
    Refine,
    /// Retrieves papers, applications and code repositories concurrently.
    Retrieval,
    /// Analyzes the retrieved papers and repositories in chunks.
    Analysis,
    /// Finds gaps across the analyzed material.
    GapFinder,
    /// Produces the literature synthesis.
    Synthesis,
    /// Generates the final solution, gated on the client's expected outcome.
    Solution,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 6] = [
        Self::Refine,
        Self::Retrieval,
        Self::Analysis,
        Self::GapFinder,
        Self::Synthesis,
        Self::Solution,
    ];

    /// Returns the 1-based stage number.
    ///
    /// ```rust
    /// use synthflow_utils::types::StageId;
    ///
    /// assert_eq!(StageId::Refine.number(), 1);
    /// assert_eq!(StageId::Solution.number(), 6);
    /// ```
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::Refine => 1,
            Self::Retrieval => 2,
            Self::Analysis => 3,
            Self::GapFinder => 4,
            Self::Synthesis => 5,
            Self::Solution => 6,
        }
    }

    /// Looks up a stage by its 1-based number.
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Refine),
            2 => Some(Self::Retrieval),
            3 => Some(Self::Analysis),
            4 => Some(Self::GapFinder),
            5 => Some(Self::Synthesis),
            6 => Some(Self::Solution),
            _ => None,
        }
    }

    /// Canonical lowercase name used in logs and config keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::Retrieval => "retrieval",
            Self::Analysis => "analysis",
            Self::GapFinder => "gap_finder",
            Self::Synthesis => "synthesis",
            Self::Solution => "solution",
        }
    }

    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    #[must_use]
    pub const fn previous(&self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage {}", self.number())
    }
}

impl TryFrom<u8> for StageId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(value).ok_or_else(|| format!("stage must be between 1 and 6, got {value}"))
    }
}

impl From<StageId> for u8 {
    fn from(stage: StageId) -> Self {
        stage.number()
    }
}

/// Status of a single stage record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    /// True once the stage has been dispatched at least once.
    #[must_use]
    pub const fn has_started(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Overall lifecycle status of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Initialized,
    Processing,
    Completed,
    Failed,
}

/// One outbound call the gateway knows how to make.
///
/// Stages 2 and 3 fan out into several calls; every other stage maps to
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayCall {
    Refine,
    Papers,
    Applications,
    Repositories,
    PaperAnalysis,
    RepositoryAnalysis,
    GapFinder,
    Synthesis,
    Solution,
}

impl GatewayCall {
    pub const ALL: [Self; 9] = [
        Self::Refine,
        Self::Papers,
        Self::Applications,
        Self::Repositories,
        Self::PaperAnalysis,
        Self::RepositoryAnalysis,
        Self::GapFinder,
        Self::Synthesis,
        Self::Solution,
    ];

    /// The stage this call belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageId {
        match self {
            Self::Refine => StageId::Refine,
            Self::Papers | Self::Applications | Self::Repositories => StageId::Retrieval,
            Self::PaperAnalysis | Self::RepositoryAnalysis => StageId::Analysis,
            Self::GapFinder => StageId::GapFinder,
            Self::Synthesis => StageId::Synthesis,
            Self::Solution => StageId::Solution,
        }
    }

    /// Key used in `[gateway.endpoints]` and as the environment variable stem.
    #[must_use]
    pub const fn config_key(&self) -> &'static str {
        match self {
            Self::Refine => "stage1",
            Self::Papers => "stage2_papers",
            Self::Applications => "stage2_applications",
            Self::Repositories => "stage2_repositories",
            Self::PaperAnalysis => "stage3_papers",
            Self::RepositoryAnalysis => "stage3_repositories",
            Self::GapFinder => "stage4",
            Self::Synthesis => "stage5",
            Self::Solution => "stage6",
        }
    }

    /// Environment variable that overrides the endpoint for this call.
    ///
    /// ```rust
    /// use synthflow_utils::types::GatewayCall;
    ///
    /// assert_eq!(GatewayCall::Papers.env_var(), "SYNTHFLOW_STAGE2_PAPERS_URL");
    /// ```
    #[must_use]
    pub fn env_var(&self) -> String {
        format!("SYNTHFLOW_{}_URL", self.config_key().to_ascii_uppercase())
    }

    /// Action tag carried in the outbound request body.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Refine => "enhance_prompt",
            Self::Papers => "process_research",
            Self::Applications => "process_applications",
            Self::Repositories => "process_repositories",
            Self::PaperAnalysis => "analyze_research_papers",
            Self::RepositoryAnalysis => "analyze_repositories",
            Self::GapFinder => "gap_finder",
            Self::Synthesis => "literature_review",
            Self::Solution => "generate_solution",
        }
    }

    /// Human-readable label used in error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Refine => "Stage 1 refinement",
            Self::Papers => "Stage 2 paper retrieval",
            Self::Applications => "Stage 2 application retrieval",
            Self::Repositories => "Stage 2 repository retrieval",
            Self::PaperAnalysis => "Stage 3 paper analysis",
            Self::RepositoryAnalysis => "Stage 3 repository analysis",
            Self::GapFinder => "Stage 4 gap finder",
            Self::Synthesis => "Stage 5 literature synthesis",
            Self::Solution => "Stage 6 solution",
        }
    }
}

impl fmt::Display for GatewayCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source of a configuration value.
///
/// Tracks where each effective value came from, used when the server
/// reports its effective configuration at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value read from a `SYNTHFLOW_*` environment variable.
    Env,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}

/// Counts whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
