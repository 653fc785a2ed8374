//! Typed stage artifacts.
//!
//! The external service answers with loosely structured JSON; each stage's
//! normalized response is parsed into one [`StageOutput`] variant here, and
//! accepted outputs are folded into the session's [`Artifacts`].
//!
//! Parsing is lenient about field spellings (`pdf_url` vs `pdf_link`,
//! comma-separated vs array authors) but strict about what each stage
//! must produce: see [`Artifacts::missing`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use synthflow_utils::types::StageId;

use crate::merge::merge_unique;

/// Default confidence attached to a gap analysis that omits one.
pub const DEFAULT_CONFIDENCE_LEVEL: &str = "MEDIUM";

/// One research topic derived from the refined problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "subtopic_id")]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Topic {
    /// Build a topic from either a bare string or an object.
    ///
    /// `index` is the zero-based position in the source list and supplies
    /// the id when the object carries none.
    #[must_use]
    pub fn from_value(index: usize, value: &Value) -> Option<Self> {
        let fallback_id = index as u64 + 1;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                id: fallback_id,
                title: s.clone(),
                description: String::new(),
                keywords: vec![s.clone()],
            }),
            Value::Object(obj) => {
                let title = text(obj, &["title", "subtopic", "name"]);
                if title.trim().is_empty() {
                    return None;
                }
                Some(Self {
                    id: obj
                        .get("subtopic_id")
                        .or_else(|| obj.get("id"))
                        .and_then(Value::as_u64)
                        .unwrap_or(fallback_id),
                    title,
                    description: text(obj, &["description"]),
                    keywords: strings(obj.get("keywords")),
                })
            }
            _ => None,
        }
    }
}

/// A retrieved research paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub pdf_link: String,
    #[serde(default)]
    pub semantic_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
}

impl Paper {
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let authors = match obj.get("authors") {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            other => strings(other),
        };
        Some(Self {
            title: text(obj, &["title", "paper_title"]),
            authors,
            abstract_text: clean_abstract(&text(obj, &["abstract"])),
            pdf_link: text(obj, &["pdf_url", "pdf_link", "pdfLink"]),
            semantic_score: obj
                .get("semantic_score")
                .or_else(|| obj.get("semanticScore"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            year: obj.get("year").and_then(Value::as_i64),
        })
    }

    #[must_use]
    pub fn has_link(&self) -> bool {
        !self.pdf_link.trim().is_empty()
    }
}

/// An existing application or product addressing the problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub target_users: String,
    #[serde(default)]
    pub platform_type: String,
    #[serde(default)]
    pub official_website: String,
    #[serde(default)]
    pub documentation_link: String,
    #[serde(default)]
    pub pricing_or_license: String,
}

impl Application {
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            title: text(obj, &["title", "name"]),
            summary: text(obj, &["summary"]),
            features: strings(obj.get("features")),
            limitations: strings(obj.get("limitations")),
            target_users: text(obj, &["target_users"]),
            platform_type: text(obj, &["platform_type"]),
            official_website: text(obj, &["official_website"]),
            documentation_link: text(obj, &["documentation_link"]),
            pricing_or_license: text(obj, &["pricing_or_license"]),
        })
    }

    #[must_use]
    pub fn has_link(&self) -> bool {
        !self.official_website.trim().is_empty() || !self.documentation_link.trim().is_empty()
    }
}

/// Keys under which a repository entry carries its location.
pub const REPOSITORY_LINK_KEYS: [&str; 3] = ["url", "html_url", "link"];

/// True if a raw repository entry carries a usable link.
#[must_use]
pub fn repository_has_link(repo: &Value) -> bool {
    REPOSITORY_LINK_KEYS.iter().any(|key| {
        repo.get(*key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    })
}

/// Output of the retrieval stage, assembled from its three sub-tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub papers: Vec<Paper>,
    pub applications: Vec<Application>,
    pub application_notes: Option<String>,
    pub repositories: Vec<Value>,
}

impl Retrieval {
    /// Assemble from the sub-task payloads. A sub-task that produced
    /// nothing is passed as `None`.
    #[must_use]
    pub fn from_payloads(
        papers: Option<&Value>,
        applications: Option<&Value>,
        repositories: Option<&Value>,
    ) -> Self {
        let papers = items(papers).iter().filter_map(Paper::from_value).collect();

        let (applications, application_notes) = match applications {
            Some(Value::Array(records)) => records
                .first()
                .map(parse_application_record)
                .unwrap_or_default(),
            Some(record @ Value::Object(_)) => parse_application_record(record),
            _ => (Vec::new(), None),
        };

        let repositories = items(repositories)
            .iter()
            .filter(|v| v.is_object())
            .cloned()
            .collect();

        Self {
            papers,
            applications,
            application_notes,
            repositories,
        }
    }

    #[must_use]
    pub fn has_linked_item(&self) -> bool {
        has_linked_item(&self.papers, &self.applications, &self.repositories)
    }
}

fn parse_application_record(record: &Value) -> (Vec<Application>, Option<String>) {
    let solutions = record
        .get("solutions")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Application::from_value).collect())
        .unwrap_or_default();
    let notes = record
        .get("notes")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string);
    (solutions, notes)
}

fn has_linked_item(papers: &[Paper], applications: &[Application], repositories: &[Value]) -> bool {
    papers.iter().any(Paper::has_link)
        || applications.iter().any(Application::has_link)
        || repositories.iter().any(repository_has_link)
}

/// Output of the analysis stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub paper_analyses: Vec<Value>,
    pub repository_analyses: Vec<Value>,
}

impl Analysis {
    #[must_use]
    pub fn from_payloads(papers: Option<&Value>, repositories: Option<&Value>) -> Self {
        Self {
            paper_analyses: items(papers).to_vec(),
            repository_analyses: items(repositories).to_vec(),
        }
    }
}

/// Gap-finder output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    #[serde(default)]
    pub evidence_based_gaps: Vec<Value>,
    #[serde(default)]
    pub research_gaps_from_papers: Vec<Value>,
    #[serde(rename = "ai_predicted_possible_gaps", default)]
    pub ai_predicted_gaps: Vec<Value>,
    #[serde(default = "default_confidence")]
    pub confidence_level: String,
    #[serde(default)]
    pub note: String,
}

fn default_confidence() -> String {
    DEFAULT_CONFIDENCE_LEVEL.to_string()
}

impl GapAnalysis {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let list = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let confidence_level = value
            .get("confidence_level")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .map_or_else(default_confidence, str::to_string);
        Self {
            evidence_based_gaps: list("evidence_based_gaps"),
            research_gaps_from_papers: list("research_gaps_from_papers"),
            ai_predicted_gaps: list("ai_predicted_possible_gaps"),
            confidence_level,
            note: value
                .get("note")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    #[must_use]
    pub fn gap_count(&self) -> usize {
        self.evidence_based_gaps.len()
            + self.research_gaps_from_papers.len()
            + self.ai_predicted_gaps.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPhase {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechGroup {
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub title: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub description: String,
}

/// Final solution proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub proposed_solution: String,
    #[serde(default)]
    pub problem_understanding: String,
    #[serde(default)]
    pub architecture: Vec<String>,
    #[serde(default)]
    pub workflow: Vec<WorkflowPhase>,
    #[serde(default)]
    pub tech_stack: Vec<TechGroup>,
    #[serde(default)]
    pub scoring: Vec<Score>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub additional_information: Vec<String>,
}

impl Solution {
    /// Parse the structured solution record. Section keys follow the
    /// headings the solution workflow emits.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let objects = |key: &str| -> Vec<Map<String, Value>> {
            obj.get(key)
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(|v| v.as_object().cloned()).collect())
                .unwrap_or_default()
        };

        Self {
            proposed_solution: text(obj, &["proposed_solution"]),
            problem_understanding: text(obj, &["Problem Understanding"]),
            architecture: strings(obj.get("Solution Architecture & Approach")),
            workflow: objects("Implementation Workflow")
                .iter()
                .map(|phase| WorkflowPhase {
                    title: text(phase, &["phase_title", "title"]),
                    steps: strings(phase.get("steps")),
                })
                .collect(),
            tech_stack: objects("Recommended Tech Stack")
                .iter()
                .map(|group| TechGroup {
                    title: text(group, &["title"]),
                    items: strings(group.get("items")),
                })
                .collect(),
            scoring: objects("Scoring by Factors")
                .iter()
                .map(|score| Score {
                    title: text(score, &["title"]),
                    rating: score.get("rating").and_then(Value::as_f64).unwrap_or(0.0),
                    description: text(score, &["description"]),
                })
                .collect(),
            limitations: strings(obj.get("Limitations & Open Questions")),
            additional_information: strings(obj.get("Additional Information")),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.proposed_solution.trim().is_empty()
    }
}

/// One stage's parsed result.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Refinement {
        refined_problem: String,
        topics: Vec<Topic>,
    },
    Retrieval(Retrieval),
    Analysis(Analysis),
    GapAnalysis(GapAnalysis),
    Synthesis(Value),
    Solution(Solution),
}

impl StageOutput {
    /// Parse the normalized stage 1 record.
    #[must_use]
    pub fn refinement(record: &Value) -> Self {
        let refined_problem = record
            .as_object()
            .map(|obj| {
                text(
                    obj,
                    &["refined_problem", "refinedProblem", "refine_problem", "enhancedPrompt"],
                )
            })
            .unwrap_or_default();
        let topics = record
            .get("subtopics")
            .or_else(|| record.get("topics"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .enumerate()
                    .filter_map(|(i, v)| Topic::from_value(i, v))
                    .collect()
            })
            .unwrap_or_default();
        Self::Refinement {
            refined_problem,
            topics,
        }
    }

    #[must_use]
    pub const fn stage(&self) -> StageId {
        match self {
            Self::Refinement { .. } => StageId::Refine,
            Self::Retrieval(_) => StageId::Retrieval,
            Self::Analysis(_) => StageId::Analysis,
            Self::GapAnalysis(_) => StageId::GapFinder,
            Self::Synthesis(_) => StageId::Synthesis,
            Self::Solution(_) => StageId::Solution,
        }
    }

    /// Names the required output this result lacks, if any.
    #[must_use]
    pub fn missing(&self) -> Option<&'static str> {
        let present = match self {
            Self::Refinement {
                refined_problem,
                topics,
            } => !refined_problem.trim().is_empty() && !topics.is_empty(),
            Self::Retrieval(r) => r.has_linked_item(),
            Self::Analysis(a) => !a.paper_analyses.is_empty() || !a.repository_analyses.is_empty(),
            Self::GapAnalysis(g) => g.gap_count() > 0,
            Self::Synthesis(s) => is_substantive(s),
            Self::Solution(s) => s.is_complete(),
        };
        (!present).then(|| requirement(self.stage()))
    }
}

/// What a completed stage must have produced, phrased for error messages.
#[must_use]
pub const fn requirement(stage: StageId) -> &'static str {
    match stage {
        StageId::Refine => "the refined problem or topic list",
        StageId::Retrieval => "a linked paper, application or repository",
        StageId::Analysis => "paper or repository analysis output",
        StageId::GapFinder => "gap analysis output",
        StageId::Synthesis => "the literature synthesis",
        StageId::Solution => "the proposed solution",
    }
}

/// Everything the pipeline has produced for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_problem: Option<String>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_notes: Option<String>,
    #[serde(default)]
    pub repositories: Vec<Value>,
    #[serde(default)]
    pub paper_analyses: Vec<Value>,
    #[serde(default)]
    pub repository_analyses: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_analysis: Option<GapAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

impl Artifacts {
    /// Fold an accepted output in.
    ///
    /// Collections are merged with duplicate suppression; single-valued
    /// outputs replace what was there. A delete-retry clears the stage first,
    /// so merging into the empty collections is a plain replace.
    pub fn apply(&mut self, output: StageOutput) {
        match output {
            StageOutput::Refinement {
                refined_problem,
                topics,
            } => {
                self.refined_problem = Some(refined_problem);
                self.topics = topics;
            }
            StageOutput::Retrieval(r) => {
                merge_unique(&mut self.papers, r.papers);
                merge_unique(&mut self.applications, r.applications);
                merge_unique(&mut self.repositories, r.repositories);
                if r.application_notes.is_some() {
                    self.application_notes = r.application_notes;
                }
            }
            StageOutput::Analysis(a) => {
                merge_unique(&mut self.paper_analyses, a.paper_analyses);
                merge_unique(&mut self.repository_analyses, a.repository_analyses);
            }
            StageOutput::GapAnalysis(g) => self.gap_analysis = Some(g),
            StageOutput::Synthesis(s) => self.synthesis = Some(s),
            StageOutput::Solution(s) => self.solution = Some(s),
        }
    }

    /// Drop everything `stage` produced.
    pub fn clear(&mut self, stage: StageId) {
        match stage {
            StageId::Refine => {
                self.refined_problem = None;
                self.topics.clear();
            }
            StageId::Retrieval => {
                self.papers.clear();
                self.applications.clear();
                self.application_notes = None;
                self.repositories.clear();
            }
            StageId::Analysis => {
                self.paper_analyses.clear();
                self.repository_analyses.clear();
            }
            StageId::GapFinder => self.gap_analysis = None,
            StageId::Synthesis => self.synthesis = None,
            StageId::Solution => self.solution = None,
        }
    }

    /// True if nothing from `stage` is stored.
    #[must_use]
    pub fn is_empty_for(&self, stage: StageId) -> bool {
        match stage {
            StageId::Refine => self.refined_problem.is_none() && self.topics.is_empty(),
            StageId::Retrieval => {
                self.papers.is_empty()
                    && self.applications.is_empty()
                    && self.application_notes.is_none()
                    && self.repositories.is_empty()
            }
            StageId::Analysis => {
                self.paper_analyses.is_empty() && self.repository_analyses.is_empty()
            }
            StageId::GapFinder => self.gap_analysis.is_none(),
            StageId::Synthesis => self.synthesis.is_none(),
            StageId::Solution => self.solution.is_none(),
        }
    }

    /// Names the required output `stage` lacks, if any.
    #[must_use]
    pub fn missing(&self, stage: StageId) -> Option<&'static str> {
        let present = match stage {
            StageId::Refine => {
                self.refined_problem
                    .as_deref()
                    .is_some_and(|p| !p.trim().is_empty())
                    && !self.topics.is_empty()
            }
            StageId::Retrieval => {
                has_linked_item(&self.papers, &self.applications, &self.repositories)
            }
            StageId::Analysis => {
                !self.paper_analyses.is_empty() || !self.repository_analyses.is_empty()
            }
            StageId::GapFinder => self.gap_analysis.as_ref().is_some_and(|g| g.gap_count() > 0),
            StageId::Synthesis => self.synthesis.as_ref().is_some_and(is_substantive),
            StageId::Solution => self.solution.as_ref().is_some_and(Solution::is_complete),
        };
        (!present).then(|| requirement(stage))
    }

    /// Papers that can be sent for analysis.
    #[must_use]
    pub fn linked_papers(&self) -> Vec<&Paper> {
        self.papers.iter().filter(|p| p.has_link()).collect()
    }
}

/// Not null and not an empty string, array or object.
fn is_substantive(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Items of a list payload; a lone object counts as one item.
fn items(payload: Option<&Value>) -> &[Value] {
    match payload {
        Some(Value::Array(list)) => list,
        Some(obj @ Value::Object(_)) => std::slice::from_ref(obj),
        _ => &[],
    }
}

/// First non-empty string among `keys`.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

/// A string list from an array (non-strings are rendered as JSON) or a
/// single string.
fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Collapse runs of whitespace left over from PDF extraction.
fn clean_abstract(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topics_from_strings_and_objects() {
        let output = StageOutput::refinement(&json!({
            "refine_problem": "How can clinics triage faster?",
            "subtopics": [
                "queue modelling",
                {"subtopic": "sensor fusion", "description": "d", "keywords": ["k"]},
                {"subtopic_id": 9, "name": "named"},
                42,
                ""
            ]
        }));

        let StageOutput::Refinement {
            refined_problem,
            topics,
        } = output
        else {
            panic!("expected refinement");
        };
        assert_eq!(refined_problem, "How can clinics triage faster?");
        assert_eq!(topics.len(), 3);
        assert_eq!(
            topics[0],
            Topic {
                id: 1,
                title: "queue modelling".to_string(),
                description: String::new(),
                keywords: vec!["queue modelling".to_string()],
            }
        );
        assert_eq!(topics[1].id, 2);
        assert_eq!(topics[1].title, "sensor fusion");
        assert_eq!(topics[2].id, 9);
        assert_eq!(topics[2].title, "named");
    }

    #[test]
    fn test_topic_serializes_with_subtopic_id() {
        let topic = Topic::from_value(0, &json!("t")).unwrap();
        let value = serde_json::to_value(&topic).unwrap();
        assert_eq!(value["subtopic_id"], 1);
        assert_eq!(value["keywords"], json!(["t"]));
    }

    #[test]
    fn test_refinement_without_topics_is_missing_output() {
        let output = StageOutput::refinement(&json!({"refinedProblem": "p", "subtopics": []}));
        assert_eq!(output.missing(), Some(requirement(StageId::Refine)));
    }

    #[test]
    fn test_paper_authors_from_comma_string() {
        let paper = Paper::from_value(&json!({
            "title": "A",
            "authors": "Ada Lovelace, , Alan Turing",
            "abstract": "line one\n\n   line two",
            "pdf_url": "https://arxiv.org/pdf/1",
            "semantic_score": 0.82,
            "year": 2021
        }))
        .unwrap();

        assert_eq!(paper.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(paper.abstract_text, "line one line two");
        assert_eq!(paper.pdf_link, "https://arxiv.org/pdf/1");
        assert!((paper.semantic_score - 0.82).abs() < f64::EPSILON);
        assert_eq!(paper.year, Some(2021));
    }

    #[test]
    fn test_retrieval_with_only_applications_is_linked() {
        let retrieval = Retrieval::from_payloads(
            None,
            Some(&json!([{
                "solutions": [{"title": "Tool", "official_website": "https://tool.dev", "limitations": "one"}],
                "notes": "market is young"
            }])),
            Some(&json!([{"name": "no-link"}])),
        );

        assert!(retrieval.papers.is_empty());
        assert_eq!(retrieval.applications.len(), 1);
        assert_eq!(retrieval.applications[0].limitations, vec!["one"]);
        assert_eq!(retrieval.application_notes.as_deref(), Some("market is young"));
        assert_eq!(retrieval.repositories.len(), 1);
        assert!(retrieval.has_linked_item());
    }

    #[test]
    fn test_retrieval_without_links_is_missing_output() {
        let retrieval = Retrieval::from_payloads(
            Some(&json!([{"title": "no pdf"}])),
            None,
            Some(&json!([{"name": "r"}])),
        );
        let output = StageOutput::Retrieval(retrieval);
        assert_eq!(output.missing(), Some(requirement(StageId::Retrieval)));
    }

    #[test]
    fn test_gap_analysis_defaults_confidence() {
        let gaps = GapAnalysis::from_value(&json!({"research_gaps_from_papers": ["g1", {"gap": "g2"}]}));
        assert_eq!(gaps.confidence_level, DEFAULT_CONFIDENCE_LEVEL);
        assert_eq!(gaps.gap_count(), 2);
        assert!(StageOutput::GapAnalysis(gaps).missing().is_none());

        let none = GapAnalysis::from_value(&json!({"note": "nothing found"}));
        assert_eq!(
            StageOutput::GapAnalysis(none).missing(),
            Some(requirement(StageId::GapFinder))
        );
    }

    #[test]
    fn test_solution_sections() {
        let solution = Solution::from_value(&json!({
            "proposed_solution": "Build a triage assistant",
            "Problem Understanding": "Clinics are slow",
            "Solution Architecture & Approach": ["ingest", "rank"],
            "Implementation Workflow": [{"phase_title": "MVP", "steps": ["a", "b"]}],
            "Recommended Tech Stack": [{"title": "Backend", "items": ["Rust"]}],
            "Scoring by Factors": [{"title": "Feasibility", "rating": 8, "description": "ok"}],
            "Limitations & Open Questions": ["data access"],
        }));

        assert!(solution.is_complete());
        assert_eq!(solution.architecture, vec!["ingest", "rank"]);
        assert_eq!(solution.workflow[0].title, "MVP");
        assert_eq!(solution.workflow[0].steps.len(), 2);
        assert_eq!(solution.tech_stack[0].items, vec!["Rust"]);
        assert!((solution.scoring[0].rating - 8.0).abs() < f64::EPSILON);
        assert_eq!(solution.limitations, vec!["data access"]);
        assert!(solution.additional_information.is_empty());
    }

    #[test]
    fn test_synthesis_must_be_substantive() {
        assert!(StageOutput::Synthesis(json!({})).missing().is_some());
        assert!(StageOutput::Synthesis(json!("  ")).missing().is_some());
        assert!(StageOutput::Synthesis(json!({"summary": "s"})).missing().is_none());
    }

    #[test]
    fn test_clear_leaves_no_residue() {
        let mut artifacts = Artifacts::default();
        artifacts.apply(StageOutput::Retrieval(Retrieval::from_payloads(
            Some(&json!([{"title": "p", "pdf_url": "https://x/1.pdf"}])),
            Some(&json!({"solutions": [{"title": "a"}], "notes": "n"})),
            Some(&json!([{"url": "https://github.com/a/b"}])),
        )));
        assert!(artifacts.missing(StageId::Retrieval).is_none());

        artifacts.clear(StageId::Retrieval);
        assert!(artifacts.is_empty_for(StageId::Retrieval));
        assert_eq!(
            artifacts.missing(StageId::Retrieval),
            Some(requirement(StageId::Retrieval))
        );
    }

    #[test]
    fn test_apply_replaces_single_valued_outputs() {
        let mut artifacts = Artifacts::default();
        artifacts.apply(StageOutput::Synthesis(json!({"v": 1})));
        artifacts.apply(StageOutput::Synthesis(json!({"v": 2})));
        assert_eq!(artifacts.synthesis, Some(json!({"v": 2})));
    }
}
