//! Markdown export of a finished research session.
//!
//! The layout follows the pipeline: problem, refinement, retrieval,
//! analysis, gaps, synthesis, then the expected outcome and the proposed
//! solution. Long free text is truncated the same way for every entry.

use serde_json::Value;

use synthflow_session::artifacts::{Application, GapAnalysis, Paper, Solution};
use synthflow_session::Session;

const ABSTRACT_LIMIT: usize = 300;
const DESCRIPTION_LIMIT: usize = 250;
const MAX_LISTED_AUTHORS: usize = 3;

/// Attachment name for a session's report.
#[must_use]
pub fn report_file_name(session_id: &str) -> String {
    format!("research-report-{}.md", short_id(session_id))
}

/// Render the full report.
#[must_use]
pub fn render_markdown(session: &Session) -> String {
    let mut doc = Doc::default();
    let artifacts = &session.artifacts;

    doc.heading(1, "Research Analysis Report");
    doc.line(&format!("Session: `{}`", short_id(&session.id)));
    doc.line(&format!("Generated: {}", session.updated_at.format("%Y-%m-%d %H:%M UTC")));
    doc.blank();
    doc.heading(2, "Problem Statement");
    doc.paragraph(&session.original_input);

    doc.heading(2, "Stage 1: Problem Refinement");
    if let Some(refined) = &artifacts.refined_problem {
        doc.paragraph(refined);
    }
    if !artifacts.topics.is_empty() {
        doc.heading(3, &format!("Research Subtopics ({})", artifacts.topics.len()));
        for (i, topic) in artifacts.topics.iter().enumerate() {
            doc.line(&format!("{}. **{}**", i + 1, topic.title));
            if !topic.description.is_empty() {
                doc.line(&format!("   {}", topic.description));
            }
        }
        doc.blank();
    }

    doc.heading(2, "Stage 2: Retrieval");
    papers(&mut doc, &artifacts.papers);
    repositories(&mut doc, &artifacts.repositories);
    applications(&mut doc, &artifacts.applications, artifacts.application_notes.as_deref());

    doc.heading(2, "Stage 3: Analysis");
    analyses(&mut doc, "Research Paper Analysis", &artifacts.paper_analyses);
    analyses(&mut doc, "Repository Analysis", &artifacts.repository_analyses);

    doc.heading(2, "Stage 4: Research Gaps");
    match &artifacts.gap_analysis {
        Some(gaps) => gap_sections(&mut doc, gaps),
        None => doc.paragraph("_No gap analysis available._"),
    }

    doc.heading(2, "Stage 5: Literature Synthesis");
    match &artifacts.synthesis {
        Some(synthesis) => doc.paragraph(&plain_text(synthesis)),
        None => doc.paragraph("_No synthesis available._"),
    }

    doc.heading(2, "Expected Outcome");
    doc.paragraph(session.expected_outcome.as_deref().unwrap_or("_Not provided._"));

    doc.heading(2, "Stage 6: Proposed Solution");
    if let Some(solution) = &artifacts.solution {
        solution_sections(&mut doc, solution);
    }

    doc.finish()
}

fn papers(doc: &mut Doc, papers: &[Paper]) {
    doc.heading(3, &format!("Academic Papers ({})", papers.len()));
    if papers.is_empty() {
        doc.paragraph("_No papers found._");
        return;
    }
    for (i, paper) in papers.iter().enumerate() {
        doc.line(&format!("{}. **{}**", i + 1, or_untitled(&paper.title)));
        if !paper.authors.is_empty() {
            let mut authors = paper
                .authors
                .iter()
                .take(MAX_LISTED_AUTHORS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if paper.authors.len() > MAX_LISTED_AUTHORS {
                authors.push_str(" et al.");
            }
            doc.line(&format!("   - Authors: {authors}"));
        }
        if let Some(year) = paper.year {
            doc.line(&format!("   - Year: {year}"));
        }
        if paper.semantic_score > 0.0 {
            doc.line(&format!("   - Relevance: {:.0}%", paper.semantic_score * 100.0));
        }
        if paper.has_link() {
            doc.line(&format!("   - PDF: <{}>", paper.pdf_link));
        }
        if !paper.abstract_text.is_empty() {
            doc.line(&format!("   - {}", truncate(&paper.abstract_text, ABSTRACT_LIMIT)));
        }
    }
    doc.blank();
}

fn repositories(doc: &mut Doc, repositories: &[Value]) {
    doc.heading(3, &format!("Repositories ({})", repositories.len()));
    if repositories.is_empty() {
        doc.paragraph("_No repositories found._");
        return;
    }
    for (i, repo) in repositories.iter().enumerate() {
        let name = field(repo, &["full_name", "name", "title"]).unwrap_or("Untitled Project");
        doc.line(&format!("{}. **{name}**", i + 1));
        if let Some(url) = field(repo, &["html_url", "url", "link"]) {
            doc.line(&format!("   - URL: <{url}>"));
        }
        if let Some(language) = field(repo, &["language"]) {
            doc.line(&format!("   - Language: {language}"));
        }
        if let Some(description) = field(repo, &["description"]) {
            doc.line(&format!("   - {}", truncate(description, DESCRIPTION_LIMIT)));
        }
    }
    doc.blank();
}

fn applications(doc: &mut Doc, applications: &[Application], notes: Option<&str>) {
    doc.heading(3, &format!("Existing Applications ({})", applications.len()));
    if applications.is_empty() {
        doc.paragraph("_No applications found._");
    }
    for (i, app) in applications.iter().enumerate() {
        doc.line(&format!("{}. **{}**", i + 1, or_untitled(&app.title)));
        if !app.summary.is_empty() {
            doc.line(&format!("   - {}", app.summary));
        }
        if !app.features.is_empty() {
            doc.line(&format!("   - Features: {}", app.features.join("; ")));
        }
        if !app.limitations.is_empty() {
            doc.line(&format!("   - Limitations: {}", app.limitations.join("; ")));
        }
        if !app.official_website.is_empty() {
            doc.line(&format!("   - Website: <{}>", app.official_website));
        }
        if !app.pricing_or_license.is_empty() {
            doc.line(&format!("   - Pricing/License: {}", app.pricing_or_license));
        }
    }
    if let Some(notes) = notes {
        doc.blank();
        doc.line(&format!("> {notes}"));
    }
    doc.blank();
}

fn analyses(doc: &mut Doc, title: &str, entries: &[Value]) {
    doc.heading(3, &format!("{title} ({})", entries.len()));
    if entries.is_empty() {
        doc.paragraph("_No analysis available._");
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        let name = field(entry, &["title", "paper_title", "full_name", "name"]).unwrap_or("Untitled");
        doc.line(&format!("{}. **{name}**", i + 1));
        if let Some(summary) = field(entry, &["summary", "analysis", "description"]) {
            doc.line(&format!("   - {}", truncate(summary, ABSTRACT_LIMIT)));
        }
    }
    doc.blank();
}

fn gap_sections(doc: &mut Doc, gaps: &GapAnalysis) {
    doc.line(&format!("Confidence: **{}**", gaps.confidence_level));
    doc.blank();
    for (title, list) in [
        ("Evidence-Based Gaps", &gaps.evidence_based_gaps),
        ("Gaps from Papers", &gaps.research_gaps_from_papers),
        ("Predicted Gaps", &gaps.ai_predicted_gaps),
    ] {
        if list.is_empty() {
            continue;
        }
        doc.heading(3, title);
        for gap in list {
            doc.bullet(&plain_text(gap));
        }
        doc.blank();
    }
    if !gaps.note.is_empty() {
        doc.paragraph(&format!("_{}_", gaps.note));
    }
}

fn solution_sections(doc: &mut Doc, solution: &Solution) {
    doc.paragraph(&format!("**{}**", solution.proposed_solution));
    if !solution.problem_understanding.is_empty() {
        doc.heading(3, "Problem Understanding");
        doc.paragraph(&solution.problem_understanding);
    }
    bullets(doc, "Architecture & Approach", &solution.architecture);
    if !solution.workflow.is_empty() {
        doc.heading(3, "Implementation Workflow");
        for (i, phase) in solution.workflow.iter().enumerate() {
            doc.line(&format!("{}. **{}**", i + 1, phase.title));
            for step in &phase.steps {
                doc.line(&format!("   - {step}"));
            }
        }
        doc.blank();
    }
    if !solution.tech_stack.is_empty() {
        doc.heading(3, "Recommended Tech Stack");
        for group in &solution.tech_stack {
            doc.bullet(&format!("**{}**: {}", group.title, group.items.join(", ")));
        }
        doc.blank();
    }
    if !solution.scoring.is_empty() {
        doc.heading(3, "Scoring");
        doc.line("| Factor | Rating | Notes |");
        doc.line("|---|---|---|");
        for score in &solution.scoring {
            doc.line(&format!(
                "| {} | {} | {} |",
                score.title,
                score.rating,
                score.description.replace('|', "/")
            ));
        }
        doc.blank();
    }
    bullets(doc, "Limitations & Open Questions", &solution.limitations);
    bullets(doc, "Additional Information", &solution.additional_information);
}

fn bullets(doc: &mut Doc, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    doc.heading(3, title);
    for item in items {
        doc.bullet(item);
    }
    doc.blank();
}

/// First non-blank string under `keys`.
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Strings as-is, objects by their most descriptive field, anything else as
/// compact JSON.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join("\n\n"),
        Value::Object(_) => field(
            value,
            &["literature_review", "synthesis", "summary", "gap", "description", "title"],
        )
        .map_or_else(|| value.to_string(), str::to_string),
        other => other.to_string(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn or_untitled(title: &str) -> &str {
    if title.trim().is_empty() { "Untitled" } else { title }
}

#[derive(Default)]
struct Doc {
    out: String,
}

impl Doc {
    fn heading(&mut self, level: usize, text: &str) {
        self.out.push_str(&"#".repeat(level));
        self.out.push(' ');
        self.out.push_str(text);
        self.out.push_str("\n\n");
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn bullet(&mut self, text: &str) {
        self.line(&format!("- {text}"));
    }

    fn paragraph(&mut self, text: &str) {
        self.line(text.trim());
        self.blank();
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        let mut out = self.out;
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('\n');
        out
    }
}
