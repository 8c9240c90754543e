//! Prompt text for every text-generation call the pipeline makes.
//!
//! The system prompts are routing keys for the scripted generator in tests,
//! so each one opens with a distinct first line.

use std::fmt::Write as _;

use lexroute_core::{
  chat::ChatMessage,
  draft::ReportDraft,
  evidence::SourceDocument,
  profile::CompanyProfile,
  validation::{IssueCategory, ValidationRecord},
};

pub(crate) const GENERATOR_SYSTEM: &str = "\
You write regulatory compliance reports for a road logistics company.
Report only on legal and regulatory changes relevant to the company's routes, \
fleet and cargo. Cite a source_url only when it appears in the supplied sources. \
If no sources are supplied, say \"No current sources found\" in the key takeaways \
and leave every source_url null.

Reply with one JSON object and nothing else:
{
  \"summary\": {\"total_changes\": <int>, \"overall_risk\": \"low|medium|high|critical\", \"key_takeaways\": [<string>]},
  \"legal_changes\": [{\"title\": <string>, \"description\": <string>, \"effective_date\": \"YYYY-MM-DD\" | null,
    \"affected_countries\": [<ISO alpha-2>], \"risk_level\": \"low|medium|high|critical\", \"source_url\": <string> | null}],
  \"route_impacts\": [{\"route_name\": <string>, \"impact_description\": <string>,
    \"risk_level\": \"low|medium|high|critical\", \"recommended_actions\": [<string>]}],
  \"recommended_actions\": [{\"priority\": \"low|medium|high|critical\", \"action\": <string>, \"deadline\": \"YYYY-MM-DD\" | null}]
}";

pub(crate) const VALIDATOR_SYSTEM: &str = "\
You review compliance reports for a road logistics company.
Judge completeness, specificity and internal consistency. Generic advice that \
could apply to any company is a specificity problem. Risk levels in the summary \
must agree with the itemised changes.

Reply with one JSON object and nothing else:
{\"is_approved\": <bool>, \"quality_score\": <0-100>, \"feedback\": <string>,
 \"issues\": [{\"category\": \"completeness|specificity|consistency|sourcing|relevance|formatting\",
   \"severity\": \"minor|major|blocking\", \"description\": <string>}]}";

pub(crate) const CHAT_SYSTEM: &str = "\
You answer questions about one compliance report.
Use only the numbered passages supplied. Cite passages by their bracketed number. \
If the passages do not contain the answer, say so plainly.";

pub(crate) const SUGGEST_SYSTEM: &str = "\
You propose follow-up questions about a compliance report.
Reply with a JSON array of at most five short questions and nothing else.";

/// Instruction the generator receives for each issue category raised in the
/// previous iteration.
pub(crate) fn remediation_hint(category: IssueCategory) -> &'static str {
  match category {
    IssueCategory::Completeness => "Populate every section, or state explicitly that it is empty.",
    IssueCategory::Specificity => {
      "Replace generic statements with concrete regulations, dates and countries."
    }
    IssueCategory::Consistency => {
      "Make total_changes and overall_risk agree with the itemised legal changes."
    }
    IssueCategory::Sourcing => "Cite only URLs from the supplied sources, or none.",
    IssueCategory::Relevance => "Drop items that do not touch this company's routes, fleet or cargo.",
    IssueCategory::Formatting => "Use YYYY-MM-DD for every date.",
    IssueCategory::StageFailure => "Return exactly one JSON object matching the schema.",
    IssueCategory::Other => "Address the reviewer's note.",
  }
}

pub(crate) fn generation_prompt(
  profile: &CompanyProfile,
  evidence: &[SourceDocument],
  feedback: Option<&ValidationRecord>,
) -> String {
  let mut out = String::new();
  let profile_json = serde_json::to_string_pretty(profile).unwrap_or_default();
  let _ = writeln!(out, "Company profile:\n{profile_json}\n");

  if evidence.is_empty() {
    let _ = writeln!(out, "Sources: none. No current sources found for this company.\n");
  } else {
    let _ = writeln!(out, "Sources:");
    for (i, doc) in evidence.iter().enumerate() {
      let date = doc.published_date.as_deref().unwrap_or("undated");
      let _ = writeln!(
        out,
        "[{}] {} ({date})\n    url: {}\n    {}",
        i + 1,
        doc.title,
        doc.url,
        doc.snippet
      );
    }
    out.push('\n');
  }

  if let Some(record) = feedback {
    let _ = writeln!(
      out,
      "The previous draft scored {}/100 and was rejected. Reviewer feedback:\n{}\n",
      record.quality_score, record.feedback_text
    );
    if !record.issues.is_empty() {
      let _ = writeln!(out, "Fix every issue below:");
      for issue in &record.issues {
        let _ = writeln!(
          out,
          "- [{} / {}] {} -> {}",
          issue.category,
          issue.severity,
          issue.description,
          remediation_hint(issue.category)
        );
      }
      out.push('\n');
    }
  }

  out.push_str("Write the report now.");
  out
}

pub(crate) fn validation_prompt(draft: &ReportDraft, evidence: &[SourceDocument]) -> String {
  let draft_json = serde_json::to_string_pretty(draft).unwrap_or_default();
  let mut out = format!("Report draft:\n{draft_json}\n\nSources available to the writer:\n");
  if evidence.is_empty() {
    out.push_str("(none)\n");
  }
  for doc in evidence {
    let _ = writeln!(out, "- {} <{}>", doc.title, doc.url);
  }
  out.push_str("\nReview the draft.");
  out
}

/// A retrieved passage as presented to the chat model.
pub(crate) struct PromptPassage<'a> {
  pub origin: &'a str,
  pub text:   &'a str,
}

pub(crate) fn chat_prompt(
  company: &str,
  passages: &[PromptPassage<'_>],
  history: &[ChatMessage],
  question: &str,
) -> String {
  let mut out = format!("Report for {company}.\n\nPassages:\n");
  if passages.is_empty() {
    out.push_str("(none)\n");
  }
  for (i, p) in passages.iter().enumerate() {
    let _ = writeln!(out, "[{}] ({})\n{}\n", i + 1, p.origin, p.text.trim());
  }
  if !history.is_empty() {
    out.push_str("Conversation so far:\n");
    for m in history {
      let _ = writeln!(out, "{}: {}", m.role.to_string().to_uppercase(), m.content);
    }
    out.push('\n');
  }
  let _ = write!(out, "Question: {question}");
  out
}

pub(crate) fn suggestion_prompt(company: &str, takeaways: &[String]) -> String {
  let mut out = format!("Key takeaways of the report for {company}:\n");
  for t in takeaways {
    let _ = writeln!(out, "- {t}");
  }
  out.push_str("\nSuggest follow-up questions.");
  out
}
