//! The structured report content produced by one generation iteration.
//!
//! Each iteration yields a fresh, immutable [`ReportDraft`]; the orchestrator
//! keeps the one it retains as the report's `current_draft`.

use serde::{Deserialize, Serialize};

/// Statement a draft must carry when it was written without any evidence.
pub const NO_SOURCES_NOTICE: &str =
  "No current sources found; this assessment is based on the company profile alone.";

// ─── Risk ────────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
  Critical,
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
  pub total_changes:  usize,
  pub overall_risk:   RiskLevel,
  #[serde(default)]
  pub key_takeaways:  Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalChange {
  pub title:              String,
  pub description:        String,
  /// `YYYY-MM-DD` when known.
  #[serde(default)]
  pub effective_date:     Option<String>,
  #[serde(default)]
  pub affected_countries: Vec<String>,
  pub risk_level:         RiskLevel,
  #[serde(default)]
  pub source_url:         Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteImpact {
  pub route_name:          String,
  pub impact_description:  String,
  pub risk_level:          RiskLevel,
  #[serde(default)]
  pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
  pub priority: RiskLevel,
  pub action:   String,
  #[serde(default)]
  pub deadline: Option<String>,
}

// ─── Draft ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
  pub summary:             ReportSummary,
  #[serde(default)]
  pub legal_changes:       Vec<LegalChange>,
  #[serde(default)]
  pub route_impacts:       Vec<RouteImpact>,
  #[serde(default)]
  pub recommended_actions: Vec<RecommendedAction>,
}

impl ReportDraft {
  /// Highest risk level among itemised changes and route impacts.
  pub fn highest_item_risk(&self) -> Option<RiskLevel> {
    self
      .legal_changes
      .iter()
      .map(|c| c.risk_level)
      .chain(self.route_impacts.iter().map(|r| r.risk_level))
      .max()
  }

  /// Every source URL cited by a legal change.
  pub fn cited_urls(&self) -> impl Iterator<Item = &str> {
    self.legal_changes.iter().filter_map(|c| c.source_url.as_deref())
  }

  pub fn states_no_sources(&self) -> bool {
    self
      .summary
      .key_takeaways
      .iter()
      .any(|t| t.to_ascii_lowercase().contains("no current sources found"))
  }

  /// Normalise a draft written without evidence: drop any cited URLs (there
  /// is nothing they could legitimately point at) and make sure the summary
  /// says so.
  pub fn without_sources(mut self) -> Self {
    for change in &mut self.legal_changes {
      change.source_url = None;
    }
    if !self.states_no_sources() {
      self.summary.key_takeaways.insert(0, NO_SOURCES_NOTICE.to_string());
    }
    self
  }

  /// Concatenated summary and section text, as stored in the semantic index.
  pub fn embeddable_text(&self, company_name: &str) -> String {
    let mut out = format!(
      "Compliance report for {company_name}. Overall risk: {}. {} legal changes.\n",
      self.summary.overall_risk, self.summary.total_changes
    );
    for t in &self.summary.key_takeaways {
      out.push_str(t);
      out.push('\n');
    }
    for c in &self.legal_changes {
      out.push_str(&format!(
        "{} ({}; {}): {}\n",
        c.title,
        c.risk_level,
        c.affected_countries.join(", "),
        c.description
      ));
    }
    for r in &self.route_impacts {
      out.push_str(&format!(
        "Route {} ({}): {}\n",
        r.route_name, r.risk_level, r.impact_description
      ));
    }
    for a in &self.recommended_actions {
      out.push_str(&format!("Action ({}): {}\n", a.priority, a.action));
    }
    out
  }
}
