//! External evidence consumed by the generator.
//!
//! A [`SourceDocument`] is produced once by the evidence gateway and is only
//! ever referenced afterwards. Its canonical URL is the deduplication key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
  pub url:            String,
  pub title:          String,
  pub snippet:        String,
  /// Publication date as reported by the search backend, if any.
  #[serde(default)]
  pub published_date: Option<String>,
  pub retrieved_at:   DateTime<Utc>,
}

impl SourceDocument {
  pub fn canonical_url(&self) -> String { canonicalize_url(&self.url) }

  /// Text stored in the semantic index for this document.
  pub fn embeddable_text(&self) -> String {
    format!("{}\n{}", self.title.trim(), self.snippet.trim())
  }
}

/// Summary of the evidence-gathering step, stored on the report.
///
/// `sources` retains the documents themselves so index entries can always be
/// rebuilt from the record store alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
  pub total_sources:      usize,
  pub queries_used:       Vec<String>,
  pub failed_queries:     usize,
  pub evidence_available: bool,
  #[serde(default)]
  pub sources:            Vec<SourceDocument>,
}

impl SearchMetadata {
  pub fn new(queries: Vec<String>, failed: usize, sources: Vec<SourceDocument>) -> Self {
    Self {
      total_sources: sources.len(),
      queries_used: queries,
      failed_queries: failed,
      evidence_available: !sources.is_empty(),
      sources,
    }
  }
}

/// Normalise a URL for deduplication.
///
/// Lowercases scheme and host, treats `http` as `https`, strips a leading
/// `www.`, the fragment, `utm_*` tracking parameters and any trailing slash.
/// Inputs that do not look like absolute URLs are only trimmed.
pub fn canonicalize_url(raw: &str) -> String {
  let raw = raw.trim();
  let Some((scheme, rest)) = raw.split_once("://") else {
    return raw.to_string();
  };
  let scheme = match scheme.to_ascii_lowercase().as_str() {
    "http" => "https".to_string(),
    other => other.to_string(),
  };

  let rest = rest.split('#').next().unwrap_or_default();
  let (before_query, query) = match rest.split_once('?') {
    Some((b, q)) => (b, Some(q)),
    None => (rest, None),
  };
  let (host, path) = match before_query.find('/') {
    Some(i) => before_query.split_at(i),
    None => (before_query, ""),
  };
  let host = host.to_ascii_lowercase();
  let host = host.strip_prefix("www.").unwrap_or(&host);
  let path = path.trim_end_matches('/');

  let params: Vec<&str> = query
    .into_iter()
    .flat_map(|q| q.split('&'))
    .filter(|p| !p.is_empty() && !p.to_ascii_lowercase().starts_with("utm_"))
    .collect();

  let mut out = format!("{scheme}://{host}{path}");
  if !params.is_empty() {
    out.push('?');
    out.push_str(&params.join("&"));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_form_ignores_cosmetic_differences() {
    let a = canonicalize_url("http://WWW.Example.eu/rules/?utm_source=x#top");
    let b = canonicalize_url("https://example.eu/rules");
    assert_eq!(a, b);
  }

  #[test]
  fn meaningful_query_parameters_survive() {
    assert_eq!(
      canonicalize_url("https://eur-lex.europa.eu/doc?uri=CELEX:32020R1054&utm_medium=rss"),
      "https://eur-lex.europa.eu/doc?uri=CELEX:32020R1054"
    );
  }

  #[test]
  fn path_case_is_preserved() {
    assert_eq!(
      canonicalize_url("https://Example.com/Reg/ABC/"),
      "https://example.com/Reg/ABC"
    );
  }

  #[test]
  fn non_urls_are_trimmed_only() {
    assert_eq!(canonicalize_url("  not a url "), "not a url");
  }

  #[test]
  fn metadata_tracks_availability() {
    let empty = SearchMetadata::new(vec!["q".into()], 1, vec![]);
    assert!(!empty.evidence_available);
    assert_eq!(empty.total_sources, 0);
  }
}
