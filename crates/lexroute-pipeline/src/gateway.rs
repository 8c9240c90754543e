//! Evidence gateway: profile → search queries → deduplicated, ranked
//! [`SourceDocument`]s.
//!
//! Search failures never escape. A query that fails is counted and skipped;
//! if every query fails the gateway returns empty evidence and the pipeline
//! carries on without sources.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{Datelike, Utc};
use lexroute_core::{
  capability::{SearchResult, WebSearch},
  evidence::{canonicalize_url, SearchMetadata, SourceDocument},
  profile::{CargoCategory, CompanyProfile, VehicleType},
};

use crate::{config::GatewayConfig, retry::with_timeout};

pub struct EvidenceGateway<S> {
  search: Arc<S>,
  config: GatewayConfig,
}

impl<S> Clone for EvidenceGateway<S> {
  fn clone(&self) -> Self {
    Self { search: Arc::clone(&self.search), config: self.config.clone() }
  }
}

/// A document plus what we learned about it while merging result lists.
struct Candidate {
  doc:        SourceDocument,
  hits:       usize,
  first_seen: usize,
}

impl<S: WebSearch> EvidenceGateway<S> {
  pub fn new(search: Arc<S>, config: GatewayConfig) -> Self { Self { search, config } }

  /// Gather evidence for `profile`. The returned metadata carries the
  /// documents in relevance order.
  pub async fn fetch(&self, profile: &CompanyProfile) -> SearchMetadata {
    let queries = build_queries(profile, Utc::now().year(), self.config.max_queries);
    let timeout = Duration::from_secs(self.config.timeout_secs);

    let mut failed = 0;
    let mut merged: Vec<(SearchResult, usize)> = Vec::new();
    for query in &queries {
      let call = self.search.search(query, self.config.results_per_query);
      match with_timeout(timeout, call).await {
        Ok(results) => {
          tracing::debug!(query = %query, count = results.len(), "search query answered");
          let base = merged.len();
          merged.extend(results.into_iter().enumerate().map(|(i, r)| (r, base + i)));
        }
        Err(e) => {
          failed += 1;
          tracing::warn!(query = %query, error = %e, "search query failed");
        }
      }
    }

    if failed == queries.len() && !queries.is_empty() {
      tracing::warn!(
        company = %profile.company_name,
        queries = queries.len(),
        "evidence unavailable: every search query failed"
      );
    }

    let documents = rank(merged, &queries, self.config.max_documents);
    tracing::info!(
      company = %profile.company_name,
      documents = documents.len(),
      failed_queries = failed,
      "evidence gathered"
    );
    SearchMetadata::new(queries, failed, documents)
  }
}

/// Deterministic query list derived from the profile: one per country the
/// routes touch, then cargo- and fleet-specific topics, then a general one.
pub fn build_queries(profile: &CompanyProfile, year: i32, max: usize) -> Vec<String> {
  let countries = profile.countries();
  let mut queries: Vec<String> = countries
    .iter()
    .map(|c| format!("{c} road freight transport regulation changes {year}"))
    .collect();

  let region = if countries.is_empty() { "EU".to_string() } else { countries.join(" ") };
  for cargo in &profile.cargo_categories {
    match cargo {
      CargoCategory::Hazardous => {
        queries.push(format!("ADR dangerous goods road transport amendments {year} {region}"))
      }
      CargoCategory::Perishable => {
        queries.push(format!("ATP perishable foodstuffs transport requirements {year} {region}"))
      }
      CargoCategory::Standard => {}
    }
  }
  if profile.operates(VehicleType::Refrigerated) {
    queries.push(format!("refrigerated vehicle emissions and F-gas rules {year}"));
  }
  if profile.operates(VehicleType::Truck) || profile.operates(VehicleType::SemiTrailer) {
    queries.push(format!("EU Mobility Package driving time tachograph rules {year}"));
  }
  queries.push(format!("EU road haulage compliance changes {year}"));

  let mut seen = Vec::with_capacity(queries.len());
  for q in queries {
    if !seen.contains(&q) {
      seen.push(q);
    }
  }
  seen.truncate(max.max(1));
  seen
}

/// Merge raw results into documents: dedupe by canonical URL, rank by how
/// many queries surfaced a document and how many query terms it mentions,
/// keep the first `cap`.
fn rank(results: Vec<(SearchResult, usize)>, queries: &[String], cap: usize) -> Vec<SourceDocument> {
  let now = Utc::now();
  let mut by_url: HashMap<String, Candidate> = HashMap::new();
  for (r, position) in results {
    if r.url.trim().is_empty() {
      continue;
    }
    let key = canonicalize_url(&r.url);
    by_url
      .entry(key)
      .and_modify(|c| c.hits += 1)
      .or_insert_with(|| Candidate {
        doc:        SourceDocument {
          url:            r.url.trim().to_string(),
          title:          r.title.trim().to_string(),
          snippet:        r.snippet.trim().to_string(),
          published_date: r.published_date,
          retrieved_at:   now,
        },
        hits:       1,
        first_seen: position,
      });
  }

  let terms: Vec<String> = queries
    .iter()
    .flat_map(|q| q.split_whitespace())
    .filter(|t| t.len() > 3 && !t.chars().all(|c| c.is_ascii_digit()))
    .map(str::to_lowercase)
    .collect();

  let mut scored: Vec<(usize, Candidate)> = by_url
    .into_values()
    .map(|c| {
      let text = format!("{} {}", c.doc.title, c.doc.snippet).to_lowercase();
      let overlap = terms.iter().filter(|t| text.contains(t.as_str())).count();
      (c.hits * 10 + overlap, c)
    })
    .collect();
  scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then(a.first_seen.cmp(&b.first_seen)));
  scored.into_iter().take(cap).map(|(_, c)| c.doc).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fakes::{FakeSearch, profile_two_routes};

  #[test]
  fn queries_cover_countries_and_cargo() {
    let q = build_queries(&profile_two_routes(), 2025, 20);
    assert!(q.iter().any(|s| s.starts_with("DE ")));
    assert!(q.iter().any(|s| s.starts_with("PL ")));
    assert!(q.iter().any(|s| s.contains("ADR dangerous goods")));
    assert!(q.iter().all(|s| s.contains("2025")));
    let unique: std::collections::HashSet<_> = q.iter().collect();
    assert_eq!(unique.len(), q.len());
  }

  #[test]
  fn queries_are_capped() {
    assert_eq!(build_queries(&profile_two_routes(), 2025, 2).len(), 2);
  }

  #[tokio::test]
  async fn duplicates_merge_and_rank_first() {
    let search = FakeSearch::returning(vec![
      SearchResult {
        url:            "https://example.eu/a".into(),
        title:          "Unrelated".into(),
        snippet:        "".into(),
        published_date: None,
      },
      SearchResult {
        url:            "http://www.example.eu/b/".into(),
        title:          "Road freight regulation".into(),
        snippet:        "".into(),
        published_date: None,
      },
    ]);
    let gateway = EvidenceGateway::new(Arc::new(search), GatewayConfig::default());
    let meta = gateway.fetch(&profile_two_routes()).await;

    // Every query returns the same two results, so both merge to one each.
    assert_eq!(meta.total_sources, 2);
    assert_eq!(meta.sources[0].url, "http://www.example.eu/b/");
    assert!(meta.evidence_available);
    assert_eq!(meta.failed_queries, 0);
  }

  #[tokio::test]
  async fn total_failure_yields_empty_evidence() {
    let gateway = EvidenceGateway::new(Arc::new(FakeSearch::failing()), GatewayConfig::default());
    let meta = gateway.fetch(&profile_two_routes()).await;
    assert!(!meta.evidence_available);
    assert!(meta.sources.is_empty());
    assert_eq!(meta.failed_queries, meta.queries_used.len());
  }

  #[tokio::test]
  async fn evidence_is_capped() {
    let many = (0..40)
      .map(|i| SearchResult {
        url:            format!("https://example.eu/{i}"),
        title:          format!("Doc {i}"),
        snippet:        String::new(),
        published_date: None,
      })
      .collect();
    let gateway = EvidenceGateway::new(
      Arc::new(FakeSearch::returning(many)),
      GatewayConfig { results_per_query: 40, ..Default::default() },
    );
    let meta = gateway.fetch(&profile_two_routes()).await;
    assert_eq!(meta.sources.len(), 15);
  }
}
