//! Company profile, the immutable input to every pipeline run.
//!
//! The profile is owned by the caller and never mutated by the core. The
//! evidence gateway derives its search queries from it and the generator
//! passes it verbatim to the text-generation capability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Fleet ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
  Truck,
  Van,
  SemiTrailer,
  Refrigerated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetVehicle {
  pub vehicle_type: VehicleType,
  pub quantity:     u32,
}

// ─── Cargo ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CargoCategory {
  Standard,
  Hazardous,
  Perishable,
}

// ─── Routes ──────────────────────────────────────────────────────────────────

/// One end of a route; `country_code` is ISO 3166-1 alpha-2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePoint {
  pub country_code: String,
  #[serde(default)]
  pub city:         Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRoute {
  pub name:              String,
  pub origin:            RoutePoint,
  pub destination:       RoutePoint,
  #[serde(default)]
  pub transit_countries: Vec<String>,
}

impl TransportRoute {
  /// Origin, transit and destination country codes in travel order.
  pub fn countries(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.origin.country_code.as_str())
      .chain(self.transit_countries.iter().map(String::as_str))
      .chain(std::iter::once(self.destination.country_code.as_str()))
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
  pub company_name:           String,
  /// Free-form contact details, e.g. `email` and `phone`.
  #[serde(default)]
  pub contact:                BTreeMap<String, String>,
  #[serde(default)]
  pub fleet:                  Vec<FleetVehicle>,
  #[serde(default)]
  pub routes:                 Vec<TransportRoute>,
  #[serde(default)]
  pub cargo_categories:       Vec<CargoCategory>,
  #[serde(default)]
  pub monitoring_preferences: serde_json::Map<String, serde_json::Value>,
}

impl CompanyProfile {
  /// Every country the company's routes touch, upper-cased, in first-seen
  /// order and without duplicates.
  pub fn countries(&self) -> Vec<String> {
    let mut seen = Vec::new();
    for code in self.routes.iter().flat_map(TransportRoute::countries) {
      let code = code.trim().to_ascii_uppercase();
      if !code.is_empty() && !seen.contains(&code) {
        seen.push(code);
      }
    }
    seen
  }

  pub fn operates(&self, vehicle: VehicleType) -> bool {
    self.fleet.iter().any(|v| v.vehicle_type == vehicle)
  }

  /// Reject profiles the pipeline cannot meaningfully report on.
  pub fn validate(&self) -> Result<()> {
    if self.company_name.trim().is_empty() {
      return Err(Error::InvalidProfile("company_name is empty".into()));
    }
    if let Some(v) = self.fleet.iter().find(|v| v.quantity == 0) {
      return Err(Error::InvalidProfile(format!(
        "fleet entry {:?} has zero quantity",
        v.vehicle_type
      )));
    }
    for route in &self.routes {
      if route.name.trim().is_empty() {
        return Err(Error::InvalidProfile("route with empty name".into()));
      }
      if let Some(bad) = route.countries().find(|c| !is_country_code(c)) {
        return Err(Error::InvalidProfile(format!(
          "route {:?} has invalid country code {bad:?}",
          route.name
        )));
      }
    }
    Ok(())
  }
}

fn is_country_code(code: &str) -> bool {
  code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}
