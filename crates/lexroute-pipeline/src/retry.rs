//! Bounded retry and per-call timeout combinators shared by the generation
//! and validation stages.

use std::{future::Future, time::Duration};

use lexroute_core::capability::CapabilityError;

/// Run `op` up to `attempts` times (at least once), returning the first
/// success or the last error. `on_fail` sees every failed attempt, numbered
/// from 1.
pub async fn with_retry<T, E, F, Fut>(
  mut op: F,
  attempts: u32,
  mut on_fail: impl FnMut(u32, &E),
) -> Result<T, E>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let attempts = attempts.max(1);
  let mut attempt = 1;
  loop {
    match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(e) => {
        on_fail(attempt, &e);
        if attempt >= attempts {
          return Err(e);
        }
        attempt += 1;
      }
    }
  }
}

/// Bound one external call; overrunning `limit` becomes
/// [`CapabilityError::Timeout`].
pub async fn with_timeout<T, E>(
  limit: Duration,
  fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
  E: From<CapabilityError>,
{
  match tokio::time::timeout(limit, fut).await {
    Ok(result) => result,
    Err(_) => Err(CapabilityError::Timeout(limit).into()),
  }
}
