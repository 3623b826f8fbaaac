//! Target reachability probe run before any case

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Issue GETs against the target until one returns 2xx.
///
/// Returns the status on success. Fails with [`E2eError::Setup`] once
/// `attempts` requests have failed.
pub async fn wait_for_reachable(url: &str, attempts: usize, timeout: Duration) -> E2eResult<u16> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Target {} reachable (HTTP {})", url, resp.status().as_u16());
                return Ok(resp.status().as_u16());
            }
            Ok(resp) => {
                warn!("Probe {}/{} of {} returned {}", attempt, attempts, url, resp.status());
                last_error = format!("HTTP {}", resp.status().as_u16());
            }
            Err(e) => {
                warn!("Probe {}/{} of {} failed: {}", attempt, attempts, url, e);
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            sleep(RETRY_DELAY).await;
        }
    }

    Err(E2eError::Setup(format!(
        "{} not reachable after {} attempt(s): {}",
        url, attempts, last_error
    )))
}
