//! Preflight check for the application under test

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Interval between reachability probes
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Wait until `base_url` answers with anything other than a server error.
///
/// The application is remote and uncontrolled; this only distinguishes
/// "down" from "up" so a run fails fast instead of timing out per step.
pub async fn wait_for_reachable(base_url: &str, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(base_url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                debug!("{} answered {} after {} attempt(s)", base_url, resp.status(), attempts);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Preflight returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to become reachable...", base_url);
                }
                if !e.is_connect() {
                    warn!("Preflight error: {}", e);
                }
            }
        }

        if start.elapsed() + RETRY_INTERVAL >= timeout_duration {
            break;
        }
        sleep(RETRY_INTERVAL).await;
    }

    Err(E2eError::TargetUnreachable {
        url: base_url.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_target_fails_fast() {
        // Port 1 is reserved and closed on test hosts
        let err = wait_for_reachable("http://127.0.0.1:1/parabank/", Duration::from_millis(800))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::TargetUnreachable { attempts, .. } if attempts >= 1));
    }
}
