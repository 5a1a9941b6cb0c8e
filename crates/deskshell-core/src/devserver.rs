use std::time::Duration;

use tracing::{debug, info};

/// How often to knock on the dev server while it boots
pub const DEV_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Block until something answers HTTP at `url`. Any status counts; we only care that the
/// dev server is listening. Polls forever, so callers race it against shutdown.
pub async fn wait_for_dev_server(url: &str, poll: Duration) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap_or_default();

    info!("waiting for dev server at {}", url);
    let mut attempts = 0u32;
    loop {
        match client.get(url).send().await {
            Ok(resp) => {
                info!("dev server is up ({}) after {} attempts", resp.status(), attempts + 1);
                return;
            }
            Err(e) => {
                attempts = attempts.saturating_add(1);
                debug!("dev server not ready: {}", e);
                tokio::time::sleep(poll).await;
            }
        }
    }
}
