use std::net::{SocketAddr, TcpListener};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::error::{LaunchError, LaunchResult};

/// Check if a port is free on every interface and on loopback
pub fn is_port_available(port: u16) -> bool {
    [[0, 0, 0, 0], [127, 0, 0, 1]]
        .into_iter()
        .all(|ip| TcpListener::bind(SocketAddr::from((ip, port))).is_ok())
}

/// Port of a backend URL, or its scheme default
pub fn url_port(url: &str) -> LaunchResult<u16> {
    let parsed = reqwest::Url::parse(url).map_err(|e| LaunchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed.port_or_known_default().ok_or_else(|| LaunchError::InvalidUrl {
        url: url.to_string(),
        reason: "no port".to_string(),
    })
}

/// One readiness probe: any HTTP response means the backend is accepting connections
pub async fn probe_once(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => {
            debug!("Probe {} answered {}", url, response.status());
            true
        }
        Err(e) => {
            debug!("Probe {} failed: {}", url, e);
            false
        }
    }
}

/// Poll the backend URL until it answers, the backend dies, or the timeout runs out
///
/// `exited` is consulted before every attempt and returns why the backend is
/// gone, if it is. Returns the number of probes it took.
pub async fn wait_for_backend<F>(url: &str, config: &ReadinessConfig, mut exited: F) -> LaunchResult<u32>
where
    F: FnMut() -> Option<String>,
{
    url_port(url)?;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .no_proxy()
        .build()?;

    let start = Instant::now();
    let deadline = start + config.probe_timeout();
    let mut attempts = 0;

    info!("Waiting for backend at {}", url);
    loop {
        if let Some(reason) = exited() {
            warn!("Backend gone while waiting for {}: {}", url, reason);
            return Err(LaunchError::BackendExited(reason));
        }

        attempts += 1;
        if probe_once(&client, url).await {
            info!("Backend ready after {} probe(s), {:?}", attempts, start.elapsed());
            return Ok(attempts);
        }

        if Instant::now() >= deadline {
            let waited_ms = start.elapsed().as_millis() as u64;
            warn!("Backend at {} not ready after {} ms", url, waited_ms);
            return Err(LaunchError::ReadinessTimeout {
                url: url.to_string(),
                waited_ms,
            });
        }

        tokio::time::sleep(config.probe_interval()).await;
    }
}
