use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls `url` until it answers with a 2xx status.
///
/// Connection errors and other statuses are logged and retried every
/// `interval`. Returns `false` if cancelled first.
pub async fn wait_for_server(
    url: &str,
    interval: Duration,
    verify_tls: bool,
    cancel: &CancellationToken,
) -> Result<bool> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .danger_accept_invalid_certs(!verify_tls)
        .build()?;

    info!("Waiting for keycloak at {url}");
    loop {
        match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Keycloak is up");
                return Ok(true);
            }
            Ok(response) => debug!("Keycloak answered {}", response.status()),
            Err(e) => warn!("Can't join keycloak for now: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_waits_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let ready = wait_for_server(&server.uri(), Duration::from_millis(10), false, &cancel)
            .await
            .unwrap();

        assert!(ready);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_server_until_cancelled() {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        });

        let ready = wait_for_server(
            "http://127.0.0.1:1/auth/",
            Duration::from_millis(20),
            false,
            &cancel,
        )
        .await
        .unwrap();

        assert!(!ready);
    }
}
