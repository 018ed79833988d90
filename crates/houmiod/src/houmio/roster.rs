use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::engine::LightDescriptor;
use crate::error::Error;

/// Default timeout for the roster request.
pub const ROSTER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SiteResponse {
    lights: Vec<LightDescriptor>,
}

/// Fetch the site's lights from `{host}/api/site/{site_key}`.
///
/// Any failure here is fatal for setup.
pub async fn fetch_roster(
    host: &str,
    site_key: &str,
    timeout: Duration,
) -> Result<Vec<LightDescriptor>, Error> {
    let url = format!("{}/api/site/{}", host.trim_end_matches('/'), site_key);
    info!("Fetching light roster from {}", host);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::RosterFetchFailure(e.to_string()))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::RosterFetchFailure(e.to_string()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::RosterFetchFailure(format!(
            "unexpected status {}",
            response.status()
        )));
    }

    let site: SiteResponse = response
        .json()
        .await
        .map_err(|e| Error::RosterFetchFailure(e.to_string()))?;

    info!("Fetched {} lights", site.lights.len());
    Ok(site.lights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LightKind;
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_roster() {
        let app = Router::new().route(
            "/api/site/site-1",
            get(|| async {
                Json(json!({
                    "lights": [
                        {"_id": "l1", "name": "Lamp", "room": "", "type": "dimmable", "bri": 128, "on": 1},
                        {"_id": "l2", "name": "Plug", "room": "Hall", "type": "binary", "bri": 0, "on": 0}
                    ]
                }))
            }),
        );
        let host = serve(app).await;

        let lights = fetch_roster(&host, "site-1", ROSTER_TIMEOUT).await.unwrap();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].id, "l1");
        assert_eq!(lights[0].brightness, Some(128));
        assert_eq!(lights[0].on, Some(true));
        assert_eq!(lights[1].kind, LightKind::Binary);
        assert_eq!(lights[1].room, "Hall");
    }

    #[tokio::test]
    async fn test_fetch_roster_bad_status() {
        let app = Router::new().route(
            "/api/site/site-1",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let host = serve(app).await;

        let err = fetch_roster(&host, "site-1", ROSTER_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RosterFetchFailure(_)));
    }

    #[tokio::test]
    async fn test_fetch_roster_bad_body() {
        let app = Router::new().route("/api/site/site-1", get(|| async { "not json" }));
        let host = serve(app).await;

        let err = fetch_roster(&host, "site-1", ROSTER_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RosterFetchFailure(_)));
    }
}
