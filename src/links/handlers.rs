use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{device::DeviceType, error::LinkError};
use crate::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new().route("/api/link/:link_id", get(get_link))
}

pub fn redirect_routes() -> Router<AppState> {
    Router::new().route("/:link_id", get(follow_link))
}

#[instrument(skip(state))]
pub async fn get_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
) -> Result<Json<Value>, LinkError> {
    let link = state.links.resolve(&link_id).await?;
    Ok(Json(link.body))
}

/// Sends the visitor to the destination that fits their device.
#[instrument(skip(state, headers))]
pub async fn follow_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let link = match state.links.resolve(&link_id).await {
        Ok(link) => link,
        Err(e) => {
            let status = e.status_code();
            if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
                return (StatusCode::NOT_FOUND, "Not Found").into_response();
            }
            warn!(error = %e, %link_id, "link resolution failed");
            return e.into_response();
        }
    };

    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    let device = DeviceType::from_user_agent(user_agent);
    let target = device.pick(&link.record.destinos);
    info!(%link_id, ?device, "redirecting short link");
    Redirect::temporary(target).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    async fn upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jucasoft-app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "destinos": {
                    "encurtado": "https://juk.re/jucasoft-app",
                    "padrao": "https://jucasoft.com",
                    "android": "https://play.example/jucasoft",
                    "ios": null
                },
                "hits": 3
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teapot"))
            .respond_with(ResponseTemplate::new(418))
            .mount(&server)
            .await;
        server
    }

    fn app(base_url: String) -> Router {
        let state = AppState::fake().with_link_api(base_url);
        api_routes().merge(redirect_routes()).with_state(state)
    }

    async fn call(app: Router, uri: &str, ua: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(ua) = ua {
            req = req.header(header::USER_AGENT, ua);
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn api_passes_upstream_body_through() {
        let server = upstream().await;
        let (status, _, body) = call(app(server.uri()), "/api/link/jucasoft-app", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"], 3);
        assert_eq!(body["destinos"]["padrao"], "https://jucasoft.com");
    }

    #[tokio::test]
    async fn api_maps_errors_to_detail_bodies() {
        let server = upstream().await;
        let (status, _, body) = call(app(server.uri()), "/api/link/gone", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Link não encontrado.");

        let (status, _, body) = call(app(server.uri()), "/api/link/teapot", None).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body["detail"], "Erro ao consultar a API.");

        let (status, _, body) = call(app(server.uri()), "/api/link/_next", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "ID de link inválido.");

        let (status, _, body) = call(app(server.uri()), "/api/link/Docs", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "ID de link reservado.");
    }

    #[tokio::test]
    async fn short_link_redirects_by_device() {
        let server = upstream().await;
        let android = "Mozilla/5.0 (Linux; Android 14)";
        let (status, headers, _) = call(app(server.uri()), "/jucasoft-app", Some(android)).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(headers[header::LOCATION], "https://play.example/jucasoft");

        let (_, headers, _) = call(app(server.uri()), "/jucasoft-app", None).await;
        assert_eq!(headers[header::LOCATION], "https://jucasoft.com");
    }

    #[tokio::test]
    async fn short_link_hides_invalid_and_missing_ids() {
        let server = upstream().await;
        let (status, _, _) = call(app(server.uri()), "/gone", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = call(app(server.uri()), "/blog", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
