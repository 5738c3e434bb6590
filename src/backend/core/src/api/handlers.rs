//! API request handlers.
//!
//! Handlers return `Result<Response, CinegateError>`; errors render through
//! the `IntoResponse` implementation on `CinegateError`.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ApiResponse, AppState};
use crate::catalog::{CatalogParams, EndpointKind, MediaType, TimeWindow};
use crate::error::{CinegateError, Result};
use crate::resolver::{PlaybackRequest, ResolveOptions, Resolution};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════════

/// Split the raw query into an endpoint kind and the forwarded params.
///
/// `media`, `id`, `season` and `window` select the endpoint; every other pair
/// is forwarded upstream.
fn catalog_request(name: &str, pairs: Vec<(String, String)>) -> Result<(EndpointKind, CatalogParams)> {
    let mut media = MediaType::Movie;
    let mut id = None;
    let mut season = None;
    let mut window = None;
    let mut params = CatalogParams::new();

    for (key, value) in pairs {
        match key.trim().to_ascii_lowercase().as_str() {
            "media" => media = MediaType::from_str(&value)?,
            "id" => id = Some(parse_number::<u64>("id", &value)?),
            "season" => season = Some(parse_number::<u32>("season", &value)?),
            "window" => window = Some(TimeWindow::from_str(&value)?),
            other => params.insert(other, value),
        }
    }

    let kind = EndpointKind::from_parts(name, media, id, season, window)?;
    Ok((kind, params))
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CinegateError::validation(format!("'{}' must be a non-negative integer", name)))
}

/// GET /api/v1/catalog/:kind
pub async fn get_catalog(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let (kind, params) = catalog_request(&kind, pairs)?;
    let payload = state.catalog.fetch(kind, params).await?;

    let cache_status = payload.source.cache_status();
    let mut response = Json(ApiResponse::success(payload)).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    Ok(response)
}

#[derive(Debug, Serialize)]
pub struct InvalidationResponse {
    pub kind: String,
    pub cache_key: String,
    pub invalidated: bool,
}

/// DELETE /api/v1/catalog/:kind
pub async fn invalidate_catalog(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let (kind, params) = catalog_request(&kind, pairs)?;
    let cache_key = state.catalog.invalidate(&kind, &params).await;

    Ok(Json(ApiResponse::success(InvalidationResponse {
        kind: kind.name().to_string(),
        cache_key,
        invalidated: true,
    }))
    .into_response())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Playback
// ═══════════════════════════════════════════════════════════════════════════════

/// Signed so that negative numbers are reported as validation errors.
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackQuery {
    pub season: Option<i64>,
    pub episode: Option<i64>,
    #[serde(default)]
    pub probe: bool,
}

fn non_negative(name: &'static str, value: Option<i64>) -> Result<Option<u32>> {
    value
        .map(|v| u32::try_from(v).map_err(|_| CinegateError::validation(format!("'{}' must be non-negative", name))))
        .transpose()
}

fn playback_request(media: &str, id: &str, query: &PlaybackQuery) -> Result<PlaybackRequest> {
    let external_id = parse_number::<u64>("id", id)?;
    let request = match MediaType::from_str(media)? {
        MediaType::Movie => PlaybackRequest::movie(external_id),
        MediaType::Tv => {
            let season = non_negative("season", query.season)?
                .ok_or_else(|| CinegateError::validation("tv playback requires 'season'"))?;
            let episode = non_negative("episode", query.episode)?
                .ok_or_else(|| CinegateError::validation("tv playback requires 'episode'"))?;
            PlaybackRequest::episode(external_id, season, episode)
        }
    };
    request.validate()?;
    Ok(request)
}

fn playback_query(query: std::result::Result<Query<PlaybackQuery>, QueryRejection>) -> Result<PlaybackQuery> {
    query
        .map(|Query(q)| q)
        .map_err(|e| CinegateError::validation(format!("invalid query: {}", e.body_text())))
}

/// GET /api/v1/playback/:media/:id
pub async fn resolve_playback(
    State(state): State<AppState>,
    Path((media, id)): Path<(String, String)>,
    query: std::result::Result<Query<PlaybackQuery>, QueryRejection>,
) -> Result<Response> {
    let query = playback_query(query)?;
    let request = playback_request(&media, &id, &query)?;
    let resolution = state
        .resolver
        .resolve(&request, ResolveOptions { probe: query.probe })
        .await?;

    let response = match &resolution {
        Resolution::Found(_) => (StatusCode::OK, Json(ApiResponse::success(&resolution))),
        Resolution::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure(&resolution, "no playable stream found on the video host")),
        ),
        Resolution::Unavailable { reason, .. } => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::failure(&resolution, format!("video host unavailable: {}", reason))),
        ),
    };
    Ok(response.into_response())
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub page_url: String,
    pub available: bool,
}

/// GET /api/v1/playback/:media/:id/availability
pub async fn check_availability(
    State(state): State<AppState>,
    Path((media, id)): Path<(String, String)>,
    query: std::result::Result<Query<PlaybackQuery>, QueryRejection>,
) -> Result<Response> {
    let query = playback_query(query)?;
    let request = playback_request(&media, &id, &query)?;
    let page_url = state.resolver.page_url(&request)?;
    let available = state.resolver.probe_page(&request).await?;

    Ok(Json(ApiResponse::success(AvailabilityResponse { page_url, available })).into_response())
}

pub async fn not_found() -> Response {
    let err = CinegateError::new(crate::error::ErrorCode::InvalidInput, "route not found");
    (StatusCode::NOT_FOUND, Json(ApiResponse::<()>::from_error(&err))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_catalog_request_splits_selectors() {
        let (kind, params) =
            catalog_request("details", pairs(&[("media", "tv"), ("id", "1399"), ("append", "images")])).unwrap();
        assert_eq!(kind, EndpointKind::Details(MediaType::Tv, 1399));
        assert_eq!(params.get("append"), Some("images"));
        assert!(params.get("id").is_none());
    }

    #[test]
    fn test_catalog_request_rejects_bad_id() {
        assert!(catalog_request("details", pairs(&[("id", "-3")])).is_err());
        assert!(catalog_request("nonsense", vec![]).is_err());
    }

    #[test]
    fn test_playback_request_validation() {
        let q = PlaybackQuery { season: Some(1), episode: Some(2), probe: false };
        assert_eq!(playback_request("tv", "1399", &q).unwrap(), PlaybackRequest::episode(1399, 1, 2));
        assert_eq!(playback_request("movie", "550", &PlaybackQuery::default()).unwrap(), PlaybackRequest::movie(550));

        let negative = PlaybackQuery { season: Some(-1), episode: Some(1), probe: false };
        assert!(playback_request("tv", "1", &negative).is_err());
        assert!(playback_request("tv", "1", &PlaybackQuery::default()).is_err());
        assert!(playback_request("movie", "abc", &PlaybackQuery::default()).is_err());
        assert!(playback_request("movie", "0", &PlaybackQuery::default()).is_err());
    }
}
