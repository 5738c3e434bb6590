//! `cinegate catalog`: fetch or invalidate a catalog endpoint.

use anyhow::Result;
use clap::Args;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CatalogArgs {
    /// Endpoint kind: popular, top_rated, now_playing, upcoming, trending,
    /// details, credits, videos, recommendations, season, search, discover, genres
    kind: String,

    /// movie or tv
    #[arg(short, long, default_value = "movie")]
    media: String,

    /// Title id, for per-title endpoints
    #[arg(long)]
    id: Option<u64>,

    /// Season number, for `season`
    #[arg(long)]
    season: Option<u32>,

    /// day or week, for `trending`
    #[arg(long)]
    window: Option<String>,

    /// Extra upstream parameter, repeatable (e.g. --param page=2 --param query=alien)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Drop the cached payload instead of fetching it
    #[arg(long)]
    invalidate: bool,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogPayload {
    kind: String,
    cache_key: String,
    data: Value,
    source: String,
    stale: bool,
    fetched_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Invalidation {
    kind: String,
    cache_key: String,
    invalidated: bool,
}

#[derive(Serialize, Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Rating")]
    rating: String,
}

impl CatalogArgs {
    fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![("media".to_string(), self.media.clone())];
        if let Some(id) = self.id {
            query.push(("id".into(), id.to_string()));
        }
        if let Some(season) = self.season {
            query.push(("season".into(), season.to_string()));
        }
        if let Some(window) = &self.window {
            query.push(("window".into(), window.clone()));
        }
        query.extend(self.params.iter().cloned());
        query
    }
}

/// Rows for list payloads (`results`) and genre lists (`genres`).
fn item_rows(data: &Value) -> Option<Vec<ItemRow>> {
    let items = data
        .get("results")
        .or_else(|| data.get("genres"))
        .and_then(Value::as_array)?;

    let text = |item: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .unwrap_or("")
            .to_string()
    };

    Some(
        items
            .iter()
            .map(|item| ItemRow {
                id: item.get("id").map(|v| v.to_string()).unwrap_or_default(),
                title: text(item, &["title", "name"]),
                date: text(item, &["release_date", "first_air_date"]),
                rating: item
                    .get("vote_average")
                    .and_then(Value::as_f64)
                    .map(|r| format!("{:.1}", r))
                    .unwrap_or_default(),
            })
            .collect(),
    )
}

pub async fn execute(args: CatalogArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let path = format!("/api/v1/catalog/{}", args.kind);
    let query = args.query();

    if args.invalidate {
        let result: Invalidation = client.delete(&path, &query).await?;
        return match format {
            OutputFormat::Table => {
                output::print_success(&format!("Invalidated {}", result.cache_key));
                Ok(())
            }
            _ => output::print_item(&result, format),
        };
    }

    let reply = client.send::<CatalogPayload>(Method::GET, &path, &query).await?;
    let cache_status = reply.cache_status.unwrap_or_else(|| "-".into());
    let payload = reply
        .body
        .data
        .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))?;

    if !matches!(format, OutputFormat::Table) {
        return output::print_item(&payload, format);
    }

    output::print_header(&format!("Catalog: {}", payload.kind));
    output::print_detail("Cache", &output::status_word(&cache_status).to_string());
    output::print_detail("Key", &payload.cache_key);
    output::print_detail("Fetched", &payload.fetched_at);
    if payload.stale {
        output::print_warning("Upstream unavailable; showing the last cached copy");
    }
    println!();

    match item_rows(&payload.data) {
        Some(rows) => output::print_list(&rows, format),
        None => output::print_item(&payload.data, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("query=blade runner").unwrap(), ("query".into(), "blade runner".into()));
        assert_eq!(parse_param("sort_by=a=b").unwrap(), ("sort_by".into(), "a=b".into()));
        assert!(parse_param("nokey").is_err());
        assert!(parse_param("=v").is_err());
    }

    #[test]
    fn test_item_rows_for_lists() {
        let data = serde_json::json!({"results": [
            {"id": 1, "title": "Alien", "release_date": "1979-05-25", "vote_average": 8.16},
            {"id": 2, "name": "Dark", "first_air_date": "2017-12-01"}
        ]});
        let rows = item_rows(&data).unwrap();
        assert_eq!(rows[0].rating, "8.2");
        assert_eq!(rows[1].title, "Dark");
        assert!(item_rows(&serde_json::json!({"id": 5})).is_none());
    }
}
