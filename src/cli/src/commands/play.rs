//! `cinegate play` and `cinegate available`: playback resolution and probes.

use anyhow::Result;
use clap::{Args, ValueEnum};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Media {
    Movie,
    Tv,
}

impl Media {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

#[derive(Args)]
pub struct Target {
    /// movie or tv
    #[arg(value_enum)]
    media: Media,

    /// Title id
    id: u64,

    /// Season number (tv only)
    #[arg(short, long)]
    season: Option<u32>,

    /// Episode number (tv only)
    #[arg(short, long)]
    episode: Option<u32>,
}

impl Target {
    fn validate(&self) -> Result<()> {
        if let Media::Tv = self.media {
            if self.season.is_none() || self.episode.is_none() {
                anyhow::bail!("tv playback requires --season and --episode");
            }
        }
        Ok(())
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(season) = self.season {
            query.push(("season".to_string(), season.to_string()));
        }
        if let Some(episode) = self.episode {
            query.push(("episode".to_string(), episode.to_string()));
        }
        query
    }

    fn path(&self) -> String {
        format!("/api/v1/playback/{}/{}", self.media.as_str(), self.id)
    }
}

#[derive(Args)]
pub struct PlayArgs {
    #[command(flatten)]
    target: Target,

    /// Also check that the player page is live
    #[arg(long)]
    probe: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Resolution {
    Found {
        stream_url: String,
        quality: String,
        page_url: String,
        extractor: String,
        probed_available: Option<bool>,
    },
    NotFound {
        page_url: String,
    },
    Unavailable {
        page_url: String,
        reason: String,
        http_status: Option<u16>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Availability {
    page_url: String,
    available: bool,
}

pub async fn play(args: PlayArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    args.target.validate()?;
    let mut query = args.target.query();
    if args.probe {
        query.push(("probe".to_string(), "true".to_string()));
    }

    let reply = client
        .send::<Resolution>(Method::GET, &args.target.path(), &query)
        .await?;
    let resolution = reply
        .body
        .data
        .ok_or_else(|| anyhow::anyhow!("API returned no resolution"))?;

    if !matches!(format, OutputFormat::Table) {
        return output::print_item(&resolution, format);
    }

    match resolution {
        Resolution::Found {
            stream_url,
            quality,
            page_url,
            extractor,
            probed_available,
        } => {
            output::print_header("Stream Found");
            output::print_detail("Stream", &stream_url);
            output::print_detail("Quality", &quality);
            output::print_detail("Extractor", &extractor);
            output::print_detail("Page", &page_url);
            let probed = match probed_available {
                Some(live) => output::status_word(&live.to_string()).to_string(),
                None => "not checked".to_string(),
            };
            output::print_detail("Live", &probed);
        }
        Resolution::NotFound { page_url } => {
            output::print_warning(&format!("No playable stream found on {}", page_url));
        }
        Resolution::Unavailable { page_url, reason, http_status } => {
            let status = http_status.map(|s| format!(" [{}]", s)).unwrap_or_default();
            output::print_error(&format!("Video host unavailable{}: {} ({})", status, reason, page_url));
        }
    }

    if reply.status != StatusCode::OK {
        std::process::exit(2);
    }
    Ok(())
}

pub async fn available(target: Target, client: &ApiClient, format: OutputFormat) -> Result<()> {
    target.validate()?;
    let path = format!("{}/availability", target.path());
    let result: Availability = client.get(&path, &target.query()).await?;

    match format {
        OutputFormat::Table => {
            if result.available {
                output::print_success(&format!("Available: {}", result.page_url));
            } else {
                output::print_warning(&format!("Not available: {}", result.page_url));
            }
            Ok(())
        }
        _ => output::print_item(&result, format),
    }
}
