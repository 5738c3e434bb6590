//! Catalog endpoint kinds and their cache policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CinegateError, Result};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = CinegateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "tv" | "show" | "shows" | "series" => Ok(Self::Tv),
            other => Err(CinegateError::validation(format!("unknown media type '{}'", other))),
        }
    }
}

/// Window for trending lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = CinegateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            other => Err(CinegateError::validation(format!("unknown time window '{}'", other))),
        }
    }
}

/// How quickly upstream data for an endpoint changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// Changes within minutes (now playing, trending, search)
    High,
    /// Changes within hours (popular, upcoming, discover)
    Medium,
    /// Changes within days (details, top rated)
    Low,
    /// Effectively fixed (genre lists)
    Static,
}

/// Expected top-level shape of an upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{ "results": [...] }`
    List,
    /// `{ "genres": [...] }`
    Genres,
    /// A single JSON object
    Object,
}

/// A catalog endpoint of the metadata API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Popular(MediaType),
    TopRated(MediaType),
    NowPlaying(MediaType),
    Upcoming(MediaType),
    Trending(MediaType, TimeWindow),
    Details(MediaType, u64),
    Credits(MediaType, u64),
    Videos(MediaType, u64),
    Recommendations(MediaType, u64),
    Season { series_id: u64, season: u32 },
    Search(MediaType),
    Discover(MediaType),
    Genres(MediaType),
}

impl EndpointKind {
    /// Every kind name accepted by [`EndpointKind::from_parts`] and the catalog config.
    pub const NAMES: &'static [&'static str] = &[
        "popular",
        "top_rated",
        "now_playing",
        "upcoming",
        "trending",
        "details",
        "credits",
        "videos",
        "recommendations",
        "season",
        "search",
        "discover",
        "genres",
    ];

    /// Build a kind from its name and the identifiers the name requires.
    pub fn from_parts(
        name: &str,
        media: MediaType,
        id: Option<u64>,
        season: Option<u32>,
        window: Option<TimeWindow>,
    ) -> Result<Self> {
        let require_id = || {
            id.filter(|id| *id > 0)
                .ok_or_else(|| CinegateError::validation(format!("'{}' requires a positive id", name)))
        };

        let kind = match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "popular" => Self::Popular(media),
            "top_rated" => Self::TopRated(media),
            "now_playing" => Self::NowPlaying(media),
            "upcoming" => Self::Upcoming(media),
            "trending" => Self::Trending(media, window.unwrap_or(TimeWindow::Week)),
            "details" => Self::Details(media, require_id()?),
            "credits" => Self::Credits(media, require_id()?),
            "videos" => Self::Videos(media, require_id()?),
            "recommendations" => Self::Recommendations(media, require_id()?),
            "season" => Self::Season {
                series_id: require_id()?,
                season: season
                    .ok_or_else(|| CinegateError::validation("'season' requires a season number"))?,
            },
            "search" => Self::Search(media),
            "discover" => Self::Discover(media),
            "genres" => Self::Genres(media),
            other => {
                return Err(CinegateError::validation(format!("unknown catalog endpoint '{}'", other)))
            }
        };
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Popular(_) => "popular",
            Self::TopRated(_) => "top_rated",
            Self::NowPlaying(_) => "now_playing",
            Self::Upcoming(_) => "upcoming",
            Self::Trending(..) => "trending",
            Self::Details(..) => "details",
            Self::Credits(..) => "credits",
            Self::Videos(..) => "videos",
            Self::Recommendations(..) => "recommendations",
            Self::Season { .. } => "season",
            Self::Search(_) => "search",
            Self::Discover(_) => "discover",
            Self::Genres(_) => "genres",
        }
    }

    pub fn media(&self) -> MediaType {
        match *self {
            Self::Popular(m)
            | Self::TopRated(m)
            | Self::NowPlaying(m)
            | Self::Upcoming(m)
            | Self::Trending(m, _)
            | Self::Details(m, _)
            | Self::Credits(m, _)
            | Self::Videos(m, _)
            | Self::Recommendations(m, _)
            | Self::Search(m)
            | Self::Discover(m)
            | Self::Genres(m) => m,
            Self::Season { .. } => MediaType::Tv,
        }
    }

    /// Identifier segments that distinguish instances of the same kind.
    pub fn id_segments(&self) -> Vec<String> {
        match *self {
            Self::Trending(_, window) => vec![window.as_str().to_string()],
            Self::Details(_, id)
            | Self::Credits(_, id)
            | Self::Videos(_, id)
            | Self::Recommendations(_, id) => vec![id.to_string()],
            Self::Season { series_id, season } => vec![series_id.to_string(), season.to_string()],
            _ => Vec::new(),
        }
    }

    /// Path on the metadata API, relative to its base URL.
    pub fn upstream_path(&self) -> String {
        match *self {
            Self::Popular(m) => format!("/{}/popular", m),
            Self::TopRated(m) => format!("/{}/top_rated", m),
            Self::NowPlaying(MediaType::Movie) => "/movie/now_playing".to_string(),
            Self::NowPlaying(MediaType::Tv) => "/tv/on_the_air".to_string(),
            Self::Upcoming(MediaType::Movie) => "/movie/upcoming".to_string(),
            Self::Upcoming(MediaType::Tv) => "/tv/airing_today".to_string(),
            Self::Trending(m, window) => format!("/trending/{}/{}", m, window.as_str()),
            Self::Details(m, id) => format!("/{}/{}", m, id),
            Self::Credits(m, id) => format!("/{}/{}/credits", m, id),
            Self::Videos(m, id) => format!("/{}/{}/videos", m, id),
            Self::Recommendations(m, id) => format!("/{}/{}/recommendations", m, id),
            Self::Season { series_id, season } => format!("/tv/{}/season/{}", series_id, season),
            Self::Search(m) => format!("/search/{}", m),
            Self::Discover(m) => format!("/discover/{}", m),
            Self::Genres(m) => format!("/genre/{}/list", m),
        }
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Genres(_) => PayloadShape::Genres,
            Self::Details(..) | Self::Credits(..) | Self::Videos(..) | Self::Season { .. } => {
                PayloadShape::Object
            }
            _ => PayloadShape::List,
        }
    }

    pub fn volatility(&self) -> Volatility {
        match self {
            Self::NowPlaying(_) | Self::Trending(..) | Self::Search(_) => Volatility::High,
            Self::Popular(_) | Self::Upcoming(_) | Self::Discover(_) => Volatility::Medium,
            Self::TopRated(_)
            | Self::Details(..)
            | Self::Credits(..)
            | Self::Videos(..)
            | Self::Recommendations(..)
            | Self::Season { .. } => Volatility::Low,
            Self::Genres(_) => Volatility::Static,
        }
    }

    /// TTL applied when the catalog config has no override for this kind.
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            Self::NowPlaying(_) => 10 * MINUTE,
            Self::Trending(..) => 15 * MINUTE,
            Self::Search(_) => 5 * MINUTE,
            Self::Popular(_) | Self::Discover(_) => 30 * MINUTE,
            Self::Upcoming(_) => HOUR,
            Self::Details(..)
            | Self::Videos(..)
            | Self::Recommendations(..)
            | Self::Season { .. } => 6 * HOUR,
            Self::TopRated(_) | Self::Credits(..) => DAY,
            Self::Genres(_) => 7 * DAY,
        };
        Duration::from_secs(secs)
    }

    pub fn requires_query(&self) -> bool {
        matches!(self, Self::Search(_))
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
