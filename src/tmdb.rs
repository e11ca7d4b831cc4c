use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn fetch_trending(&self, page: u32) -> Result<Page<Movie>>;
    async fn search_movies(&self, query: &str, page: u32) -> Result<Page<Movie>>;
    async fn discover_movies(&self, filter: &FilterQuery, page: u32) -> Result<Page<Movie>>;
    async fn fetch_genres(&self) -> Result<Vec<Genre>>;
    async fn fetch_movie(&self, id: i32) -> Result<MovieDetail>;
}

/// One page of the TMDB list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: u32,
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

/// A movie as TMDB lists it. Fields pass through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: i32,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub budget: Option<i64>,
    #[serde(default)]
    pub revenue: Option<i64>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub credits: Credits,
    #[serde(default)]
    pub videos: Videos,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Videos {
    #[serde(default)]
    pub results: Vec<Video>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
    pub key: String,
}

/// Discovery constraints. Absent fields contribute no query parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
    pub genre: Option<i32>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
}

impl FilterQuery {
    pub fn is_empty(&self) -> bool {
        self.genre.is_none() && self.year.is_none() && self.min_rating.is_none()
    }
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn fetch_trending(&self, page: u32) -> Result<Page<Movie>> {
        let url = format!(
            "{TMDB_BASE}/trending/movie/week?language=en-US&page={page}&api_key={}",
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn search_movies(&self, query: &str, page: u32) -> Result<Page<Movie>> {
        let url = format!(
            "{TMDB_BASE}/search/movie?language=en-US&include_adult=false&query={}&page={page}&api_key={}",
            urlencoding::encode(query),
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn discover_movies(&self, filter: &FilterQuery, page: u32) -> Result<Page<Movie>> {
        let url = format!(
            "{TMDB_BASE}/discover/movie?language=en-US&sort_by=popularity.desc&page={page}{}&api_key={}",
            discover_params(filter),
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn fetch_genres(&self) -> Result<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreList {
            genres: Vec<Genre>,
        }

        let url = format!(
            "{TMDB_BASE}/genre/movie/list?language=en-US&api_key={}",
            self.api_key
        );
        let data: GenreList = self.get_json(&url).await?;
        Ok(data.genres)
    }

    async fn fetch_movie(&self, id: i32) -> Result<MovieDetail> {
        let url = format!(
            "{TMDB_BASE}/movie/{id}?append_to_response=credits,videos&language=en-US&api_key={}",
            self.api_key
        );
        self.get_json(&url).await
    }
}

impl TmdbClient {
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = self.client.get(url).send().await.context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            // TMDB error bodies carry a human-readable status_message.
            let message = serde_json::from_str::<TmdbErrorBody>(&text)
                .ok()
                .and_then(|e| e.status_message)
                .unwrap_or(text);
            return Err(anyhow!("TMDB {} -> {}", status, message));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct TmdbErrorBody {
    status_message: Option<String>,
}

fn discover_params(filter: &FilterQuery) -> String {
    let mut params = String::new();
    if let Some(genre) = filter.genre {
        params.push_str(&format!("&with_genres={genre}"));
    }
    if let Some(year) = filter.year {
        params.push_str(&format!("&primary_release_year={year}"));
    }
    if let Some(rating) = filter.min_rating {
        params.push_str(&format!("&vote_average.gte={rating}"));
    }
    params
}

pub fn poster_url(path: &str, size: &str) -> String {
    format!("{IMAGE_BASE}/{size}{path}")
}

pub fn backdrop_url(path: &str, size: &str) -> String {
    format!("{IMAGE_BASE}/{size}{path}")
}

pub fn extract_year(date: &str) -> Option<String> {
    date.split('-').next().map(|s| s.to_string())
}

/// First YouTube trailer, falling back to a teaser.
pub fn select_trailer(videos: &Videos) -> Option<String> {
    videos
        .results
        .iter()
        .find(|v| v.site.eq_ignore_ascii_case("YouTube") && v.video_type == "Trailer")
        .or_else(|| {
            videos
                .results
                .iter()
                .find(|v| v.site.eq_ignore_ascii_case("YouTube") && v.video_type == "Teaser")
        })
        .map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(site: &str, video_type: &str, key: &str) -> Video {
        Video {
            site: site.to_string(),
            video_type: video_type.to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn trailer_preferred_over_teaser() {
        let videos = Videos {
            results: vec![
                video("YouTube", "Teaser", "teaser-key"),
                video("YouTube", "Trailer", "trailer-key"),
                video("Vimeo", "Trailer", "vimeo-key"),
            ],
        };
        assert_eq!(
            select_trailer(&videos).as_deref(),
            Some("https://www.youtube.com/watch?v=trailer-key")
        );
    }

    #[test]
    fn teaser_used_when_no_trailer() {
        let videos = Videos {
            results: vec![video("YouTube", "Teaser", "teaser-key")],
        };
        assert_eq!(
            select_trailer(&videos).as_deref(),
            Some("https://www.youtube.com/watch?v=teaser-key")
        );
    }

    #[test]
    fn non_youtube_videos_ignored() {
        let videos = Videos {
            results: vec![video("Vimeo", "Trailer", "vimeo-key")],
        };
        assert_eq!(select_trailer(&videos), None);
    }

    #[test]
    fn discover_params_skip_absent_fields() {
        assert_eq!(discover_params(&FilterQuery::default()), "");
        let filter = FilterQuery {
            genre: Some(18),
            year: None,
            min_rating: Some(7.5),
        };
        assert_eq!(
            discover_params(&filter),
            "&with_genres=18&vote_average.gte=7.5"
        );
    }

    #[test]
    fn image_urls() {
        assert_eq!(
            poster_url("/abc.jpg", "w500"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
        assert_eq!(
            backdrop_url("/xyz.jpg", "original"),
            "https://image.tmdb.org/t/p/original/xyz.jpg"
        );
    }

    #[test]
    fn year_from_release_date() {
        assert_eq!(extract_year("1999-03-31").as_deref(), Some("1999"));
    }

    #[test]
    fn movie_tolerates_missing_optional_fields() {
        let movie: Movie = serde_json::from_str(r#"{"id": 603, "title": "The Matrix"}"#).unwrap();
        assert_eq!(movie.id, 603);
        assert!(movie.poster_path.is_none());
        assert!(movie.genre_ids.is_empty());
    }
}
