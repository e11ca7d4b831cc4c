//! Fallback genre table in case the live genre fetch fails, matching the
//! ids TMDB assigns to movie genres.
use crate::tmdb::Genre;
use once_cell::sync::Lazy;

static FALLBACK_GENRES: Lazy<Vec<Genre>> = Lazy::new(|| {
    [
        (28, "Action"),
        (12, "Adventure"),
        (16, "Animation"),
        (35, "Comedy"),
        (80, "Crime"),
        (99, "Documentary"),
        (18, "Drama"),
        (10751, "Family"),
        (14, "Fantasy"),
        (36, "History"),
        (27, "Horror"),
        (10402, "Music"),
        (9648, "Mystery"),
        (10749, "Romance"),
        (878, "Science Fiction"),
        (10770, "TV Movie"),
        (53, "Thriller"),
        (10752, "War"),
        (37, "Western"),
    ]
    .iter()
    .map(|(id, name)| Genre {
        id: *id,
        name: (*name).to_string(),
    })
    .collect()
});

pub fn fallback_genres() -> Vec<Genre> {
    FALLBACK_GENRES.clone()
}
