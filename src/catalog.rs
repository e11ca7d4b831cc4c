use crate::store::{Action, Store};
use crate::tmdb::{FilterQuery, Movie, Page, TmdbApi};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Which slice of the catalogue a request is looking at. A search term
/// wins over filters; with neither, the listing shows trending titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogView {
    Trending,
    Search,
    Filter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub genre: Option<i32>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
    pub page: Option<u32>,
    pub append: Option<bool>,
}

impl CatalogQuery {
    pub fn filter(&self) -> FilterQuery {
        FilterQuery {
            genre: self.genre,
            year: self.year,
            min_rating: self.min_rating,
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    pub fn view(&self) -> CatalogView {
        if self.search_term().is_some() {
            CatalogView::Search
        } else if !self.filter().is_empty() {
            CatalogView::Filter
        } else {
            CatalogView::Trending
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BrowseOutcome {
    pub view: CatalogView,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
}

/// Fetches one listing page and folds it into the store.
///
/// Page one replaces the listing; `append=true` on a later page extends
/// it. A search landing on page one is recorded as the last search. Any
/// upstream failure lands in the store's error flag before propagating.
pub async fn browse(tmdb: &dyn TmdbApi, store: &Store, query: &CatalogQuery) -> Result<BrowseOutcome> {
    let page = query.page.unwrap_or(1).max(1);
    let append = query.append.unwrap_or(false) && page > 1;
    let view = query.view();

    store.dispatch(Action::SetLoading(true)).await;

    let fetched: Result<Page<Movie>> = match view {
        CatalogView::Search => {
            // search_term() is Some here, view() said so
            let term = query.search_term().unwrap_or_default().to_string();
            let result = tmdb.search_movies(&term, page).await;
            if result.is_ok() && page == 1 {
                store.dispatch(Action::SetLastSearched(term)).await;
            }
            result
        }
        CatalogView::Filter => tmdb.discover_movies(&query.filter(), page).await,
        CatalogView::Trending => tmdb.fetch_trending(page).await,
    };

    match fetched {
        Ok(listing) => {
            let outcome = BrowseOutcome {
                view,
                page: listing.page,
                total_pages: listing.total_pages,
                total_results: listing.total_results,
            };
            let action = if append {
                Action::AppendMovies(listing.results)
            } else {
                Action::SetMovies(listing.results)
            };
            store.dispatch(action).await;
            Ok(outcome)
        }
        Err(e) => {
            store.dispatch(Action::SetError(format!("{e:#}"))).await;
            Err(e)
        }
    }
}

/// Reloads the trending rail. Independent of the listing: the rail keeps
/// its own slice of state and always shows page one.
pub async fn refresh_trending(tmdb: &dyn TmdbApi, store: &Store) -> Result<Vec<Movie>> {
    store.dispatch(Action::SetLoading(true)).await;
    match tmdb.fetch_trending(1).await {
        Ok(listing) => {
            store.dispatch(Action::SetTrending(listing.results.clone())).await;
            Ok(listing.results)
        }
        Err(e) => {
            store.dispatch(Action::SetError(format!("{e:#}"))).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use anyhow::bail;

    struct ScriptedTmdb {
        fail: bool,
    }

    fn sample(id: i32) -> Movie {
        Movie {
            id,
            title: format!("Movie {id}"),
            poster_path: None,
            backdrop_path: None,
            release_date: None,
            vote_average: 0.0,
            overview: String::new(),
            genre_ids: Vec::new(),
        }
    }

    fn listing(page: u32) -> Page<Movie> {
        Page {
            page,
            results: vec![sample(page as i32 * 10)],
            total_pages: 3,
            total_results: 60,
        }
    }

    #[async_trait::async_trait]
    impl TmdbApi for ScriptedTmdb {
        async fn fetch_trending(&self, page: u32) -> Result<Page<Movie>> {
            if self.fail {
                bail!("TMDB 500 Internal Server Error -> upstream exploded");
            }
            Ok(listing(page))
        }

        async fn search_movies(&self, _query: &str, page: u32) -> Result<Page<Movie>> {
            if self.fail {
                bail!("TMDB 500 Internal Server Error -> upstream exploded");
            }
            Ok(listing(page))
        }

        async fn discover_movies(&self, _filter: &FilterQuery, page: u32) -> Result<Page<Movie>> {
            if self.fail {
                bail!("TMDB 500 Internal Server Error -> upstream exploded");
            }
            Ok(listing(page))
        }

        async fn fetch_genres(&self) -> Result<Vec<crate::tmdb::Genre>> {
            Ok(Vec::new())
        }

        async fn fetch_movie(&self, _id: i32) -> Result<crate::tmdb::MovieDetail> {
            bail!("not used here");
        }
    }

    #[tokio::test]
    async fn failure_sets_error_and_next_success_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(LocalStorage::new(dir.path()));

        let broken = ScriptedTmdb { fail: true };
        assert!(browse(&broken, &store, &CatalogQuery::default()).await.is_err());
        let state = store.snapshot().await;
        assert!(state.error.is_some());
        assert!(!state.loading);

        let working = ScriptedTmdb { fail: false };
        browse(&working, &store, &CatalogQuery::default()).await.unwrap();
        let state = store.snapshot().await;
        assert!(state.error.is_none());
        assert!(!state.loading);
        assert_eq!(state.movies.len(), 1);
    }

    #[tokio::test]
    async fn last_search_recorded_only_on_page_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(LocalStorage::new(dir.path()));
        let tmdb = ScriptedTmdb { fail: false };

        let later_page = CatalogQuery {
            search: Some("alien".to_string()),
            page: Some(2),
            append: Some(true),
            ..CatalogQuery::default()
        };
        browse(&tmdb, &store, &later_page).await.unwrap();
        assert!(store.snapshot().await.last_searched.is_none());

        let first_page = CatalogQuery {
            search: Some("alien".to_string()),
            ..CatalogQuery::default()
        };
        browse(&tmdb, &store, &first_page).await.unwrap();
        assert_eq!(
            store.snapshot().await.last_searched.as_deref(),
            Some("alien")
        );
    }

    #[tokio::test]
    async fn failed_search_does_not_record_the_term() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(LocalStorage::new(dir.path()));
        let broken = ScriptedTmdb { fail: true };

        let query = CatalogQuery {
            search: Some("alien".to_string()),
            ..CatalogQuery::default()
        };
        assert!(browse(&broken, &store, &query).await.is_err());
        assert!(store.snapshot().await.last_searched.is_none());
    }

    #[test]
    fn view_selection_prefers_search() {
        let query = CatalogQuery {
            search: Some("alien".to_string()),
            genre: Some(878),
            ..CatalogQuery::default()
        };
        assert_eq!(query.view(), CatalogView::Search);
    }

    #[test]
    fn blank_search_falls_through_to_filters() {
        let query = CatalogQuery {
            search: Some("   ".to_string()),
            year: Some(1986),
            ..CatalogQuery::default()
        };
        assert_eq!(query.view(), CatalogView::Filter);
    }

    #[test]
    fn no_constraints_means_trending() {
        assert_eq!(CatalogQuery::default().view(), CatalogView::Trending);
    }
}
