use crate::session::User;
use crate::storage::LocalStorage;
use crate::tmdb::Movie;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const FAVORITES_KEY: &str = "favorites";
pub const LAST_SEARCHED_KEY: &str = "last_searched";
pub const USER_KEY: &str = "user";

/// Client-side application state, managed by a single reducer.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub movies: Vec<Movie>,
    pub trending: Vec<Movie>,
    pub favorites: Vec<Movie>,
    pub last_searched: Option<String>,
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetMovies(Vec<Movie>),
    AppendMovies(Vec<Movie>),
    SetTrending(Vec<Movie>),
    SetLastSearched(String),
    AddFavorite(Movie),
    RemoveFavorite(i32),
    SetLoading(bool),
    SetError(String),
    ClearError,
    LoginUser(User),
    Logout,
}

/// Applies one action. Successful fetches clear the error flag and drop
/// the loading flag; favorites stay unique by id.
pub fn reduce(state: &mut State, action: Action) {
    match action {
        Action::SetMovies(movies) => {
            state.movies = movies;
            state.loading = false;
            state.error = None;
        }
        Action::AppendMovies(movies) => {
            for movie in movies {
                if !state.movies.iter().any(|m| m.id == movie.id) {
                    state.movies.push(movie);
                }
            }
            state.loading = false;
            state.error = None;
        }
        Action::SetTrending(movies) => {
            state.trending = movies;
            state.loading = false;
            state.error = None;
        }
        Action::SetLastSearched(term) => {
            state.last_searched = Some(term);
        }
        Action::AddFavorite(movie) => {
            if !state.favorites.iter().any(|m| m.id == movie.id) {
                state.favorites.push(movie);
            }
        }
        Action::RemoveFavorite(id) => {
            state.favorites.retain(|m| m.id != id);
        }
        Action::SetLoading(loading) => {
            state.loading = loading;
        }
        Action::SetError(message) => {
            state.error = Some(message);
            state.loading = false;
        }
        Action::ClearError => {
            state.error = None;
        }
        Action::LoginUser(user) => {
            state.user = Some(user);
        }
        Action::Logout => {
            state.user = None;
        }
    }
}

/// The store pairs the reducer with local storage: favorites, the last
/// search and the session record are mirrored on every mutation and
/// hydrated back on open.
pub struct Store {
    state: Mutex<State>,
    storage: LocalStorage,
}

enum Mirrored {
    Favorites,
    LastSearched,
    User,
}

impl Store {
    pub fn open(storage: LocalStorage) -> Self {
        let state = State {
            favorites: storage.get(FAVORITES_KEY).unwrap_or_default(),
            last_searched: storage.get(LAST_SEARCHED_KEY),
            user: storage.get(USER_KEY),
            ..State::default()
        };
        if !state.favorites.is_empty() {
            info!("Hydrated {} stored favorite(s)", state.favorites.len());
        }
        Self {
            state: Mutex::new(state),
            storage,
        }
    }

    pub async fn dispatch(&self, action: Action) {
        let mirrored = match &action {
            Action::AddFavorite(_) | Action::RemoveFavorite(_) => Some(Mirrored::Favorites),
            Action::SetLastSearched(_) => Some(Mirrored::LastSearched),
            Action::LoginUser(_) | Action::Logout => Some(Mirrored::User),
            _ => None,
        };

        let mut state = self.state.lock().await;
        let favorites_before = state.favorites.len();
        reduce(&mut state, action);

        match mirrored {
            Some(Mirrored::Favorites) => {
                if state.favorites.len() != favorites_before {
                    self.mirror(FAVORITES_KEY, &state.favorites);
                }
            }
            Some(Mirrored::LastSearched) => {
                if let Some(term) = &state.last_searched {
                    self.mirror(LAST_SEARCHED_KEY, term);
                }
            }
            Some(Mirrored::User) => match &state.user {
                Some(user) => self.mirror(USER_KEY, user),
                None => {
                    if let Err(e) = self.storage.remove(USER_KEY) {
                        warn!("Failed to clear stored session: {:#}", e);
                    }
                }
            },
            None => {}
        }
    }

    pub async fn snapshot(&self) -> State {
        self.state.lock().await.clone()
    }

    // A failed mirror write is logged and the in-memory state stays
    // authoritative.
    fn mirror<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.storage.set(key, value) {
            warn!("Failed to persist '{}': {:#}", key, e);
        }
    }
}
