use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A locally fabricated user. Nothing here is checked against a backend;
/// logging in just mints a record and stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub join_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn fabricate_user(request: &LoginRequest) -> Result<User> {
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or_default()
        .to_string();
    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        });
    let Some(username) = username else {
        bail!("login requires a username or an email");
    };

    // Avatar is derived from whatever the form supplied, username first.
    let display_name = if request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .is_some()
    {
        username.clone()
    } else {
        email.clone()
    };

    let now = Utc::now();
    Ok(User {
        id: now.timestamp_millis(),
        username,
        email,
        avatar: format!(
            "https://ui-avatars.com/api/?name={}&background=random",
            urlencoding::encode(&display_name)
        ),
        join_date: now.to_rfc3339(),
    })
}
