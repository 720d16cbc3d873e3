use ammonia::Builder;
use html_escape::decode_html_entities;
use serde::Deserialize;
use tracing::info;

use crate::config::{MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH, PROFILES};
use crate::core::errors::{ApiError, StoreError};
use crate::core::store::StoreClient;
use crate::models::models::{Profile, ProfileUpdate};

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

/// Strips every tag and returns raw text; escaping happens at render time.
fn sanitize_text(text: &str) -> String {
    let cleaned = Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string();
    decode_html_entities(&cleaned).trim().to_string()
}

pub async fn load_by_username(store: &StoreClient, username: &str) -> Result<Profile, StoreError> {
    store
        .relation(PROFILES)
        .select("*")
        .eq("username", username)
        .single()
        .await
}

pub async fn load_by_id(store: &StoreClient, id: &str) -> Result<Profile, StoreError> {
    store.relation(PROFILES).select("*").eq("id", id).single().await
}

pub async fn load_many(store: &StoreClient, ids: &[String]) -> Result<Vec<Profile>, StoreError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    store.relation(PROFILES).select("*").is_in("id", ids).fetch().await
}

/// Validate and clean an edit-profile submission.
pub fn prepare_update(update: &ProfileUpdate) -> Result<ProfileUpdate, ApiError> {
    let username = match update.username.as_deref() {
        Some(raw) => {
            let clean = sanitize_text(raw.trim());
            let length = clean.chars().count();
            if length < MIN_USERNAME_LENGTH || length > MAX_USERNAME_LENGTH {
                return Err(ApiError::BadRequest(format!(
                    "Username must be {}-{} characters",
                    MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
                )));
            }
            Some(clean)
        }
        None => None,
    };

    let avatar_path = match update.avatar_path.as_deref() {
        Some(path) if path.contains("..") || path.starts_with('/') => {
            return Err(ApiError::BadRequest("Invalid avatar path".to_string()));
        }
        other => other.map(str::to_string),
    };

    if username.is_none() && avatar_path.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    Ok(ProfileUpdate { username, avatar_path })
}

pub async fn update_profile(store: &StoreClient, user_id: &str, update: &ProfileUpdate) -> Result<Profile, ApiError> {
    let update = prepare_update(update)?;

    if let Some(username) = update.username.as_deref() {
        let taken: Vec<IdRow> = store.relation(PROFILES).select("id").eq("username", username).fetch().await?;
        if taken.iter().any(|p| p.id != user_id) {
            return Err(ApiError::Conflict("Username exists".to_string()));
        }
    }

    store.relation(PROFILES).eq("id", user_id).update(&update).await?;
    info!(user_id, "profile updated");
    Ok(load_by_id(store, user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_cleaned_and_bounded() {
        let update = ProfileUpdate {
            username: Some("  <b>ada</b>  ".to_string()),
            avatar_path: None,
        };
        assert_eq!(prepare_update(&update).unwrap().username.as_deref(), Some("ada"));

        let short = ProfileUpdate {
            username: Some("ab".to_string()),
            avatar_path: None,
        };
        assert!(matches!(prepare_update(&short), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn username_keeps_plain_text_characters() {
        let update = ProfileUpdate {
            username: Some("R&B Fan".to_string()),
            avatar_path: None,
        };
        assert_eq!(prepare_update(&update).unwrap().username.as_deref(), Some("R&B Fan"));

        let quoted = ProfileUpdate {
            username: Some("\"Metal\" <i>Müller</i>".to_string()),
            avatar_path: None,
        };
        assert_eq!(prepare_update(&quoted).unwrap().username.as_deref(), Some("\"Metal\" Müller"));
    }

    #[test]
    fn username_length_counts_characters() {
        let umlauts = ProfileUpdate {
            username: Some("ö".repeat(MAX_USERNAME_LENGTH)),
            avatar_path: None,
        };
        assert!(prepare_update(&umlauts).is_ok());

        let too_long = ProfileUpdate {
            username: Some("ö".repeat(MAX_USERNAME_LENGTH + 1)),
            avatar_path: None,
        };
        assert!(prepare_update(&too_long).is_err());
    }

    #[test]
    fn avatar_path_must_stay_in_bucket() {
        let bad = ProfileUpdate {
            username: None,
            avatar_path: Some("../secret.png".to_string()),
        };
        assert!(prepare_update(&bad).is_err());

        let good = ProfileUpdate {
            username: None,
            avatar_path: Some("u1/avatar.png".to_string()),
        };
        assert_eq!(prepare_update(&good).unwrap().avatar_path.as_deref(), Some("u1/avatar.png"));
        assert!(prepare_update(&ProfileUpdate::default()).is_err());
    }
}
