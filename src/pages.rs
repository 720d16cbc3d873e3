//! Page-level loaders.
//!
//! Each loader fetches everything a page needs before it is rendered. A
//! failed required fetch fails the page; a failed optional fetch is logged
//! and the page renders with that part empty.

use serde::Serialize;
use tracing::{info, warn};

use crate::avatars::{load_avatar, AvatarSlot, ObjectUrls};
use crate::comments::CommentThread;
use crate::concerts::{self, filter::ConcertFilter};
use crate::core::errors::{ApiError, StoreError};
use crate::friends::{FriendBook, ProfileRelation};
use crate::models::models::{Band, BandSeen, Concert, Friend, Location, Profile};
use crate::profiles;
use crate::session::Session;
use crate::stats::{unique_by, ProfileStats};

/// Unwrap an optional fetch, logging and defaulting on failure.
fn optional<T: Default>(what: &str, result: Result<T, StoreError>) -> T {
    result.unwrap_or_else(|err| {
        warn!("optional fetch of {} failed: {}", what, err.message());
        T::default()
    })
}

#[derive(Serialize, Clone, Debug)]
pub struct ConcertCard {
    pub concert: Concert,
    /// Bands the viewer marked as seen at this concert.
    pub bands_seen: Vec<i64>,
}

#[derive(Serialize, Clone, Debug)]
pub struct HomeView {
    pub concerts: Vec<ConcertCard>,
    pub total: usize,
    pub filtered_count: Option<usize>,
    pub filter: ConcertFilter,
    pub bands: Vec<Band>,
    pub locations: Vec<Location>,
}

impl HomeView {
    pub fn build(
        all: Vec<Concert>,
        filter: ConcertFilter,
        bands: Vec<Band>,
        locations: Vec<Location>,
        seen: &[BandSeen],
    ) -> Self {
        let concerts = filter
            .apply(&all)
            .into_iter()
            .map(|concert| ConcertCard {
                bands_seen: seen
                    .iter()
                    .filter(|row| row.concert_id == concert.id)
                    .map(|row| row.band_id)
                    .collect(),
                concert: concert.clone(),
            })
            .collect();

        Self {
            total: all.len(),
            filtered_count: filter.filtered_count(&all),
            concerts,
            filter,
            bands,
            locations,
        }
    }
}

pub async fn load_home(session: &Session, filter: ConcertFilter) -> Result<HomeView, ApiError> {
    let store = &session.store;
    let seen = async {
        match session.user_id() {
            Some(user_id) => concerts::load_bands_seen(store, user_id).await,
            None => Ok(Vec::new()),
        }
    };
    let (all, bands, locations, seen) = tokio::join!(
        concerts::load_all(store),
        concerts::load_bands(store),
        concerts::load_locations(store),
        seen
    );

    let all = optional("concerts", all);
    let bands = optional("bands", bands);
    let locations = optional("locations", locations);
    let seen = optional("bands seen", seen);

    Ok(HomeView::build(all, filter, bands, locations, &seen))
}

#[derive(Serialize, Clone, Debug)]
pub struct ConcertView {
    pub concert: Concert,
    pub bands: Vec<Band>,
    pub comments: CommentThread,
    pub profiles: Vec<Profile>,
    pub viewer: Option<String>,
}

impl ConcertView {
    pub fn author(&self, user_id: Option<&str>) -> Option<&Profile> {
        user_id.and_then(|id| self.profiles.iter().find(|p| p.id == id))
    }
}

pub async fn load_concert(session: &Session, concert_id: &str) -> Result<ConcertView, ApiError> {
    let store = &session.store;
    let concert = concerts::load_one(store, concert_id).await?;
    let bands = optional("bands", concerts::load_bands(store).await);
    let comments = CommentThread::load(store, concert_id)
        .await
        .unwrap_or_else(|err| {
            warn!("optional fetch of comments failed: {}", err.message());
            CommentThread::new(concert_id, Vec::new())
        });

    let author_ids = unique_by(comments.comments().filter_map(|c| c.user_id.clone()), |id| id.clone());
    let profiles = optional("comment authors", profiles::load_many(store, &author_ids).await);

    Ok(ConcertView {
        concert,
        bands,
        comments,
        profiles,
        viewer: session.user_id().map(str::to_string),
    })
}

#[derive(Serialize, Clone, Debug)]
pub struct FriendCard {
    pub profile: Profile,
    pub avatar: AvatarSlot,
}

#[derive(Serialize, Clone, Debug)]
pub struct InviteCard {
    pub invite: Friend,
    /// The other side of the invite.
    pub profile: Option<Profile>,
    pub avatar: AvatarSlot,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct Invites {
    pub sent: Vec<InviteCard>,
    pub received: Vec<InviteCard>,
}

#[derive(Serialize, Clone, Debug)]
pub struct ProfileView {
    pub profile: Profile,
    pub avatar: AvatarSlot,
    pub relation: ProfileRelation,
    pub can_add_friend: bool,
    pub stats: ProfileStats,
    pub friends: Vec<FriendCard>,
    /// Only present on the viewer's own profile.
    pub invites: Option<Invites>,
}

async fn invite_cards(session: &Session, urls: &ObjectUrls, book: &FriendBook, invites: Vec<&Friend>) -> Vec<InviteCard> {
    let mut cards = Vec::with_capacity(invites.len());
    for invite in invites {
        let profile = invite.other(&book.profile_id).cloned();
        let avatar = load_avatar(
            &session.store,
            profile.as_ref().and_then(|p| p.avatar_path.as_deref()),
            urls,
        )
        .await;
        cards.push(InviteCard {
            invite: invite.clone(),
            profile,
            avatar,
        });
    }
    cards
}

pub async fn load_profile(session: &Session, urls: &ObjectUrls, username: &str) -> Result<ProfileView, ApiError> {
    let store = &session.store;
    let profile = profiles::load_by_username(store, username).await?;
    let (rows, book) = tokio::join!(
        concerts::load_bands_seen_full(store, &profile.id),
        FriendBook::load(store, &profile.id)
    );
    let rows = rows?;
    let book = book.unwrap_or_else(|err| {
        warn!("optional fetch of friends failed: {}", err.message());
        FriendBook::new(profile.id.clone(), Vec::new())
    });

    let avatar = load_avatar(store, profile.avatar_path.as_deref(), urls).await;
    let relation = ProfileRelation::new(&profile.id, session.user_id(), &book.edges);

    let mut friends = Vec::new();
    for friend in book.friends() {
        let avatar = load_avatar(store, friend.avatar_path.as_deref(), urls).await;
        friends.push(FriendCard {
            profile: friend.clone(),
            avatar,
        });
    }

    let invites = if relation.own {
        Some(Invites {
            sent: invite_cards(session, urls, &book, book.sent()).await,
            received: invite_cards(session, urls, &book, book.received()).await,
        })
    } else {
        None
    };

    info!(username, rows = rows.len(), "profile loaded");
    Ok(ProfileView {
        can_add_friend: relation.can_add_friend(session.user.is_some()),
        stats: ProfileStats::from_rows(&rows),
        profile,
        avatar,
        relation,
        friends,
        invites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concerts::filter::SortMode;

    fn concert(id: &str, date: &str) -> Concert {
        Concert {
            id: id.to_string(),
            date_start: Some(date.to_string()),
            date_end: None,
            name: None,
            is_festival: false,
            is_public: true,
            location: None,
            bands: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn home_view_attaches_seen_bands() {
        let all = vec![concert("1", "2024-01-01"), concert("2", "2024-06-01")];
        let seen = vec![
            BandSeen {
                concert_id: "1".into(),
                user_id: "u".into(),
                band_id: 7,
            },
            BandSeen {
                concert_id: "1".into(),
                user_id: "u".into(),
                band_id: 8,
            },
        ];

        let view = HomeView::build(all, ConcertFilter::default(), Vec::new(), Vec::new(), &seen);
        assert_eq!(view.total, 2);
        assert_eq!(view.filtered_count, None);
        assert_eq!(view.filter.sort, SortMode::DateAsc);
        assert_eq!(view.concerts[0].concert.id, "2");
        assert!(view.concerts[0].bands_seen.is_empty());
        assert_eq!(view.concerts[1].bands_seen, vec![7, 8]);
    }
}
