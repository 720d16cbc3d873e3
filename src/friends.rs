use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{FRIENDS, FRIEND_SELECT};
use crate::core::errors::{ApiError, StoreError};
use crate::core::helpers::now_iso;
use crate::core::store::StoreClient;
use crate::mapper;
use crate::models::models::{Friend, FriendAcceptance, FriendRequest, FriendRow, Profile};

/// The edge between two users as seen by one of them.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendState {
    Absent,
    PendingSent,
    PendingReceived,
    Accepted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FriendAction {
    Send,
    Accept,
    Cancel,
    Remove,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {action:?} a friendship in state {state:?}")]
pub struct TransitionError {
    pub state: FriendState,
    pub action: FriendAction,
}

impl FriendState {
    pub fn of(edges: &[Friend], viewer: &str, other: &str) -> Self {
        match edges.iter().find(|e| e.connects(viewer, other)) {
            None => FriendState::Absent,
            Some(edge) if !edge.pending => FriendState::Accepted,
            Some(edge) if edge.sender_id == viewer => FriendState::PendingSent,
            Some(_) => FriendState::PendingReceived,
        }
    }

    pub fn apply(self, action: FriendAction) -> Result<FriendState, TransitionError> {
        match (self, action) {
            (FriendState::Absent, FriendAction::Send) => Ok(FriendState::PendingSent),
            (FriendState::PendingReceived, FriendAction::Accept) => Ok(FriendState::Accepted),
            (FriendState::PendingSent | FriendState::PendingReceived, FriendAction::Cancel) => Ok(FriendState::Absent),
            (FriendState::Accepted, FriendAction::Remove) => Ok(FriendState::Absent),
            (state, action) => Err(TransitionError { state, action }),
        }
    }
}

#[derive(Debug, Error)]
pub enum FriendError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("cannot befriend yourself")]
    SelfRequest,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FriendError> for ApiError {
    fn from(err: FriendError) -> Self {
        match err {
            FriendError::Transition(inner) => ApiError::Conflict(inner.to_string()),
            FriendError::SelfRequest => ApiError::BadRequest(err.to_string()),
            FriendError::Store(inner) => inner.into(),
        }
    }
}

/// Result of an optimistic mutation.
#[derive(Debug)]
pub enum Outcome<E> {
    Applied,
    Reverted(E),
}

impl<E> Outcome<E> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn into_result(self) -> Result<(), E> {
        match self {
            Outcome::Applied => Ok(()),
            Outcome::Reverted(err) => Err(err),
        }
    }
}

/// How the viewer relates to the profile being shown.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProfileRelation {
    pub own: bool,
    pub friend: bool,
    pub pending: bool,
}

impl ProfileRelation {
    pub fn new(profile_id: &str, viewer: Option<&str>, edges: &[Friend]) -> Self {
        let Some(viewer) = viewer else {
            return Self {
                own: false,
                friend: false,
                pending: false,
            };
        };

        let own = viewer == profile_id;
        Self {
            own,
            friend: !own && edges.iter().any(|e| !e.pending && e.involves(viewer)),
            pending: edges.iter().any(|e| e.pending && e.involves(viewer)),
        }
    }

    pub fn can_add_friend(&self, signed_in: bool) -> bool {
        signed_in && !self.own && !self.friend && !self.pending
    }
}

/// Every edge touching one profile, with derived views.
#[derive(Serialize, Clone, Debug, Default)]
pub struct FriendBook {
    pub profile_id: String,
    pub edges: Vec<Friend>,
}

impl FriendBook {
    pub fn new(profile_id: impl Into<String>, edges: Vec<Friend>) -> Self {
        Self {
            profile_id: profile_id.into(),
            edges,
        }
    }

    pub async fn load(store: &StoreClient, profile_id: &str) -> Result<Self, StoreError> {
        let rows: Vec<FriendRow> = store
            .relation(FRIENDS)
            .select(FRIEND_SELECT)
            .or(&format!("sender_id.eq.{0},receiver_id.eq.{0}", profile_id))
            .fetch()
            .await?;
        Ok(Self::new(profile_id, mapper::all(rows, mapper::friend)))
    }

    pub fn sent(&self) -> Vec<&Friend> {
        self.edges
            .iter()
            .filter(|e| e.pending && e.sender_id == self.profile_id)
            .collect()
    }

    pub fn received(&self) -> Vec<&Friend> {
        self.edges
            .iter()
            .filter(|e| e.pending && e.receiver_id == self.profile_id)
            .collect()
    }

    pub fn friends(&self) -> Vec<&Profile> {
        self.edges
            .iter()
            .filter(|e| !e.pending)
            .filter_map(|e| e.other(&self.profile_id))
            .collect()
    }

    pub fn state_with(&self, other: &str) -> FriendState {
        FriendState::of(&self.edges, &self.profile_id, other)
    }

    /// Send a request from this profile to `receiver`. Refused when any edge
    /// already joins the pair, in either direction.
    pub async fn send(&mut self, store: &StoreClient, receiver: &str) -> Outcome<FriendError> {
        if receiver == self.profile_id {
            return Outcome::Reverted(FriendError::SelfRequest);
        }
        if let Err(err) = self.state_with(receiver).apply(FriendAction::Send) {
            return Outcome::Reverted(err.into());
        }

        let request = FriendRequest {
            sender_id: &self.profile_id,
            receiver_id: receiver,
        };
        match store.relation(FRIENDS).insert::<_, FriendRow>(&request).await {
            Ok(rows) => {
                self.edges.extend(rows.into_iter().map(mapper::friend));
                info!(sender = %self.profile_id, receiver, "friend request sent");
                Outcome::Applied
            }
            Err(err) => {
                error!("{}", err.message());
                Outcome::Reverted(err.into())
            }
        }
    }

    /// Confirm a request received from `sender`.
    pub async fn accept(&mut self, store: &StoreClient, sender: &str) -> Outcome<FriendError> {
        if let Err(err) = self.state_with(sender).apply(FriendAction::Accept) {
            return Outcome::Reverted(err.into());
        }

        let accepted_at = now_iso();
        let profile_id = self.profile_id.clone();
        self.mutate(
            |edges| mark_accepted(edges, sender, &profile_id, &accepted_at),
            store
                .relation(FRIENDS)
                .eq("sender_id", sender)
                .eq("receiver_id", &profile_id)
                .update(&FriendAcceptance {
                    pending: false,
                    accepted_at: &accepted_at,
                }),
        )
        .await
    }

    /// Withdraw a sent request or reject a received one.
    pub async fn cancel(&mut self, store: &StoreClient, other: &str) -> Outcome<FriendError> {
        let state = self.state_with(other);
        if let Err(err) = state.apply(FriendAction::Cancel) {
            return Outcome::Reverted(err.into());
        }

        let (sender, receiver) = match state {
            FriendState::PendingSent => (self.profile_id.clone(), other.to_string()),
            _ => (other.to_string(), self.profile_id.clone()),
        };
        self.mutate(
            |edges| edges.retain(|e| !(e.sender_id == sender && e.receiver_id == receiver)),
            store
                .relation(FRIENDS)
                .eq("sender_id", &sender)
                .eq("receiver_id", &receiver)
                .delete(),
        )
        .await
    }

    /// End an accepted friendship, whichever side sent the original request.
    pub async fn remove(&mut self, store: &StoreClient, other: &str) -> Outcome<FriendError> {
        if let Err(err) = self.state_with(other).apply(FriendAction::Remove) {
            return Outcome::Reverted(err.into());
        }

        let me = self.profile_id.clone();
        let pair = format!(
            "and(sender_id.eq.{0},receiver_id.eq.{1}),and(sender_id.eq.{1},receiver_id.eq.{0})",
            me, other
        );
        self.mutate(
            |edges| edges.retain(|e| !e.connects(&me, other)),
            store.relation(FRIENDS).or(&pair).delete(),
        )
        .await
    }

    /// Apply `local` right away, then await the store. On failure the edge
    /// list goes back to its snapshot.
    async fn mutate<F>(&mut self, local: impl FnOnce(&mut Vec<Friend>), remote: F) -> Outcome<FriendError>
    where
        F: std::future::Future<Output = Result<(), StoreError>>,
    {
        let snapshot = self.edges.clone();
        local(&mut self.edges);

        match remote.await {
            Ok(()) => Outcome::Applied,
            Err(err) => {
                error!("{}", err.message());
                self.edges = snapshot;
                Outcome::Reverted(err.into())
            }
        }
    }
}

/// The confirmed invite stops being pending, so it leaves both the sent and
/// the received lists.
fn mark_accepted(edges: &mut [Friend], sender: &str, receiver: &str, accepted_at: &str) {
    let accepted = edges
        .iter_mut()
        .filter(|e| e.sender_id == sender && e.receiver_id == receiver);
    for edge in accepted {
        edge.pending = false;
        edge.accepted_at = Some(accepted_at.to_string());
    }
}
