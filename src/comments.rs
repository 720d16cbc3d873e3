use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{COMMENTS, MAX_COMMENT_LENGTH};
use crate::core::errors::{ApiError, StoreError};
use crate::core::helpers::now_iso;
use crate::core::store::StoreClient;
use crate::mapper;
use crate::models::models::{Comment, CommentEdit, CommentRow, NewComment};

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("Comment {0} not found")]
    NotFound(i64),
    #[error("Only the author can change this comment")]
    NotAuthor,
    #[error("Comment is empty")]
    Empty,
    #[error("Comment exceeds {0} characters")]
    TooLong(usize),
    #[error("Content unchanged")]
    Unchanged,
    #[error("Comment is not being edited")]
    NotEditing,
    #[error("Deletion has not been confirmed")]
    NotConfirmed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CommentError> for ApiError {
    fn from(err: CommentError) -> Self {
        match err {
            CommentError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CommentError::NotAuthor => ApiError::Forbidden,
            CommentError::Store(inner) => inner.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CommentPhase {
    Viewing,
    Editing { draft: String },
    ConfirmingDelete,
}

#[derive(Serialize, Clone, Debug)]
pub struct CommentEntry {
    pub comment: Comment,
    pub phase: CommentPhase,
}

impl CommentEntry {
    pub fn is_author(&self, viewer: Option<&str>) -> bool {
        viewer.is_some() && self.comment.user_id.as_deref() == viewer
    }

    /// Edit and delete buttons are offered to the author while viewing.
    pub fn controls_visible(&self, viewer: Option<&str>) -> bool {
        self.is_author(viewer) && self.phase == CommentPhase::Viewing
    }

    pub fn is_edited(&self) -> bool {
        self.comment.edited_at.is_some()
    }

    /// The save button stays disabled until the draft differs from the
    /// stored content.
    pub fn can_submit(&self) -> bool {
        match &self.phase {
            CommentPhase::Editing { draft } => draft != &self.comment.content,
            _ => false,
        }
    }
}

fn validate(content: &str) -> Result<(), CommentError> {
    if content.trim().is_empty() {
        return Err(CommentError::Empty);
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CommentError::TooLong(MAX_COMMENT_LENGTH));
    }
    Ok(())
}

/// The comments under one concert plus the new-comment draft.
#[derive(Serialize, Clone, Debug, Default)]
pub struct CommentThread {
    pub concert_id: String,
    pub entries: Vec<CommentEntry>,
    pub draft: String,
}

impl CommentThread {
    pub fn new(concert_id: impl Into<String>, comments: Vec<Comment>) -> Self {
        Self {
            concert_id: concert_id.into(),
            entries: comments
                .into_iter()
                .map(|comment| CommentEntry {
                    comment,
                    phase: CommentPhase::Viewing,
                })
                .collect(),
            draft: String::new(),
        }
    }

    pub async fn load(store: &StoreClient, concert_id: &str) -> Result<Self, StoreError> {
        let rows: Vec<CommentRow> = store
            .relation(COMMENTS)
            .select("*")
            .eq("concert_id", concert_id)
            .order("created_at", true)
            .fetch()
            .await?;
        Ok(Self::new(concert_id, mapper::all(rows, mapper::comment)))
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.entries.iter().map(|e| &e.comment)
    }

    pub fn entry(&self, id: i64) -> Option<&CommentEntry> {
        self.entries.iter().find(|e| e.comment.id == id)
    }

    fn entry_mut(&mut self, id: i64) -> Result<&mut CommentEntry, CommentError> {
        self.entries
            .iter_mut()
            .find(|e| e.comment.id == id)
            .ok_or(CommentError::NotFound(id))
    }

    fn authored_mut(&mut self, id: i64, viewer: &str) -> Result<&mut CommentEntry, CommentError> {
        let entry = self.entry_mut(id)?;
        if !entry.is_author(Some(viewer)) {
            return Err(CommentError::NotAuthor);
        }
        Ok(entry)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn can_post(&self) -> bool {
        !self.draft.is_empty()
    }

    /// Store the draft as a new comment by `author` and append it.
    pub async fn post(&mut self, store: &StoreClient, author: &str) -> Result<&Comment, CommentError> {
        validate(&self.draft)?;

        let new_comment = NewComment {
            concert_id: &self.concert_id,
            user_id: author,
            content: &self.draft,
        };
        let rows: Vec<CommentRow> = store.relation(COMMENTS).insert(&new_comment).await.map_err(|err| {
            error!("{}", err.message());
            err
        })?;
        let comment = rows
            .into_iter()
            .next()
            .map(mapper::comment)
            .ok_or_else(|| StoreError::Decode("insert returned no comment".to_string()))?;

        info!(concert_id = %self.concert_id, comment_id = comment.id, "comment created");
        self.draft.clear();
        self.entries.push(CommentEntry {
            comment,
            phase: CommentPhase::Viewing,
        });
        Ok(&self.entries[self.entries.len() - 1].comment)
    }

    pub fn begin_edit(&mut self, id: i64, viewer: &str) -> Result<(), CommentError> {
        let entry = self.authored_mut(id, viewer)?;
        entry.phase = CommentPhase::Editing {
            draft: entry.comment.content.clone(),
        };
        Ok(())
    }

    pub fn update_draft(&mut self, id: i64, text: impl Into<String>) -> Result<(), CommentError> {
        let entry = self.entry_mut(id)?;
        match &mut entry.phase {
            CommentPhase::Editing { draft } => {
                *draft = text.into();
                Ok(())
            }
            _ => Err(CommentError::NotEditing),
        }
    }

    /// Leave edit mode; the stored content is shown again.
    pub fn cancel_edit(&mut self, id: i64) -> Result<(), CommentError> {
        let entry = self.entry_mut(id)?;
        entry.phase = CommentPhase::Viewing;
        Ok(())
    }

    /// Persist the draft. On failure the entry stays in edit mode with its
    /// draft intact.
    pub async fn submit_edit(&mut self, store: &StoreClient, id: i64, viewer: &str) -> Result<(), CommentError> {
        let entry = self.authored_mut(id, viewer)?;
        if !entry.can_submit() {
            return match entry.phase {
                CommentPhase::Editing { .. } => Err(CommentError::Unchanged),
                _ => Err(CommentError::NotEditing),
            };
        }
        let draft = match &entry.phase {
            CommentPhase::Editing { draft } => draft.clone(),
            _ => return Err(CommentError::NotEditing),
        };
        validate(&draft)?;

        let edited_at = now_iso();
        store
            .relation(COMMENTS)
            .eq("id", id)
            .update(&CommentEdit {
                content: &draft,
                edited_at: &edited_at,
            })
            .await
            .map_err(|err| {
                error!("{}", err.message());
                err
            })?;

        let entry = self.entry_mut(id)?;
        entry.comment.content = draft;
        entry.comment.edited_at = Some(edited_at);
        entry.phase = CommentPhase::Viewing;
        info!(comment_id = id, "comment edited");
        Ok(())
    }

    /// Open the confirmation step for deleting a comment.
    pub fn request_delete(&mut self, id: i64, viewer: &str) -> Result<(), CommentError> {
        let entry = self.authored_mut(id, viewer)?;
        entry.phase = CommentPhase::ConfirmingDelete;
        Ok(())
    }

    pub fn cancel_delete(&mut self, id: i64) -> Result<(), CommentError> {
        let entry = self.entry_mut(id)?;
        if entry.phase == CommentPhase::ConfirmingDelete {
            entry.phase = CommentPhase::Viewing;
        }
        Ok(())
    }

    /// Delete after confirmation and drop the comment from the thread.
    pub async fn confirm_delete(&mut self, store: &StoreClient, id: i64, viewer: &str) -> Result<Comment, CommentError> {
        let entry = self.authored_mut(id, viewer)?;
        if entry.phase != CommentPhase::ConfirmingDelete {
            return Err(CommentError::NotConfirmed);
        }

        store.relation(COMMENTS).eq("id", id).delete().await.map_err(|err| {
            error!("{}", err.message());
            err
        })?;

        let position = self
            .entries
            .iter()
            .position(|e| e.comment.id == id)
            .ok_or(CommentError::NotFound(id))?;
        info!(comment_id = id, "comment deleted");
        Ok(self.entries.remove(position).comment)
    }
}

/// Fetch a single comment, wrapped in a one-entry thread.
pub async fn load_single(store: &StoreClient, id: i64) -> Result<CommentThread, CommentError> {
    let rows: Vec<CommentRow> = store.relation(COMMENTS).select("*").eq("id", id).fetch().await?;
    let comment = rows
        .into_iter()
        .next()
        .map(mapper::comment)
        .ok_or(CommentError::NotFound(id))?;
    let concert_id = comment.concert_id.clone().unwrap_or_default();
    Ok(CommentThread::new(concert_id, vec![comment]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> CommentThread {
        CommentThread::new(
            "c1",
            vec![
                Comment {
                    id: 1,
                    concert_id: Some("c1".into()),
                    user_id: Some("ada".into()),
                    content: "Loud!".into(),
                    created_at: Some("2024-06-01T20:00:00Z".into()),
                    edited_at: None,
                },
                Comment {
                    id: 2,
                    concert_id: Some("c1".into()),
                    user_id: Some("bob".into()),
                    content: "Great setlist".into(),
                    created_at: Some("2024-06-01T21:00:00Z".into()),
                    edited_at: None,
                },
            ],
        )
    }

    #[test]
    fn unchanged_draft_cannot_be_submitted() {
        let mut thread = thread();
        thread.begin_edit(1, "ada").unwrap();
        assert!(!thread.entry(1).unwrap().can_submit());

        thread.update_draft(1, "Very loud!").unwrap();
        assert!(thread.entry(1).unwrap().can_submit());

        thread.update_draft(1, "Loud!").unwrap();
        assert!(!thread.entry(1).unwrap().can_submit());
    }

    #[test]
    fn only_author_sees_controls() {
        let thread = thread();
        let entry = thread.entry(1).unwrap();
        assert!(entry.controls_visible(Some("ada")));
        assert!(!entry.controls_visible(Some("bob")));
        assert!(!entry.controls_visible(None));
    }

    #[test]
    fn non_author_cannot_edit_or_delete() {
        let mut thread = thread();
        assert!(matches!(thread.begin_edit(1, "bob"), Err(CommentError::NotAuthor)));
        assert!(matches!(thread.request_delete(2, "ada"), Err(CommentError::NotAuthor)));
        assert!(matches!(thread.begin_edit(9, "ada"), Err(CommentError::NotFound(9))));
    }

    #[test]
    fn cancel_edit_restores_view() {
        let mut thread = thread();
        thread.begin_edit(1, "ada").unwrap();
        thread.update_draft(1, "changed").unwrap();
        thread.cancel_edit(1).unwrap();

        let entry = thread.entry(1).unwrap();
        assert_eq!(entry.phase, CommentPhase::Viewing);
        assert_eq!(entry.comment.content, "Loud!");
        assert!(matches!(thread.update_draft(1, "x"), Err(CommentError::NotEditing)));
    }

    #[test]
    fn delete_confirmation_can_be_dismissed() {
        let mut thread = thread();
        thread.request_delete(2, "bob").unwrap();
        assert_eq!(thread.entry(2).unwrap().phase, CommentPhase::ConfirmingDelete);
        assert!(!thread.entry(2).unwrap().controls_visible(Some("bob")));

        thread.cancel_delete(2).unwrap();
        assert_eq!(thread.entry(2).unwrap().phase, CommentPhase::Viewing);
    }

    #[test]
    fn empty_draft_cannot_be_posted() {
        let mut thread = thread();
        assert!(!thread.can_post());
        thread.set_draft("hello");
        assert!(thread.can_post());
        assert!(matches!(validate("   "), Err(CommentError::Empty)));
        assert!(matches!(validate(&"a".repeat(MAX_COMMENT_LENGTH + 1)), Err(CommentError::TooLong(_))));
    }

    #[test]
    fn length_limit_counts_characters() {
        assert!(validate(&"ü".repeat(MAX_COMMENT_LENGTH)).is_ok());
        assert!(matches!(validate(&"ü".repeat(MAX_COMMENT_LENGTH + 1)), Err(CommentError::TooLong(_))));
    }
}
