//! Raw joined rows into entities.
//!
//! Relations that are missing, null, or only present as a foreign key resolve
//! to `None`; list relations resolve to an empty list. Nothing else is
//! validated.

use crate::models::models::{
    Band, BandRow, BandSeen, BandSeenFull, BandSeenRow, Comment, CommentRow, Concert, ConcertRow,
    Friend, FriendRow, Joined,
};

fn resolve<T>(relation: Option<Joined<T>>) -> Option<T> {
    match relation {
        Some(Joined::Expanded(value)) => Some(value),
        Some(Joined::Key(_)) | None => None,
    }
}

pub fn band(row: BandRow) -> Band {
    Band {
        id: row.id,
        name: row.name,
        country: resolve(row.country),
        genres: row.genres.unwrap_or_default(),
    }
}

pub fn concert(row: ConcertRow) -> Concert {
    Concert {
        id: row.id,
        date_start: row.date_start,
        date_end: row.date_end,
        name: row.name,
        is_festival: row.is_festival.unwrap_or(false),
        is_public: row.is_public.unwrap_or(false),
        location: resolve(row.location),
        bands: row.bands.unwrap_or_default().into_iter().map(band).collect(),
        created_at: row.created_at,
    }
}

pub fn band_seen(row: &BandSeenRow) -> BandSeen {
    BandSeen {
        concert_id: row.concert_id.clone(),
        user_id: row.user_id.clone(),
        band_id: row.band_id,
    }
}

pub fn band_seen_full(row: BandSeenRow) -> BandSeenFull {
    BandSeenFull {
        concert_id: row.concert_id,
        user_id: row.user_id,
        band_id: row.band_id,
        band: row.band.map(band),
        concert: row.concert.map(concert),
    }
}

pub fn friend(row: FriendRow) -> Friend {
    Friend {
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        sender: row.sender,
        receiver: row.receiver,
        pending: row.pending,
        created_at: row.created_at,
        accepted_at: row.accepted_at,
    }
}

pub fn comment(row: CommentRow) -> Comment {
    let content = match row.content {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Comment {
        id: row.id,
        concert_id: row.concert_id,
        user_id: row.user_id,
        content,
        created_at: row.created_at,
        edited_at: row.edited_at,
    }
}

pub fn all<R, E>(rows: Vec<R>, map: impl Fn(R) -> E) -> Vec<E> {
    rows.into_iter().map(map).collect()
}
