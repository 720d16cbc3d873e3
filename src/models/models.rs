use serde::{Deserialize, Serialize};

// === Entities ===

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Country {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub iso2: String,
    #[serde(default)]
    pub iso3: Option<String>,
    #[serde(default)]
    pub local_name: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Band {
    pub id: i64,
    pub name: String,
    pub country: Option<Country>,
    pub genres: Vec<Genre>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Concert {
    pub id: String,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub name: Option<String>,
    pub is_festival: bool,
    pub is_public: bool,
    pub location: Option<Location>,
    pub bands: Vec<Band>,
    pub created_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BandSeen {
    pub concert_id: String,
    pub user_id: String,
    pub band_id: i64,
}

/// A band-seen row with its band and concert resolved.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BandSeenFull {
    pub concert_id: String,
    pub user_id: String,
    pub band_id: i64,
    pub band: Option<Band>,
    pub concert: Option<Concert>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Friend {
    pub sender_id: String,
    pub receiver_id: String,
    pub sender: Option<Profile>,
    pub receiver: Option<Profile>,
    pub pending: bool,
    pub created_at: Option<String>,
    pub accepted_at: Option<String>,
}

impl Friend {
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }

    /// The profile on the other side of the edge from `user_id`.
    pub fn other(&self, user_id: &str) -> Option<&Profile> {
        if self.sender_id == user_id {
            self.receiver.as_ref()
        } else {
            self.sender.as_ref()
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub concert_id: Option<String>,
    pub user_id: Option<String>,
    pub content: String,
    pub created_at: Option<String>,
    pub edited_at: Option<String>,
}

// === Raw rows ===

/// A relation column that is either expanded into its row or left as a bare key.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum Joined<T> {
    Expanded(T),
    Key(serde_json::Value),
}

#[derive(Deserialize, Clone, Debug)]
pub struct BandRow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub country: Option<Joined<Country>>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ConcertRow {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub is_festival: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Joined<Location>>,
    #[serde(default)]
    pub bands: Option<Vec<BandRow>>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BandSeenRow {
    pub concert_id: String,
    pub user_id: String,
    pub band_id: i64,
    #[serde(default)]
    pub band: Option<BandRow>,
    #[serde(default)]
    pub concert: Option<ConcertRow>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct FriendRow {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub pending: bool,
    #[serde(default)]
    pub accepted_at: Option<String>,
    #[serde(default)]
    pub sender: Option<Profile>,
    #[serde(default)]
    pub receiver: Option<Profile>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CommentRow {
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub concert_id: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub edited_at: Option<String>,
}

// === Write payloads ===

#[derive(Serialize, Debug)]
pub struct NewComment<'a> {
    pub concert_id: &'a str,
    pub user_id: &'a str,
    pub content: &'a str,
}

#[derive(Serialize, Debug)]
pub struct CommentEdit<'a> {
    pub content: &'a str,
    pub edited_at: &'a str,
}

#[derive(Serialize, Debug)]
pub struct FriendRequest<'a> {
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
}

#[derive(Serialize, Debug)]
pub struct FriendAcceptance<'a> {
    pub pending: bool,
    pub accepted_at: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ConcertInput {
    pub date_start: String,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_festival: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub location: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct ConcertBandLink<'a> {
    pub concert_id: &'a str,
    pub band_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
}
