pub const CONCERTS: &str = "concerts";
pub const BANDS: &str = "bands";
pub const LOCATIONS: &str = "locations";
pub const COMMENTS: &str = "comments";
pub const FRIENDS: &str = "friends";
pub const PROFILES: &str = "profiles";
pub const BANDS_SEEN: &str = "j_bands_seen";
pub const CONCERT_BANDS: &str = "j_concert_bands";

pub const CONCERT_SELECT: &str = "*, location(*), bands!j_concert_bands(*)";
pub const FRIEND_SELECT: &str = "*, sender:profiles!friends_sender_id_fkey(*), receiver:profiles!friends_receiver_id_fkey(*)";
pub const BANDS_SEEN_SELECT: &str = "*, band:bands(*, country(*), genres(*)), concert:concerts(*, location(*))";

pub const MAX_COMMENT_LENGTH: usize = 5000;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MAX_OBJECT_URLS: usize = 256;

pub fn store_url() -> anyhow::Result<String> {
    std::env::var("DIARY_STORE_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .map_err(|_| anyhow::anyhow!("DIARY_STORE_URL must be set"))
}

pub fn store_key() -> anyhow::Result<String> {
    std::env::var("DIARY_STORE_KEY").map_err(|_| anyhow::anyhow!("DIARY_STORE_KEY must be set"))
}

pub fn avatar_bucket() -> String {
    std::env::var("DIARY_AVATAR_BUCKET").unwrap_or_else(|_| "avatars".to_string())
}

pub fn host() -> String {
    std::env::var("DIARY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

pub fn port() -> u16 {
    std::env::var("DIARY_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(3000)
}

pub fn log_filter() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "concert_diary=info,actix_web=info".to_string())
}
