use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;

use crate::avatars::AvatarSlot;
use crate::concerts::filter::{ConcertFilter, SortMode};
use crate::models::models::Concert;
use crate::pages::{ConcertView, HomeView, InviteCard, ProfileView};
use crate::stats::{highest_count, Tally};

const PROFILE_TEMPLATE: &str = include_str!("../templates/profile.html");
const CONCERT_TEMPLATE: &str = include_str!("../templates/concert.html");
const HOME_TEMPLATE: &str = include_str!("../templates/home.html");

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?:HOME|CONCERT|PROFILE)_[A-Z_]+").expect("Regex should compile"))
}

/// Substitute placeholders in one pass. Inserted values are never scanned
/// again, so user text that looks like a placeholder stays as it is.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            let token = &caps[0];
            values
                .iter()
                .find(|(key, _)| *key == token)
                .map_or_else(|| token.to_string(), |(_, value)| value.clone())
        })
        .into_owned()
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("Regex should compile"))
}

/// Comment text as HTML. Comments are plain text: everything is escaped,
/// bare URLs become links and line breaks are kept.
pub fn render_comment_content(content: &str) -> String {
    let mut html = String::with_capacity(content.len());
    let mut last = 0;

    for url in url_regex().find_iter(content) {
        html.push_str(&encode_text(&content[last..url.start()]));
        html.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url.as_str()),
            encode_text(url.as_str())
        ));
        last = url.end();
    }
    html.push_str(&encode_text(&content[last..]));

    html.replace('\n', "<br>")
}

/// Human readable age of a timestamp, e.g. "vor 3 Tagen".
pub fn time_ago(timestamp: &str, now: DateTime<Utc>) -> Option<String> {
    let then = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
    let age = now - then;

    let text = if age.num_minutes() < 1 {
        "gerade eben".to_string()
    } else if age.num_minutes() < 60 {
        format!("vor {} Minuten", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("vor {} Stunden", age.num_hours())
    } else if age.num_days() < 30 {
        format!("vor {} Tagen", age.num_days())
    } else {
        then.format("%d.%m.%Y").to_string()
    };
    Some(text)
}

fn avatar_html(slot: &AvatarSlot, alt: &str) -> String {
    match slot.display_url() {
        Some(src) => format!(
            r#"<img class="avatar" src="{}" alt="{}">"#,
            encode_double_quoted_attribute(&src),
            encode_double_quoted_attribute(alt)
        ),
        None => r#"<span class="avatar avatar-placeholder"></span>"#.to_string(),
    }
}

fn chart_html<K>(title: &str, entries: &[Tally<K>]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let highest = highest_count(entries);
    let bars: String = entries
        .iter()
        .map(|entry| {
            format!(
                r#"<div class="bar"><div class="bar-fill" style="height: {:.0}%"></div><p>{}</p><p>{}</p></div>"#,
                entry.share_of(highest),
                entry.count,
                encode_text(&entry.name)
            )
        })
        .collect();

    format!(r#"<section class="chart"><h2>{}</h2>{}</section>"#, encode_text(title), bars)
}

fn invite_html(card: &InviteCard, received: bool) -> String {
    let username = card.profile.as_ref().map(|p| p.username.as_str()).unwrap_or("?");
    let actions = if received { "Ablehnen · Bestätigen" } else { "Anfrage zurückziehen" };
    format!(
        r#"<div class="invite"><a href="/users/{}">{}{}</a><span class="invite-actions">{}</span></div>"#,
        urlencoding::encode(username),
        avatar_html(&card.avatar, "Profilbild"),
        encode_text(username),
        actions
    )
}

pub fn render_profile_page(view: &ProfileView) -> String {
    let relation = if view.relation.friend {
        r#"<p class="relation">Freund</p>"#.to_string()
    } else if !view.relation.own && view.relation.pending {
        r#"<button disabled>Freund hinzufügen</button>"#.to_string()
    } else if view.can_add_friend {
        r#"<button>Freund hinzufügen</button>"#.to_string()
    } else {
        String::new()
    };

    let friends: String = if view.friends.is_empty() {
        r#"<p class="empty">Noch keine Freunde.</p>"#.to_string()
    } else {
        view.friends
            .iter()
            .map(|card| {
                format!(
                    r#"<a class="friend" href="/users/{}">{}{}</a>"#,
                    urlencoding::encode(&card.profile.username),
                    avatar_html(&card.avatar, "Profilbild"),
                    encode_text(&card.profile.username)
                )
            })
            .collect()
    };

    let invites = match &view.invites {
        Some(invites) => {
            let list = |cards: &[InviteCard], received: bool| -> String {
                if cards.is_empty() {
                    r#"<p class="empty">Du hast keine ausstehende Anfragen.</p>"#.to_string()
                } else {
                    cards.iter().map(|c| invite_html(c, received)).collect()
                }
            };
            format!(
                r#"<section class="invites"><h3>Empfangene Anfragen</h3>{}<h3>Gesendete Anfragen</h3>{}</section>"#,
                list(&invites.received, true),
                list(&invites.sent, false)
            )
        }
        None => String::new(),
    };

    let years: Vec<Tally<i32>> = view
        .stats
        .concerts_per_year
        .iter()
        .map(|y| Tally {
            id: y.year,
            name: y.year.to_string(),
            count: y.count,
        })
        .collect();

    fill(
        PROFILE_TEMPLATE,
        &[
            ("PROFILE_USERNAME", encode_text(&view.profile.username).into_owned()),
            ("PROFILE_AVATAR", avatar_html(&view.avatar, "Profilbild")),
            ("PROFILE_RELATION", relation),
            ("PROFILE_BANDS_SEEN", view.stats.bands_seen.to_string()),
            ("PROFILE_CONCERTS_SEEN", view.stats.concerts_seen.to_string()),
            ("PROFILE_FESTIVALS_SEEN", view.stats.festivals_seen.to_string()),
            ("PROFILE_YEARS", chart_html("Konzerte pro Jahr", &years)),
            ("PROFILE_TOP_BANDS", chart_html("Top Bands", &view.stats.top_bands)),
            ("PROFILE_GENRES", chart_html("Genres", &view.stats.genres)),
            ("PROFILE_TOP_LOCATIONS", chart_html("Top Locations", &view.stats.top_locations)),
            ("PROFILE_INVITES", invites),
            ("PROFILE_FRIENDS", friends),
        ],
    )
}

/// Festival name, else the headliner.
fn concert_title(concert: &Concert) -> String {
    concert
        .name
        .clone()
        .or_else(|| concert.bands.first().map(|b| b.name.clone()))
        .unwrap_or_else(|| "Konzert".to_string())
}

fn filter_link(filter: &ConcertFilter, label: &str, active: bool) -> String {
    format!(
        r#"<a class="chip{}" href="/?{}">{}</a>"#,
        if active { " active" } else { "" },
        encode_double_quoted_attribute(&filter.to_query()),
        encode_text(label)
    )
}

pub fn render_home_page(view: &HomeView) -> String {
    let bands: String = view
        .bands
        .iter()
        .map(|band| {
            let mut toggled = view.filter.clone();
            let active = !toggled.bands.insert(band.id);
            if active {
                toggled.bands.remove(&band.id);
            }
            filter_link(&toggled, &band.name, active)
        })
        .collect();

    let locations: String = view
        .locations
        .iter()
        .map(|location| {
            let mut toggled = view.filter.clone();
            let active = !toggled.locations.insert(location.id);
            if active {
                toggled.locations.remove(&location.id);
            }
            filter_link(&toggled, &location.name, active)
        })
        .collect();

    let sort: String = [(SortMode::DateAsc, "Neueste zuerst"), (SortMode::DateDsc, "Älteste zuerst")]
        .into_iter()
        .map(|(mode, label)| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                mode.as_str(),
                if view.filter.sort == mode { " selected" } else { "" },
                label
            )
        })
        .collect();

    let filter = format!(
        r#"<div class="filter-bands">{}</div><div class="filter-locations">{}</div><select name="sort">{}</select>"#,
        bands, locations, sort
    );

    let count = match view.filtered_count {
        Some(count) => format!("{} von {} Konzerten", count, view.total),
        None => format!("{} Konzerte", view.total),
    };

    let concerts: String = view
        .concerts
        .iter()
        .map(|card| {
            let concert = &card.concert;
            let seen = if card.bands_seen.is_empty() {
                String::new()
            } else {
                format!(r#"<span class="seen">{} gesehen</span>"#, card.bands_seen.len())
            };
            format!(
                r#"<li><a href="/concerts/{}">{}</a> <span class="date">{}</span>{}</li>"#,
                urlencoding::encode(&concert.id),
                encode_text(&concert_title(concert)),
                encode_text(concert.date_start.as_deref().unwrap_or("")),
                seen
            )
        })
        .collect();

    fill(
        HOME_TEMPLATE,
        &[("HOME_FILTER", filter), ("HOME_COUNT", count), ("HOME_CONCERTS", concerts)],
    )
}

pub fn render_concert_page(view: &ConcertView, now: DateTime<Utc>) -> String {
    let concert = &view.concert;
    let title = concert_title(concert);

    let mut meta = Vec::new();
    if let Some(start) = &concert.date_start {
        match &concert.date_end {
            Some(end) if end != start => meta.push(format!("{} – {}", start, end)),
            _ => meta.push(start.clone()),
        }
    }
    if let Some(location) = &concert.location {
        meta.push(match &location.city {
            Some(city) => format!("{}, {}", location.name, city),
            None => location.name.clone(),
        });
    }
    if concert.is_festival {
        meta.push("Festival".to_string());
    }
    let meta = meta.iter().map(|m| encode_text(m).to_string()).collect::<Vec<_>>().join(" · ");

    let bands: String = concert
        .bands
        .iter()
        .map(|b| format!("<li>{}</li>", encode_text(&b.name)))
        .collect();

    let viewer = view.viewer.as_deref();
    let comments: String = if view.comments.entries.is_empty() {
        r#"<p class="empty">Noch keine Kommentare vorhanden. Du kannst den ersten Schritt machen.</p>"#.to_string()
    } else {
        view.comments
            .entries
            .iter()
            .map(|entry| {
                let comment = &entry.comment;
                let author = view
                    .author(comment.user_id.as_deref())
                    .map(|p| p.username.as_str())
                    .unwrap_or("");
                let age = comment
                    .created_at
                    .as_deref()
                    .and_then(|ts| time_ago(ts, now))
                    .unwrap_or_default();
                let edited = if entry.is_edited() {
                    r#"<span class="edited">(bearbeitet)</span>"#
                } else {
                    ""
                };
                let controls = if entry.controls_visible(viewer) {
                    format!(r#"<div class="comment-controls" data-comment="{}"></div>"#, comment.id)
                } else {
                    String::new()
                };
                format!(
                    r#"<article class="comment"><div class="comment-head">{} · {}</div><p>{}{}</p>{}</article>"#,
                    encode_text(author),
                    encode_text(&age),
                    render_comment_content(&comment.content),
                    edited,
                    controls
                )
            })
            .collect()
    };

    fill(
        CONCERT_TEMPLATE,
        &[
            ("CONCERT_TITLE", encode_text(&title).into_owned()),
            ("CONCERT_META", meta),
            ("CONCERT_BANDS", bands),
            ("CONCERT_COMMENTS", comments),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn comment_content_is_escaped_and_linked() {
        let html = render_comment_content("see https://example.com/set?a=1&b=2 <script>alert(1)</script>\nbye");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains(r#"<a href="https://example.com/set?a=1&amp;b=2" target="_blank""#));
        assert!(html.ends_with("<br>bye"));
    }

    fn concert(id: &str, name: Option<&str>) -> Concert {
        Concert {
            id: id.to_string(),
            date_start: Some("2024-05-01".to_string()),
            date_end: None,
            name: name.map(str::to_string),
            is_festival: false,
            is_public: true,
            location: None,
            bands: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn home_page_shows_filtered_count() {
        let filter = ConcertFilter {
            bands: [1].into_iter().collect(),
            ..ConcertFilter::default()
        };
        let view = HomeView {
            concerts: vec![crate::pages::ConcertCard {
                concert: concert("c1", Some("<Rock am Ring>")),
                bands_seen: vec![1],
            }],
            total: 3,
            filtered_count: Some(1),
            filter,
            bands: Vec::new(),
            locations: Vec::new(),
        };

        let html = render_home_page(&view);
        assert!(html.contains("1 von 3 Konzerten"));
        assert!(html.contains("&lt;Rock am Ring&gt;"));
        assert!(html.contains(r#"href="/concerts/c1""#));
        assert!(!html.contains("HOME_"));
    }

    #[test]
    fn placeholder_text_in_values_is_not_expanded() {
        let html = fill("<h1>PROFILE_USERNAME</h1>PROFILE_FRIENDS", &[
            ("PROFILE_USERNAME", "PROFILE_FRIENDS fan".to_string()),
            ("PROFILE_FRIENDS", "<ul></ul>".to_string()),
        ]);
        assert_eq!(html, "<h1>PROFILE_FRIENDS fan</h1><ul></ul>");
        assert_eq!(fill("PROFILE_UNKNOWN", &[]), "PROFILE_UNKNOWN");
    }

    #[test]
    fn profile_page_charts_concerts_per_year() {
        use crate::friends::ProfileRelation;
        use crate::models::models::Profile;
        use crate::stats::{ProfileStats, YearCount};

        let view = ProfileView {
            profile: Profile {
                id: "u1".to_string(),
                username: "R&B CONCERT_COMMENTS".to_string(),
                avatar_path: None,
                created_at: None,
            },
            avatar: AvatarSlot::new(None),
            relation: ProfileRelation::new("u1", None, &[]),
            can_add_friend: false,
            stats: ProfileStats {
                bands_seen: 0,
                concerts_seen: 3,
                festivals_seen: 0,
                top_bands: Vec::new(),
                top_locations: Vec::new(),
                genres: Vec::new(),
                concerts_per_year: vec![YearCount { year: 2022, count: 1 }, YearCount { year: 2024, count: 2 }],
            },
            friends: Vec::new(),
            invites: None,
        };

        let html = render_profile_page(&view);
        assert!(html.contains("<h1>R&amp;B CONCERT_COMMENTS</h1>"));
        assert!(html.contains("Konzerte pro Jahr"));
        assert!(html.contains("<p>2022</p>"));
        assert!(html.contains(r#"style="height: 50%"></div><p>1</p><p>2022</p>"#));
        assert!(!html.contains("PROFILE_"));
    }

    #[test]
    fn relative_times() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(time_ago("2024-06-10T11:59:30Z", now).as_deref(), Some("gerade eben"));
        assert_eq!(time_ago("2024-06-10T11:15:00Z", now).as_deref(), Some("vor 45 Minuten"));
        assert_eq!(time_ago("2024-06-10T02:00:00Z", now).as_deref(), Some("vor 10 Stunden"));
        assert_eq!(time_ago("2024-06-07T12:00:00Z", now).as_deref(), Some("vor 3 Tagen"));
        assert_eq!(time_ago("2023-01-05T12:00:00+00:00", now).as_deref(), Some("05.01.2023"));
        assert_eq!(time_ago("yesterday", now), None);
    }
}
