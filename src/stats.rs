use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

use crate::models::models::{Band, BandSeenFull, Concert, Location};

/// Keep the first occurrence of every key, preserving order.
pub fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Tally<K> {
    pub id: K,
    pub name: String,
    pub count: usize,
}

impl<K> Tally<K> {
    /// Bar height relative to the highest count, in percent.
    pub fn share_of(&self, highest: usize) -> f64 {
        if highest == 0 {
            0.0
        } else {
            self.count as f64 / highest as f64 * 100.0
        }
    }
}

pub type TopBand = Tally<i64>;

/// Count `items` per key in first-occurrence order.
fn tally<'a, T: 'a, K>(items: impl IntoIterator<Item = &'a T>, key: impl Fn(&T) -> (K, &str)) -> Vec<Tally<K>>
where
    K: Eq + Hash + Clone,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<Tally<K>> = Vec::new();

    for item in items {
        let (id, name) = key(item);
        match index.get(&id) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                index.insert(id.clone(), counts.len());
                counts.push(Tally {
                    id,
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts
}

/// Keep entries seen more than once, most frequent first. The sort is
/// stable, so ties stay in first-occurrence order.
fn repeated<K>(mut counts: Vec<Tally<K>>) -> Vec<Tally<K>> {
    counts.retain(|t| t.count > 1);
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn top_bands(bands: &[Band]) -> Vec<TopBand> {
    repeated(tally(bands, |b| (b.id, b.name.as_str())))
}

pub fn top_locations(locations: &[Location]) -> Vec<Tally<i64>> {
    repeated(tally(locations, |l| (l.id, l.name.as_str())))
}

pub fn highest_count<K>(entries: &[Tally<K>]) -> usize {
    entries.iter().map(|t| t.count).max().unwrap_or(0)
}

/// Genres over a set of bands, most frequent first, ties by name.
pub fn genre_counts(bands: &[Band]) -> Vec<Tally<i64>> {
    let mut counts = tally(bands.iter().flat_map(|b| b.genres.iter()), |g| (g.id, g.name.as_str()));
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

pub fn concerts_per_year(concerts: &[Concert]) -> Vec<YearCount> {
    let mut years: HashMap<i32, usize> = HashMap::new();
    for concert in concerts {
        let year = concert
            .date_start
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<i32>().ok());
        if let Some(year) = year {
            *years.entry(year).or_default() += 1;
        }
    }

    let mut out: Vec<YearCount> = years.into_iter().map(|(year, count)| YearCount { year, count }).collect();
    out.sort_by_key(|y| y.year);
    out
}

/// Everything the profile page derives from one user's band-seen rows.
#[derive(Serialize, Clone, Debug, Default)]
pub struct Attendance {
    pub bands: Vec<Band>,
    pub concerts: Vec<Concert>,
    pub festivals: Vec<Concert>,
}

impl Attendance {
    pub fn from_rows(rows: &[BandSeenFull]) -> Self {
        let bands = unique_by(rows.iter().filter_map(|r| r.band.clone()), |b| b.id);
        let concerts = unique_by(rows.iter().filter_map(|r| r.concert.clone()), |c| c.id.clone());
        let festivals = unique_by(
            rows.iter()
                .filter_map(|r| r.concert.clone())
                .filter(|c| c.is_festival),
            |c| c.id.clone(),
        );

        Self {
            bands,
            concerts,
            festivals,
        }
    }

    /// Every band occurrence, duplicates included, for the top-bands tally.
    pub fn band_occurrences(rows: &[BandSeenFull]) -> Vec<Band> {
        rows.iter().filter_map(|r| r.band.clone()).collect()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.concerts.iter().filter_map(|c| c.location.clone()).collect()
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ProfileStats {
    pub bands_seen: usize,
    pub concerts_seen: usize,
    pub festivals_seen: usize,
    pub top_bands: Vec<TopBand>,
    pub top_locations: Vec<Tally<i64>>,
    pub genres: Vec<Tally<i64>>,
    pub concerts_per_year: Vec<YearCount>,
}

impl ProfileStats {
    pub fn from_rows(rows: &[BandSeenFull]) -> Self {
        let attendance = Attendance::from_rows(rows);
        Self {
            bands_seen: attendance.bands.len(),
            concerts_seen: attendance.concerts.len(),
            festivals_seen: attendance.festivals.len(),
            top_bands: top_bands(&Attendance::band_occurrences(rows)),
            top_locations: top_locations(&attendance.locations()),
            genres: genre_counts(&attendance.bands),
            concerts_per_year: concerts_per_year(&attendance.concerts),
        }
    }
}
