use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::helpers::parse_id_list;
use crate::core::query_params::get_string;
use crate::models::models::Concert;

/// Date ordering of the concert list.
///
/// The names are inverted: `DateAsc` lists the newest concert first and
/// `DateDsc` the oldest first. Clients rely on the literal behavior.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    #[serde(rename = "dateAsc")]
    DateAsc,
    #[serde(rename = "dateDsc")]
    DateDsc,
}

impl SortMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "dateAsc" => Some(SortMode::DateAsc),
            "dateDsc" => Some(SortMode::DateDsc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::DateAsc => "dateAsc",
            SortMode::DateDsc => "dateDsc",
        }
    }

    /// Compare by `date_start`. A missing date orders before any date.
    pub fn compare(self, a: &Concert, b: &Concert) -> Ordering {
        let natural = a.date_start.cmp(&b.date_start);
        match self {
            SortMode::DateAsc => natural.reverse(),
            SortMode::DateDsc => natural,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConcertFilter {
    pub bands: HashSet<i64>,
    pub locations: HashSet<i64>,
    pub sort: SortMode,
}

impl ConcertFilter {
    /// Read `bands`, `locations` and `sort` from parsed query params.
    /// Unknown sort values fall back to the default.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let ids = |key: &str| -> HashSet<i64> {
            get_string(params, key, None)
                .map(|raw| parse_id_list(&raw).into_iter().collect())
                .unwrap_or_default()
        };

        Self {
            bands: ids("bands"),
            locations: ids("locations"),
            sort: get_string(params, "sort", None)
                .and_then(|raw| SortMode::parse(&raw))
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty() && self.locations.is_empty()
    }

    pub fn matches(&self, concert: &Concert) -> bool {
        let band_ok = self.bands.is_empty() || concert.bands.iter().any(|b| self.bands.contains(&b.id));
        let location_ok = self.locations.is_empty()
            || concert
                .location
                .as_ref()
                .is_some_and(|l| self.locations.contains(&l.id));
        band_ok && location_ok
    }

    /// Filtered and sorted view; the input order is the tie-break.
    pub fn apply<'a>(&self, concerts: &'a [Concert]) -> Vec<&'a Concert> {
        let mut out: Vec<&Concert> = concerts.iter().filter(|c| self.matches(c)).collect();
        out.sort_by(|a, b| self.sort.compare(a, b));
        out
    }

    /// Number of matches, or `None` when the filter hides nothing.
    pub fn filtered_count(&self, concerts: &[Concert]) -> Option<usize> {
        let count = concerts.iter().filter(|c| self.matches(c)).count();
        (count != concerts.len()).then_some(count)
    }

    /// Query string that reproduces this filter.
    pub fn to_query(&self) -> String {
        let join = |ids: &HashSet<i64>| {
            let mut ids: Vec<i64> = ids.iter().copied().collect();
            ids.sort_unstable();
            ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        };

        let mut parts = Vec::new();
        if !self.bands.is_empty() {
            parts.push(format!("bands={}", join(&self.bands)));
        }
        if !self.locations.is_empty() {
            parts.push(format!("locations={}", join(&self.locations)));
        }
        parts.push(format!("sort={}", self.sort.as_str()));
        parts.join("&")
    }

    /// Clear both selections. The sort mode is kept.
    pub fn reset(&mut self) {
        self.bands.clear();
        self.locations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query_params::parse_query_params;
    use crate::models::models::{Band, Location};

    fn concert(id: &str, date: Option<&str>, bands: &[i64], location: Option<i64>) -> Concert {
        Concert {
            id: id.to_string(),
            date_start: date.map(str::to_string),
            date_end: None,
            name: None,
            is_festival: false,
            is_public: true,
            location: location.map(|id| Location {
                id,
                name: format!("venue {}", id),
                city: None,
            }),
            bands: bands
                .iter()
                .map(|&id| Band {
                    id,
                    name: format!("band {}", id),
                    country: None,
                    genres: Vec::new(),
                })
                .collect(),
            created_at: None,
        }
    }

    fn ids(list: &[&Concert]) -> Vec<String> {
        list.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn date_asc_lists_newest_first() {
        let concerts = vec![
            concert("1", Some("2024-01-01"), &[], None),
            concert("2", Some("2024-06-01"), &[], None),
        ];
        let filter = ConcertFilter::default();
        assert_eq!(ids(&filter.apply(&concerts)), vec!["2", "1"]);

        let oldest_first = ConcertFilter {
            sort: SortMode::DateDsc,
            ..ConcertFilter::default()
        };
        assert_eq!(ids(&oldest_first.apply(&concerts)), vec!["1", "2"]);
    }

    #[test]
    fn empty_filter_is_identity() {
        let concerts = vec![
            concert("a", Some("2023-05-01"), &[1], Some(1)),
            concert("b", None, &[], None),
        ];
        let filter = ConcertFilter::default();
        assert!(concerts.iter().all(|c| filter.matches(c)));
        assert_eq!(filter.filtered_count(&concerts), None);
    }

    #[test]
    fn band_and_location_filters_combine() {
        let concerts = vec![
            concert("a", Some("2023-01-01"), &[1, 2], Some(10)),
            concert("b", Some("2023-02-01"), &[2], Some(11)),
            concert("c", Some("2023-03-01"), &[3], Some(10)),
            concert("d", Some("2023-04-01"), &[1], None),
        ];

        let mut filter = ConcertFilter {
            bands: [1].into_iter().collect(),
            ..ConcertFilter::default()
        };
        let result = filter.apply(&concerts);
        assert_eq!(ids(&result), vec!["d", "a"]);
        assert!(result.iter().all(|c| c.bands.iter().any(|b| filter.bands.contains(&b.id))));

        filter.locations.insert(10);
        assert_eq!(ids(&filter.apply(&concerts)), vec!["a"]);
        assert_eq!(filter.filtered_count(&concerts), Some(1));

        filter.reset();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&concerts).len(), concerts.len());
    }

    #[test]
    fn sorting_is_idempotent() {
        let concerts = vec![
            concert("x", Some("2022-01-01"), &[], None),
            concert("y", None, &[], None),
            concert("z", Some("2022-01-01"), &[], None),
            concert("w", Some("2025-01-01"), &[], None),
        ];
        let filter = ConcertFilter::default();
        let once: Vec<Concert> = filter.apply(&concerts).into_iter().cloned().collect();
        let twice: Vec<Concert> = filter.apply(&once).into_iter().cloned().collect();
        assert_eq!(once, twice);
        assert_eq!(once.last().map(|c| c.id.as_str()), Some("y"));
    }

    #[test]
    fn parses_query_string() {
        let params = parse_query_params("/?bands=1,2&locations=7&sort=dateDsc");
        let filter = ConcertFilter::from_params(&params);
        assert_eq!(filter.bands, [1, 2].into_iter().collect());
        assert_eq!(filter.locations, [7].into_iter().collect());
        assert_eq!(filter.sort, SortMode::DateDsc);

        let fallback = ConcertFilter::from_params(&parse_query_params("/?sort=bogus"));
        assert_eq!(fallback.sort, SortMode::DateAsc);
        assert!(fallback.is_empty());
    }

    #[test]
    fn query_string_reproduces_filter() {
        let filter = ConcertFilter {
            bands: [3, 1].into_iter().collect(),
            locations: HashSet::new(),
            sort: SortMode::DateDsc,
        };
        assert_eq!(filter.to_query(), "bands=1,3&sort=dateDsc");
        assert_eq!(ConcertFilter::from_params(&parse_query_params(&filter.to_query())), filter);
    }
}
