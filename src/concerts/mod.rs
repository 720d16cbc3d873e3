pub mod filter;

use serde::Deserialize;
use tracing::info;

use crate::config::{BANDS, BANDS_SEEN, BANDS_SEEN_SELECT, CONCERTS, CONCERT_BANDS, CONCERT_SELECT, LOCATIONS};
use crate::core::errors::StoreError;
use crate::core::store::StoreClient;
use crate::mapper;
use crate::models::models::{
    Band, BandRow, BandSeen, BandSeenFull, BandSeenRow, Concert, ConcertBandLink, ConcertInput, ConcertRow, Location,
};
use crate::stats::unique_by;

#[derive(Deserialize)]
struct BandLinkRow {
    band_id: i64,
}

/// Ids to insert and ids to delete to turn `current` into `wanted`.
pub fn link_changes(current: &[i64], wanted: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let wanted = unique_by(wanted.iter().copied(), |id| *id);
    let added = wanted.iter().copied().filter(|id| !current.contains(id)).collect();
    let removed = unique_by(current.iter().copied(), |id| *id)
        .into_iter()
        .filter(|id| !wanted.contains(id))
        .collect();
    (added, removed)
}

pub async fn load_all(store: &StoreClient) -> Result<Vec<Concert>, StoreError> {
    let rows: Vec<ConcertRow> = store
        .relation(CONCERTS)
        .select(CONCERT_SELECT)
        .order("date_start", false)
        .fetch()
        .await?;
    Ok(mapper::all(rows, mapper::concert))
}

pub async fn load_one(store: &StoreClient, concert_id: &str) -> Result<Concert, StoreError> {
    let row: ConcertRow = store
        .relation(CONCERTS)
        .select(CONCERT_SELECT)
        .eq("id", concert_id)
        .single()
        .await?;
    Ok(mapper::concert(row))
}

pub async fn load_bands(store: &StoreClient) -> Result<Vec<Band>, StoreError> {
    let rows: Vec<BandRow> = store.relation(BANDS).select("*").order("name", true).fetch().await?;
    Ok(mapper::all(rows, mapper::band))
}

pub async fn load_locations(store: &StoreClient) -> Result<Vec<Location>, StoreError> {
    store.relation(LOCATIONS).select("id,name").fetch().await
}

pub async fn load_bands_seen(store: &StoreClient, user_id: &str) -> Result<Vec<BandSeen>, StoreError> {
    store.relation(BANDS_SEEN).select("*").eq("user_id", user_id).fetch().await
}

pub async fn load_bands_seen_full(store: &StoreClient, user_id: &str) -> Result<Vec<BandSeenFull>, StoreError> {
    let rows: Vec<BandSeenRow> = store
        .relation(BANDS_SEEN)
        .select(BANDS_SEEN_SELECT)
        .eq("user_id", user_id)
        .fetch()
        .await?;
    Ok(mapper::all(rows, mapper::band_seen_full))
}

async fn linked_band_ids(store: &StoreClient, concert_id: &str) -> Result<Vec<i64>, StoreError> {
    let rows: Vec<BandLinkRow> = store
        .relation(CONCERT_BANDS)
        .select("band_id")
        .eq("concert_id", concert_id)
        .fetch()
        .await?;
    Ok(rows.into_iter().map(|r| r.band_id).collect())
}

async fn sync_band_links(store: &StoreClient, concert_id: &str, band_ids: &[i64]) -> Result<(), StoreError> {
    let current = linked_band_ids(store, concert_id).await?;
    let (added, removed) = link_changes(&current, band_ids);

    if !removed.is_empty() {
        store
            .relation(CONCERT_BANDS)
            .eq("concert_id", concert_id)
            .is_in("band_id", &removed)
            .delete()
            .await?;
    }
    if !added.is_empty() {
        let links: Vec<ConcertBandLink> = added
            .iter()
            .map(|&band_id| ConcertBandLink { concert_id, band_id })
            .collect();
        store.relation(CONCERT_BANDS).insert_quiet(&links).await?;
    }
    Ok(())
}

pub async fn add_concert(store: &StoreClient, input: &ConcertInput, band_ids: &[i64]) -> Result<Concert, StoreError> {
    let created: Vec<ConcertRow> = store.relation(CONCERTS).insert(input).await?;
    let row = created
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Decode("insert returned no concert".to_string()))?;

    sync_band_links(store, &row.id, band_ids).await?;
    info!(concert_id = %row.id, bands = band_ids.len(), "concert added");
    load_one(store, &row.id).await
}

pub async fn edit_concert(
    store: &StoreClient,
    concert_id: &str,
    input: &ConcertInput,
    band_ids: &[i64],
) -> Result<Concert, StoreError> {
    store.relation(CONCERTS).eq("id", concert_id).update(input).await?;
    sync_band_links(store, concert_id, band_ids).await?;
    info!(concert_id, "concert edited");
    load_one(store, concert_id).await
}

/// Make the user's seen bands at a concert exactly `band_ids`. Existing rows
/// are never inserted twice.
pub async fn set_bands_seen(
    store: &StoreClient,
    concert_id: &str,
    user_id: &str,
    band_ids: &[i64],
) -> Result<Vec<BandSeen>, StoreError> {
    let current: Vec<BandSeen> = store
        .relation(BANDS_SEEN)
        .select("*")
        .eq("concert_id", concert_id)
        .eq("user_id", user_id)
        .fetch()
        .await?;
    let current_ids: Vec<i64> = current.iter().map(|r| r.band_id).collect();
    let (added, removed) = link_changes(&current_ids, band_ids);

    if !removed.is_empty() {
        store
            .relation(BANDS_SEEN)
            .eq("concert_id", concert_id)
            .eq("user_id", user_id)
            .is_in("band_id", &removed)
            .delete()
            .await?;
    }
    if !added.is_empty() {
        let rows: Vec<BandSeen> = added
            .iter()
            .map(|&band_id| BandSeen {
                concert_id: concert_id.to_string(),
                user_id: user_id.to_string(),
                band_id,
            })
            .collect();
        store.relation(BANDS_SEEN).insert_quiet(&rows).await?;
    }

    let mut result: Vec<BandSeen> = current.into_iter().filter(|r| !removed.contains(&r.band_id)).collect();
    result.extend(added.into_iter().map(|band_id| BandSeen {
        concert_id: concert_id.to_string(),
        user_id: user_id.to_string(),
        band_id,
    }));
    Ok(result)
}
