use chrono::{DateTime, Duration, Utc};

use super::convert::{ranking_from_row, ranking_to_row};
use crate::db::ranking_repo::{self, RankingKey};
use crate::db::{Database, DatabaseError};
use crate::model::{LookupKey, RankingRecord};

pub const DEFAULT_CACHE_TTL_DAYS: u32 = 7;

/// Freshness-checked access to persisted ranking records.
///
/// Records are immutable; staleness is decided at read time by comparing
/// the record's timestamp with `now - ttl`.
#[derive(Clone)]
pub struct RankCache {
    db: Database,
    ttl: Duration,
}

impl RankCache {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Newest record for `key` if it is still fresh at `now`.
    pub fn lookup(
        &self,
        key: &LookupKey,
        now: DateTime<Utc>,
    ) -> Result<Option<RankingRecord>, DatabaseError> {
        let device = key.device.as_str();
        let repo_key = RankingKey {
            domain_key: &key.domain_key,
            keyword_key: &key.keyword_key,
            location_code: key.location_code,
            language: &key.language,
            device,
            os: &key.os,
        };

        let Some(row) = self
            .db
            .with_conn(|conn| ranking_repo::find_latest(conn, &repo_key))?
        else {
            return Ok(None);
        };

        let record = ranking_from_row(row)?;
        if record.is_fresh(now, self.ttl) {
            Ok(Some(record))
        } else {
            log::debug!(
                "Cached ranking {} for '{}' expired at {}",
                record.id,
                record.keyword,
                record.created_at + self.ttl
            );
            Ok(None)
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<RankingRecord>, DatabaseError> {
        self.db
            .with_conn(|conn| ranking_repo::find_by_id(conn, id))?
            .map(ranking_from_row)
            .transpose()
    }

    pub fn insert(&self, record: &RankingRecord) -> Result<(), DatabaseError> {
        let row = ranking_to_row(record)?;
        self.db.with_conn(|conn| ranking_repo::insert(conn, &row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Device, Location, SearchFilters, SerpMetadata};
    use chrono::TimeZone;

    fn record(id: &str, keyword: &str, created_at: DateTime<Utc>) -> RankingRecord {
        RankingRecord {
            id: id.to_string(),
            domain: "store.example".to_string(),
            keyword: keyword.to_string(),
            location: Location {
                code: 2840,
                name: "United States".to_string(),
            },
            filters: SearchFilters::default(),
            rank: Some(3),
            rank_absolute: Some(5),
            url: Some("https://store.example/boots".to_string()),
            title: None,
            description: None,
            competitors: vec![],
            serp: SerpMetadata::default(),
            created_at,
        }
    }

    fn cache() -> RankCache {
        RankCache::new(
            Database::open_in_memory().unwrap(),
            Duration::days(DEFAULT_CACHE_TTL_DAYS as i64),
        )
    }

    #[test]
    fn test_lookup_respects_ttl_boundary() {
        let cache = cache();
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        cache.insert(&record("r-1", "boots", t)).unwrap();
        let key = LookupKey::new("store.example", "boots", 2840, &SearchFilters::default());

        let eps = Duration::milliseconds(1);
        let hit = cache.lookup(&key, t + cache.ttl() - eps).unwrap();
        assert_eq!(hit.map(|r| r.id), Some("r-1".to_string()));
        assert!(cache.lookup(&key, t + cache.ttl() + eps).unwrap().is_none());
    }

    #[test]
    fn test_lookup_returns_newest_and_normalizes_key() {
        let cache = cache();
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        cache.insert(&record("old", "Boots", t)).unwrap();
        cache
            .insert(&record("new", "boots", t + Duration::hours(1)))
            .unwrap();

        let key = LookupKey::new("www.store.example", "BOOTS", 2840, &SearchFilters::default());
        let hit = cache.lookup(&key, t + Duration::hours(2)).unwrap().unwrap();
        assert_eq!(hit.id, "new");
    }

    #[test]
    fn test_lookup_misses_on_other_filters() {
        let cache = cache();
        let t = Utc::now();
        cache.insert(&record("r-1", "boots", t)).unwrap();
        let mobile = SearchFilters {
            device: Device::Mobile,
            ..SearchFilters::default()
        };
        let key = LookupKey::new("store.example", "boots", 2840, &mobile);
        assert!(cache.lookup(&key, t).unwrap().is_none());
        assert!(cache.get("r-1").unwrap().is_some());
        assert!(cache.get("missing").unwrap().is_none());
    }
}
