//! Ranking repository: append-only storage for the `rankings` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw ranking row from the database.
#[derive(Debug, Clone)]
pub struct RankingRow {
    pub id: String,
    pub domain: String,
    pub domain_key: String,
    pub keyword: String,
    pub keyword_key: String,
    pub location_code: u32,
    pub location_name: String,
    pub language: String,
    pub device: String,
    pub os: String,
    pub rank: Option<u32>,
    pub rank_absolute: Option<u32>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// JSON array of competitor snapshots.
    pub competitors: String,
    /// JSON object with SERP metadata.
    pub serp: String,
    pub created_at: String,
}

impl RankingRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            domain: row.get("domain")?,
            domain_key: row.get("domain_key")?,
            keyword: row.get("keyword")?,
            keyword_key: row.get("keyword_key")?,
            location_code: row.get("location_code")?,
            location_name: row.get("location_name")?,
            language: row.get("language")?,
            device: row.get("device")?,
            os: row.get("os")?,
            rank: row.get("rank")?,
            rank_absolute: row.get("rank_absolute")?,
            url: row.get("url")?,
            title: row.get("title")?,
            description: row.get("description")?,
            competitors: row.get("competitors")?,
            serp: row.get("serp")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Column values identifying one cache slot.
#[derive(Debug, Clone)]
pub struct RankingKey<'a> {
    pub domain_key: &'a str,
    pub keyword_key: &'a str,
    pub location_code: u32,
    pub language: &'a str,
    pub device: &'a str,
    pub os: &'a str,
}

/// Inserts a ranking row. Rows are never updated afterwards.
pub fn insert(conn: &Connection, row: &RankingRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO rankings (id, domain, domain_key, keyword, keyword_key, location_code,
         location_name, language, device, os, rank, rank_absolute, url, title, description,
         competitors, serp, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            row.id,
            row.domain,
            row.domain_key,
            row.keyword,
            row.keyword_key,
            row.location_code,
            row.location_name,
            row.language,
            row.device,
            row.os,
            row.rank,
            row.rank_absolute,
            row.url,
            row.title,
            row.description,
            row.competitors,
            row.serp,
            row.created_at,
        ],
    )?;
    Ok(())
}

/// Finds a ranking by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<RankingRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM rankings WHERE id = ?1",
            params![id],
            RankingRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Returns the newest ranking for a cache key, regardless of age.
pub fn find_latest(
    conn: &Connection,
    key: &RankingKey<'_>,
) -> Result<Option<RankingRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM rankings
             WHERE domain_key = ?1 AND keyword_key = ?2 AND location_code = ?3
               AND language = ?4 AND device = ?5 AND os = ?6
             ORDER BY created_at DESC LIMIT 1",
            params![
                key.domain_key,
                key.keyword_key,
                key.location_code,
                key.language,
                key.device,
                key.os,
            ],
            RankingRow::from_row,
        )
        .optional()?;
    Ok(row)
}
