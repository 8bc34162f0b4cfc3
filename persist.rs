use crate::catalog::{Applied, Catalog, CatalogData, CatalogStore, Snapshot, UpdateOutcome};
use crate::config::CatalogConfig;
use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use crate::models::{Media, MediaUpdate, NewMedia};
use rusqlite::{params, Transaction};
use std::time::Instant;

/// Write-through decorator over [`CatalogStore`].
///
/// Each mutation is staged in memory, mirrored to sqlite in one transaction,
/// and published only after the transaction commits. A failed write surfaces
/// as [`Error::Persistence`] and the published catalog stays as it was.
pub struct PersistentCatalog {
    store: CatalogStore,
    pool: DbPool,
}

impl PersistentCatalog {
    /// Opens the database, migrates it and rehydrates the catalog.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        let pool = db::init_database(config)?;
        Self::load(pool)
    }

    /// Rehydrates from an already migrated pool.
    pub fn load(pool: DbPool) -> Result<Self> {
        let started = Instant::now();
        let conn = pool.get()?;
        let data = db::load(&conn)?;
        drop(conn);
        log::info!("Database load took {:?}", started.elapsed());
        Ok(Self {
            store: CatalogStore::from_data(data),
            pool,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn write<T, M, P>(&self, operation: &'static str, mutate: M, persist: P) -> Result<T>
    where
        T: Applied,
        M: FnOnce(&mut CatalogData) -> T,
        P: FnOnce(&Transaction<'_>, &T, &CatalogData) -> rusqlite::Result<()>,
    {
        self.store.apply(mutate, |outcome, staged| {
            let mut conn = self.pool.get().map_err(|e| {
                log::error!("No connection for {operation}; change discarded: {e}");
                Error::from(e)
            })?;
            conn.transaction()
                .and_then(|tx| {
                    persist(&tx, outcome, staged)?;
                    tx.commit()
                })
                .map_err(|source| {
                    log::error!("Durable write for {operation} failed; change discarded: {source}");
                    Error::Persistence { operation, source }
                })
        })
    }
}

fn insert_media(tx: &Transaction<'_>, media: &Media) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO images (hash, path, rotation, type, hash_date) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            media.hash,
            media.path,
            media.rotation,
            media.media_type.as_str(),
            media.hash_date
        ],
    )?;
    Ok(())
}

/// Mirrors the fields named by `update`, reading their values from `media`.
fn write_fields(
    tx: &Transaction<'_>,
    media: &Media,
    update: &MediaUpdate,
    row_written: bool,
) -> rusqlite::Result<()> {
    let row_fields = update.path.is_some()
        || update.rotation.is_some()
        || update.media_type.is_some()
        || update.hash_date.is_some();
    if row_fields && !row_written {
        tx.execute(
            "UPDATE images SET path=?1, rotation=?2, type=?3, hash_date=?4 WHERE hash=?5",
            params![
                media.path,
                media.rotation,
                media.media_type.as_str(),
                media.hash_date,
                media.hash
            ],
        )?;
    }
    if update.metadata.is_some() {
        if let Some(meta) = &media.metadata {
            tx.execute(
                "INSERT OR REPLACE INTO cached (hash, width, height, length, artist, album, title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    media.hash,
                    meta.width,
                    meta.height,
                    meta.duration,
                    meta.artist,
                    meta.album,
                    meta.title
                ],
            )?;
        }
    }
    if update.corrupted.is_some() {
        set_flag(tx, "corrupted", &media.hash, media.corrupted)?;
    }
    if update.transcode.is_some() {
        set_flag(tx, "priority_transcode", &media.hash, media.transcode)?;
    }
    Ok(())
}

fn set_flag(tx: &Transaction<'_>, table: &str, hash: &str, on: bool) -> rusqlite::Result<()> {
    let sql = if on {
        format!("INSERT OR IGNORE INTO {table} (hash) VALUES (?1)")
    } else {
        format!("DELETE FROM {table} WHERE hash=?1")
    };
    tx.execute(&sql, [hash])?;
    Ok(())
}

fn staged_media<'a>(staged: &'a CatalogData, hash: &str) -> rusqlite::Result<&'a Media> {
    staged
        .get(hash)
        .ok_or(rusqlite::Error::QueryReturnedNoRows)
}

impl Catalog for PersistentCatalog {
    fn add_media(&self, media: NewMedia) -> Result<bool> {
        let hash = media.hash.clone();
        self.write(
            "add_media",
            |data| data.add_media(media),
            |tx, _, staged| insert_media(tx, staged_media(staged, &hash)?),
        )
    }

    fn update_media(&self, hash: &str, update: MediaUpdate) -> Result<bool> {
        let outcome = self.write(
            "update_media",
            |data| data.update_media(hash, &update),
            |tx, outcome, staged| {
                let media = staged_media(staged, hash)?;
                let created = *outcome == UpdateOutcome::Created;
                if created {
                    insert_media(tx, media)?;
                }
                write_fields(tx, media, &update, created)
            },
        )?;
        Ok(outcome.applied())
    }

    /// Durable order matches the in-memory cascade: tombstone first, row last.
    fn remove_media(&self, hash: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        self.write(
            "remove_media",
            |data| data.remove_media(hash, now),
            |tx, _, staged| {
                let time = staged.tombstone(hash).map_or(now, |t| t.time);
                tx.execute(
                    "INSERT OR IGNORE INTO deleted (hash, time) VALUES (?1, ?2)",
                    params![hash, time],
                )?;
                tx.execute("DELETE FROM imgtags WHERE hash=?1", [hash])?;
                tx.execute("DELETE FROM cached WHERE hash=?1", [hash])?;
                tx.execute("DELETE FROM priority_transcode WHERE hash=?1", [hash])?;
                tx.execute("DELETE FROM corrupted WHERE hash=?1", [hash])?;
                tx.execute("DELETE FROM images WHERE hash=?1", [hash])?;
                Ok(())
            },
        )
    }

    fn add_tag(&self, name: &str, hash: Option<&str>) -> Result<bool> {
        self.write(
            "add_tag",
            |data| data.add_tag(name, hash),
            |tx, _, _| {
                tx.execute("INSERT OR IGNORE INTO tags (tag) VALUES (?1)", [name])?;
                if let Some(hash) = hash {
                    tx.execute(
                        "INSERT OR IGNORE INTO imgtags (hash, tag) VALUES (?1, ?2)",
                        [hash, name],
                    )?;
                }
                Ok(())
            },
        )
    }

    fn remove_tag(&self, name: &str, hash: Option<&str>) -> Result<bool> {
        self.write(
            "remove_tag",
            |data| data.remove_tag(name, hash),
            |tx, _, _| {
                match hash {
                    Some(hash) => {
                        tx.execute(
                            "DELETE FROM imgtags WHERE hash=?1 AND tag=?2",
                            [hash, name],
                        )?;
                    }
                    None => {
                        tx.execute("DELETE FROM imgtags WHERE tag=?1", [name])?;
                        tx.execute("DELETE FROM tags WHERE tag=?1", [name])?;
                    }
                }
                Ok(())
            },
        )
    }

    fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaType, Metadata};
    use std::path::Path;

    fn open(dir: &Path) -> PersistentCatalog {
        let config = CatalogConfig {
            database_path: dir.join("library.db"),
            pool_size: 2,
            ..Default::default()
        };
        PersistentCatalog::open(&config).unwrap()
    }

    fn new_media(hash: &str) -> NewMedia {
        NewMedia {
            hash: hash.into(),
            path: format!("/lib/{hash}.jpg"),
            rotation: 0,
            media_type: MediaType::Still,
            hash_date: 1,
        }
    }

    fn count(catalog: &PersistentCatalog, sql: &str) -> i64 {
        let conn = catalog.pool().get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = open(dir.path());
            assert!(catalog.add_media(new_media("a")).unwrap());
            assert!(catalog.add_media(new_media("b")).unwrap());
            assert!(catalog.add_tag("x", Some("a")).unwrap());
            assert!(catalog.add_tag("empty", None).unwrap());
            let update = MediaUpdate {
                rotation: Some(270),
                metadata: Some(Metadata {
                    width: Some(800),
                    height: Some(600),
                    ..Default::default()
                }),
                corrupted: Some(true),
                ..Default::default()
            };
            assert!(catalog.update_media("a", update).unwrap());
            assert!(catalog.remove_media("b").unwrap());
        }

        let catalog = open(dir.path());
        let snapshot = catalog.snapshot();
        let a = snapshot.get("a").unwrap();
        assert_eq!(a.rotation, 270);
        assert_eq!(a.tags, ["x"]);
        assert!(a.corrupted);
        assert_eq!(a.metadata.as_ref().unwrap().width, Some(800));
        assert!(snapshot.get("b").is_none());
        assert!(snapshot.is_tombstoned("b"));
        assert_eq!(snapshot.tag_names(), ["empty", "x"]);
    }

    #[test]
    fn metadata_edits_keep_the_row_whole() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.add_media(new_media("a")).unwrap();
        let probe = MediaUpdate {
            metadata: Some(Metadata {
                width: Some(1920),
                height: Some(1080),
                duration: Some(3.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        catalog.update_media("a", probe.clone()).unwrap();
        let edit = MediaUpdate {
            metadata: Some(Metadata {
                artist: Some("Band".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        catalog.update_media("a", edit).unwrap();
        assert!(!catalog.update_media("a", MediaUpdate::default()).unwrap());

        let conn = catalog.pool().get().unwrap();
        let (width, artist): (Option<u32>, Option<String>) = conn
            .query_row("SELECT width, artist FROM cached WHERE hash='a'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(width, Some(1920));
        assert_eq!(artist.as_deref(), Some("Band"));
    }

    #[test]
    fn remove_media_clears_every_table_but_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.add_media(new_media("a")).unwrap();
        catalog.add_tag("x", Some("a")).unwrap();
        catalog
            .update_media(
                "a",
                MediaUpdate {
                    metadata: Some(Metadata::default()),
                    corrupted: Some(true),
                    transcode: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(catalog.remove_media("a").unwrap());
        assert!(!catalog.remove_media("a").unwrap());

        for table in ["images", "imgtags", "cached", "corrupted", "priority_transcode"] {
            assert_eq!(count(&catalog, &format!("SELECT COUNT(*) FROM {table}")), 0);
        }
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM deleted"), 1);
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM tags"), 1);
    }

    #[test]
    fn upsert_inserts_row_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = open(dir.path());
        let update = MediaUpdate {
            path: Some("/lib/clip.mp4".into()),
            media_type: Some(MediaType::Video),
            hash_date: Some(9),
            transcode: Some(true),
            ..Default::default()
        };
        assert!(catalog.update_media("clip", update).unwrap());
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM images"), 1);
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM priority_transcode"), 1);
        assert!(!catalog
            .update_media("other", MediaUpdate::default())
            .unwrap());
    }

    #[test]
    fn global_tag_removal_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.add_media(new_media("a")).unwrap();
        catalog.add_tag("x", Some("a")).unwrap();
        assert!(catalog.remove_tag("x", None).unwrap());
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM imgtags"), 0);
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM tags"), 0);
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.add_media(new_media("a")).unwrap();
        catalog
            .pool()
            .get()
            .unwrap()
            .execute_batch("DROP TABLE imgtags;")
            .unwrap();

        let result = catalog.add_tag("x", Some("a"));
        assert!(matches!(
            result,
            Err(Error::Persistence {
                operation: "add_tag",
                ..
            })
        ));
        let snapshot = catalog.snapshot();
        assert!(!snapshot.has_tag("x"));
        assert!(snapshot.get("a").unwrap().tags.is_empty());
        // The tags insert ran in the same transaction and was rolled back.
        assert_eq!(count(&catalog, "SELECT COUNT(*) FROM tags"), 0);
    }

    #[test]
    fn row_field_updates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = open(dir.path());
            assert!(catalog.add_media(new_media("a")).unwrap());
            let update = MediaUpdate {
                path: Some("/moved/a.mp4".into()),
                media_type: Some(MediaType::Video),
                hash_date: Some(99),
                ..Default::default()
            };
            assert!(catalog.update_media("a", update).unwrap());
        }

        let catalog = open(dir.path());
        let snapshot = catalog.snapshot();
        let a = snapshot.get("a").unwrap();
        assert_eq!(a.path, "/moved/a.mp4");
        assert_eq!(a.media_type, MediaType::Video);
        assert_eq!(a.hash_date, 99);
        assert_eq!(snapshot.media_by_path("/moved/a.mp4").unwrap().hash, "a");
        assert!(snapshot.media_by_path("/lib/a.jpg").is_none());
    }

    #[test]
    fn reopened_catalog_iterates_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = open(dir.path());
            catalog.add_media(new_media("b")).unwrap();
            catalog.add_media(new_media("a")).unwrap();
            let live: Vec<_> = catalog.snapshot().iter().map(|m| m.hash.clone()).collect();
            assert_eq!(live, ["b", "a"]);
        }
        let catalog = open(dir.path());
        let reloaded: Vec<_> = catalog.snapshot().iter().map(|m| m.hash.clone()).collect();
        assert_eq!(reloaded, ["a", "b"]);
    }
}
