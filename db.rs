use crate::catalog::CatalogData;
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::models::{Lookup, MediaType, MediaUpdate, Metadata, NewMedia};
use crate::schema;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Params, Row};
use std::time::Duration;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// Initializes the database connection pool and runs migrations.
pub fn init_database(config: &CatalogConfig) -> Result<DbPool> {
    let db_path = &config.database_path;
    log::info!("Database path: {}", db_path.display());

    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
    });
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)?;

    let mut conn = pool.get()?;
    setup(&mut conn)?;

    Ok(pool)
}

/// Creates missing schema objects and applies pending migrations in order.
/// Returns the version the database ends up at.
pub fn setup(connection: &mut Connection) -> Result<i64> {
    connection.execute_batch(schema::SCHEMA)?;

    let stored = read_version(connection)?;
    let latest = schema::latest_version();
    if stored > latest {
        return Err(Error::Migration {
            version: stored,
            reason: format!("database is newer than the latest known version {latest}"),
        });
    }

    let mut version = stored;
    for &(target, sql) in schema::MIGRATIONS.iter().filter(|(v, _)| *v > stored) {
        log::info!("Applying migration {target}...");
        let tx = connection.transaction()?;
        tx.execute_batch(sql)
            .and_then(|_| {
                tx.execute(
                    "INSERT OR REPLACE INTO version (version) VALUES (?1)",
                    [target],
                )
            })
            .and_then(|_| tx.commit())
            .map_err(|e| Error::Migration {
                version: target,
                reason: e.to_string(),
            })?;
        version = target;
    }

    log::info!("Database schema at version {version}.");
    Ok(version)
}

fn read_version(connection: &Connection) -> Result<i64> {
    let rows = select(connection, "SELECT version FROM version", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(match rows {
        Lookup::None => 0,
        Lookup::One(version) => version,
        Lookup::Many(versions) => versions.into_iter().max().unwrap_or(0),
    })
}

/// Runs a query and reports how many rows came back.
pub fn select<T, P, F>(connection: &Connection, sql: &str, params: P, map: F) -> Result<Lookup<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = connection.prepare(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(Lookup::from_vec(rows))
}

/// Rebuilds the catalog from storage through the catalog's own mutation API.
///
/// Tags load before associations and media before metadata. Tombstones load
/// before media so an interrupted removal is not resurrected.
pub fn load(connection: &Connection) -> Result<CatalogData> {
    let mut data = CatalogData::new();

    log::info!("Loading tags.");
    let tags = select(connection, "SELECT tag FROM tags", [], |row| {
        row.get::<_, String>(0)
    })?;
    for tag in tags.into_vec() {
        if !tag.is_empty() {
            data.add_tag(&tag, None);
        }
    }

    log::info!("Tags loaded ({}). Loading tombstones.", data.tag_names().len());
    let deleted = select(connection, "SELECT hash, time FROM deleted", [], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?
    .into_vec();
    for (hash, time) in &deleted {
        data.record_tombstone(hash, *time);
    }

    log::info!("Tombstones loaded ({}). Loading media.", deleted.len());
    let media = select(
        connection,
        "SELECT hash, path, rotation, type, hash_date FROM images ORDER BY path",
        [],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        },
    )?;
    let mut skipped = 0usize;
    for (hash, path, rotation, media_type, hash_date) in media.into_vec() {
        let media_type = media_type.parse::<MediaType>().map_err(|_| {
            Error::Corruption(format!("media {hash} has unknown type '{media_type}'"))
        })?;
        let added = data.add_media(NewMedia {
            hash,
            path,
            rotation,
            media_type,
            hash_date,
        });
        if !added {
            skipped += 1;
        }
    }
    if skipped > 0 {
        log::warn!("{skipped} media rows skipped (tombstoned or duplicate path)");
    }

    log::info!("Media loaded ({}). Loading media tags.", data.len());
    let associations = select(connection, "SELECT hash, tag FROM imgtags", [], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for (hash, tag) in associations.into_vec() {
        data.add_tag(&tag, Some(&hash));
    }

    log::info!("Media tags loaded. Loading metadata.");
    let cached = select(
        connection,
        "SELECT hash, width, height, length, artist, album, title FROM cached",
        [],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                Metadata {
                    width: row.get(1)?,
                    height: row.get(2)?,
                    duration: row.get(3)?,
                    artist: row.get(4)?,
                    album: row.get(5)?,
                    title: row.get(6)?,
                },
            ))
        },
    )?;
    for (hash, metadata) in cached.into_vec() {
        let update = MediaUpdate {
            metadata: Some(metadata),
            ..Default::default()
        };
        data.update_media(&hash, &update);
    }

    log::info!("Metadata loaded. Loading corrupted file list.");
    let corrupted = hashes(connection, "SELECT hash FROM corrupted")?;
    log::info!("{} files marked as corrupted", corrupted.len());
    for hash in corrupted {
        let update = MediaUpdate {
            corrupted: Some(true),
            ..Default::default()
        };
        data.update_media(&hash, &update);
    }

    let transcode = hashes(connection, "SELECT hash FROM priority_transcode")?;
    log::info!("{} files marked for priority transcoding", transcode.len());
    for hash in transcode {
        let update = MediaUpdate {
            transcode: Some(true),
            ..Default::default()
        };
        data.update_media(&hash, &update);
    }

    Ok(data)
}

fn hashes(connection: &Connection, sql: &str) -> Result<Vec<String>> {
    Ok(select(connection, sql, [], |row| row.get::<_, String>(0))?.into_vec())
}
