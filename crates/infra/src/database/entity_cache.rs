//! SQLite-backed implementation of the entity cache port.
//!
//! Snapshots are upserted by server-assigned id: an existing row has all
//! mirrored fields overwritten and `last_synced_at` restamped, so the cache
//! always reflects the most recent successful fetch. Conflict resolution is
//! last-write-wins by remote fetch overwrite; the cache is never consulted
//! to resolve conflicts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use petsafe_core::EntityCache;
use petsafe_domain::{Alert, Pet, PetSafeError, Result, SuccessStory};
use rusqlite::{params, Connection, Row};
use tokio::task;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed entity cache repository.
pub struct SqliteEntityCache {
    db: Arc<DbManager>,
}

impl SqliteEntityCache {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntityCache for SqliteEntityCache {
    async fn save_pet(&self, pet: &Pet) -> Result<()> {
        let db = Arc::clone(&self.db);
        let pet = pet.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            upsert_pet(&conn, &pet, Utc::now().timestamp()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save_pets(&self, pets: &[Pet]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let pets = pets.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let now = Utc::now().timestamp();
            let tx = conn.transaction().map_err(map_sql_error)?;
            for pet in &pets {
                upsert_pet(&tx, pet, now).map_err(map_sql_error)?;
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let db = Arc::clone(&self.db);
        let alert = alert.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            upsert_alert(&conn, &alert, Utc::now().timestamp()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save_alerts(&self, alerts: &[Alert]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let alerts = alerts.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let now = Utc::now().timestamp();
            let tx = conn.transaction().map_err(map_sql_error)?;
            for alert in &alerts {
                upsert_alert(&tx, alert, now).map_err(map_sql_error)?;
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn save_story(&self, story: &SuccessStory) -> Result<()> {
        let db = Arc::clone(&self.db);
        let story = story.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            upsert_story(&conn, &story, Utc::now().timestamp()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_pets(&self, owner_id: Option<&str>) -> Result<Vec<Pet>> {
        let db = Arc::clone(&self.db);
        let owner_id = owner_id.map(str::to_string);

        task::spawn_blocking(move || -> Result<Vec<Pet>> {
            let conn = db.get_connection()?;
            let rows = match owner_id {
                Some(owner) => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "{PET_SELECT_SQL} WHERE owner_id = ?1 ORDER BY name ASC"
                        ))
                        .map_err(map_sql_error)?;
                    let mapped = stmt
                        .query_map(params![owner], map_pet_row)
                        .map_err(map_sql_error)?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    mapped.map_err(map_sql_error)?
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!("{PET_SELECT_SQL} ORDER BY name ASC"))
                        .map_err(map_sql_error)?;
                    let mapped = stmt
                        .query_map([], map_pet_row)
                        .map_err(map_sql_error)?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    mapped.map_err(map_sql_error)?
                }
            };
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_pet(&self, id: &str) -> Result<Option<Pet>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<Option<Pet>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("{PET_SELECT_SQL} WHERE id = ?1"))
                .map_err(map_sql_error)?;
            let mut rows =
                stmt.query_map(params![id], map_pet_row).map_err(map_sql_error)?;
            match rows.next() {
                Some(row) => Ok(Some(row.map_err(map_sql_error)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_alerts(&self, pet_id: Option<&str>, active_only: bool) -> Result<Vec<Alert>> {
        let db = Arc::clone(&self.db);
        let pet_id = pet_id.map(str::to_string);

        task::spawn_blocking(move || -> Result<Vec<Alert>> {
            let conn = db.get_connection()?;

            let mut clauses: Vec<&str> = Vec::new();
            if pet_id.is_some() {
                clauses.push("pet_id = ?1");
            }
            if active_only {
                clauses.push("is_active = 1");
            }
            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };
            let sql = format!("{ALERT_SELECT_SQL}{where_clause} ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = match pet_id {
                Some(pet) => stmt
                    .query_map(params![pet], map_alert_row)
                    .map_err(map_sql_error)?
                    .collect::<rusqlite::Result<Vec<_>>>(),
                None => stmt
                    .query_map([], map_alert_row)
                    .map_err(map_sql_error)?
                    .collect::<rusqlite::Result<Vec<_>>>(),
            };
            rows.map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_stories(&self, public_confirmed_only: bool) -> Result<Vec<SuccessStory>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<SuccessStory>> {
            let conn = db.get_connection()?;
            let sql = if public_confirmed_only {
                format!(
                    "{STORY_SELECT_SQL} WHERE is_public = 1 AND is_confirmed = 1 \
                     ORDER BY created_at DESC"
                )
            } else {
                format!("{STORY_SELECT_SQL} ORDER BY created_at DESC")
            };

            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], map_story_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows.map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete_pet(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM pets WHERE id = ?1", params![id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete_alert(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM alerts WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn clear_all(&self) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            tx.execute("DELETE FROM pets", []).map_err(map_sql_error)?;
            tx.execute("DELETE FROM alerts", []).map_err(map_sql_error)?;
            tx.execute("DELETE FROM success_stories", []).map_err(map_sql_error)?;
            tx.execute("DELETE FROM action_queue", []).map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const PET_SELECT_SQL: &str = "SELECT
        id, owner_id, name, species, breed, color, photo_url, qr_tag_id, is_missing,
        last_seen_latitude, last_seen_longitude, last_seen_address,
        created_at, updated_at, last_synced_at
    FROM pets";

const ALERT_SELECT_SQL: &str = "SELECT
        id, pet_id, owner_id, alert_type, message, latitude, longitude, address,
        is_active, created_at, last_synced_at
    FROM alerts";

const STORY_SELECT_SQL: &str = "SELECT
        id, pet_id, title, story, is_public, is_confirmed, created_at, last_synced_at
    FROM success_stories";

fn upsert_pet(conn: &Connection, pet: &Pet, synced_at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pets (
            id, owner_id, name, species, breed, color, photo_url, qr_tag_id, is_missing,
            last_seen_latitude, last_seen_longitude, last_seen_address,
            created_at, updated_at, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            owner_id = excluded.owner_id,
            name = excluded.name,
            species = excluded.species,
            breed = excluded.breed,
            color = excluded.color,
            photo_url = excluded.photo_url,
            qr_tag_id = excluded.qr_tag_id,
            is_missing = excluded.is_missing,
            last_seen_latitude = excluded.last_seen_latitude,
            last_seen_longitude = excluded.last_seen_longitude,
            last_seen_address = excluded.last_seen_address,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            last_synced_at = excluded.last_synced_at",
        params![
            pet.id,
            pet.owner_id,
            pet.name,
            pet.species,
            pet.breed,
            pet.color,
            pet.photo_url,
            pet.qr_tag_id,
            i64::from(pet.is_missing),
            pet.last_seen_latitude,
            pet.last_seen_longitude,
            pet.last_seen_address,
            pet.created_at.timestamp(),
            pet.updated_at.timestamp(),
            synced_at,
        ],
    )?;
    Ok(())
}

fn upsert_alert(conn: &Connection, alert: &Alert, synced_at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO alerts (
            id, pet_id, owner_id, alert_type, message, latitude, longitude, address,
            is_active, created_at, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            pet_id = excluded.pet_id,
            owner_id = excluded.owner_id,
            alert_type = excluded.alert_type,
            message = excluded.message,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            address = excluded.address,
            is_active = excluded.is_active,
            created_at = excluded.created_at,
            last_synced_at = excluded.last_synced_at",
        params![
            alert.id,
            alert.pet_id,
            alert.owner_id,
            alert.alert_type,
            alert.message,
            alert.latitude,
            alert.longitude,
            alert.address,
            i64::from(alert.is_active),
            alert.created_at.timestamp(),
            synced_at,
        ],
    )?;
    Ok(())
}

fn upsert_story(conn: &Connection, story: &SuccessStory, synced_at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO success_stories (
            id, pet_id, title, story, is_public, is_confirmed, created_at, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            pet_id = excluded.pet_id,
            title = excluded.title,
            story = excluded.story,
            is_public = excluded.is_public,
            is_confirmed = excluded.is_confirmed,
            created_at = excluded.created_at,
            last_synced_at = excluded.last_synced_at",
        params![
            story.id,
            story.pet_id,
            story.title,
            story.story,
            i64::from(story.is_public),
            i64::from(story.is_confirmed),
            story.created_at.timestamp(),
            synced_at,
        ],
    )?;
    Ok(())
}

fn map_pet_row(row: &Row<'_>) -> rusqlite::Result<Pet> {
    Ok(Pet {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        species: row.get(3)?,
        breed: row.get(4)?,
        color: row.get(5)?,
        photo_url: row.get(6)?,
        qr_tag_id: row.get(7)?,
        is_missing: row.get::<_, i64>(8)? != 0,
        last_seen_latitude: row.get(9)?,
        last_seen_longitude: row.get(10)?,
        last_seen_address: row.get(11)?,
        created_at: timestamp_to_datetime(row.get(12)?),
        updated_at: timestamp_to_datetime(row.get(13)?),
        last_synced_at: Some(timestamp_to_datetime(row.get(14)?)),
    })
}

fn map_alert_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        pet_id: row.get(1)?,
        owner_id: row.get(2)?,
        alert_type: row.get(3)?,
        message: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        address: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
        created_at: timestamp_to_datetime(row.get(9)?),
        last_synced_at: Some(timestamp_to_datetime(row.get(10)?)),
    })
}

fn map_story_row(row: &Row<'_>) -> rusqlite::Result<SuccessStory> {
    Ok(SuccessStory {
        id: row.get(0)?,
        pet_id: row.get(1)?,
        title: row.get(2)?,
        story: row.get(3)?,
        is_public: row.get::<_, i64>(4)? != 0,
        is_confirmed: row.get::<_, i64>(5)? != 0,
        created_at: timestamp_to_datetime(row.get(6)?),
        last_synced_at: Some(timestamp_to_datetime(row.get(7)?)),
    })
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn map_join_error(err: task::JoinError) -> PetSafeError {
    if err.is_cancelled() {
        PetSafeError::Internal("store task cancelled".into())
    } else {
        PetSafeError::Internal(format!("store task panic: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use petsafe_core::ActionQueue;
    use tempfile::TempDir;

    use super::*;
    use crate::database::SqliteActionQueue;

    async fn setup_cache() -> (SqliteEntityCache, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        let manager = Arc::new(manager);
        let cache = SqliteEntityCache::new(Arc::clone(&manager));

        (cache, manager, temp_dir)
    }

    fn sample_pet(id: &str, name: &str) -> Pet {
        Pet {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            name: name.to_string(),
            species: "dog".to_string(),
            breed: Some("collie".to_string()),
            color: None,
            photo_url: None,
            qr_tag_id: Some(format!("tag-{id}")),
            is_missing: false,
            last_seen_latitude: None,
            last_seen_longitude: None,
            last_seen_address: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            last_synced_at: None,
        }
    }

    fn sample_alert(id: &str, pet_id: &str, created_secs: i64, active: bool) -> Alert {
        Alert {
            id: id.to_string(),
            pet_id: pet_id.to_string(),
            owner_id: "owner-1".to_string(),
            alert_type: "missing_pet".to_string(),
            message: Some("last seen at the park".to_string()),
            latitude: Some(52.1),
            longitude: Some(4.3),
            address: Some("Main St".to_string()),
            is_active: active,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            last_synced_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_pet_overwrites_existing_snapshot() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        cache.save_pet(&sample_pet("pet-1", "Max")).await.expect("save succeeds");

        let mut updated = sample_pet("pet-1", "Maximilian");
        updated.is_missing = true;
        cache.save_pet(&updated).await.expect("second save succeeds");

        let pets = cache.fetch_pets(None).await.expect("fetch succeeds");
        assert_eq!(pets.len(), 1, "no duplicate rows for the same id");
        assert_eq!(pets[0].name, "Maximilian");
        assert!(pets[0].is_missing);
        assert!(pets[0].last_synced_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_pets_sorts_by_name() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        cache.save_pet(&sample_pet("pet-1", "Ziggy")).await.expect("save succeeds");
        cache.save_pet(&sample_pet("pet-2", "Arlo")).await.expect("save succeeds");
        cache.save_pet(&sample_pet("pet-3", "Max")).await.expect("save succeeds");

        let names: Vec<String> = cache
            .fetch_pets(None)
            .await
            .expect("fetch succeeds")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Arlo", "Max", "Ziggy"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_alerts_newest_first_with_filters() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        cache
            .save_alert(&sample_alert("a-old", "pet-1", 1_700_000_000, true))
            .await
            .expect("save succeeds");
        cache
            .save_alert(&sample_alert("a-new", "pet-1", 1_700_000_500, true))
            .await
            .expect("save succeeds");
        cache
            .save_alert(&sample_alert("a-inactive", "pet-2", 1_700_001_000, false))
            .await
            .expect("save succeeds");

        let all = cache.fetch_alerts(None, false).await.expect("fetch succeeds");
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a-inactive", "a-new", "a-old"]);

        let active = cache.fetch_alerts(None, true).await.expect("fetch succeeds");
        assert_eq!(active.len(), 2);

        let for_pet = cache.fetch_alerts(Some("pet-1"), true).await.expect("fetch succeeds");
        assert_eq!(for_pet.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_stories_filters_public_confirmed() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        let mut visible = SuccessStory {
            id: "s-1".to_string(),
            pet_id: "pet-1".to_string(),
            title: "Home again".to_string(),
            story: "Found thanks to a tag scan".to_string(),
            is_public: true,
            is_confirmed: true,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_synced_at: None,
        };
        cache.save_story(&visible).await.expect("save succeeds");

        visible.id = "s-2".to_string();
        visible.is_confirmed = false;
        cache.save_story(&visible).await.expect("save succeeds");

        let public = cache.fetch_stories(true).await.expect("fetch succeeds");
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, "s-1");

        let all = cache.fetch_stories(false).await.expect("fetch succeeds");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_all_wipes_entities_and_queue() {
        let (cache, manager, _temp_dir) = setup_cache().await;
        let queue = SqliteActionQueue::new(Arc::clone(&manager));

        cache.save_pet(&sample_pet("pet-1", "Max")).await.expect("save succeeds");
        cache
            .save_alert(&sample_alert("a-1", "pet-1", 1_700_000_000, true))
            .await
            .expect("save succeeds");
        queue
            .queue_action(&petsafe_domain::ActionPayload::MarkPetFound {
                pet_id: "pet-1".to_string(),
            })
            .await
            .expect("queue succeeds");

        cache.clear_all().await.expect("clear succeeds");

        assert!(cache.fetch_pets(None).await.expect("fetch succeeds").is_empty());
        assert!(cache.fetch_alerts(None, false).await.expect("fetch succeeds").is_empty());
        assert_eq!(queue.pending_count().await.expect("count succeeds"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_pet_removes_only_that_snapshot() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        cache.save_pet(&sample_pet("pet-1", "Max")).await.expect("save succeeds");
        cache.save_pet(&sample_pet("pet-2", "Luna")).await.expect("save succeeds");

        cache.delete_pet("pet-1").await.expect("delete succeeds");

        let pets = cache.fetch_pets(None).await.expect("fetch succeeds");
        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0].id, "pet-2");
        assert!(cache.fetch_pet("pet-1").await.expect("fetch succeeds").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_alert_removes_placeholder() {
        let (cache, _manager, _temp_dir) = setup_cache().await;

        cache
            .save_alert(&sample_alert("local-placeholder", "pet-1", 1_700_000_000, true))
            .await
            .expect("save succeeds");
        cache.delete_alert("local-placeholder").await.expect("delete succeeds");

        assert!(cache.fetch_alerts(None, false).await.expect("fetch succeeds").is_empty());
    }
}
