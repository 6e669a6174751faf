use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    errors::{AppError, ParseError},
    models::{Track, TrackSummary},
    point::{Point, Segment},
    statistics::{Bounds, TrackStatistics},
    storage::TrackStore,
};

/// PostgreSQL-backed [`TrackStore`].
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct TrackRow {
    id: Uuid,
    owner_id: String,
    title: String,
    filename: String,
    total_distance_meters: f64,
    elevation_gain_meters: Option<f64>,
    elevation_loss_meters: Option<f64>,
    start_time: Option<OffsetDateTime>,
    end_time: Option<OffsetDateTime>,
    duration_seconds: Option<f64>,
    moving_duration_seconds: Option<f64>,
    max_speed_meters_per_second: Option<f64>,
    point_count: i64,
    segment_count: i64,
    min_lat: Option<f64>,
    min_lon: Option<f64>,
    max_lat: Option<f64>,
    max_lon: Option<f64>,
    raw_object_path: Option<String>,
    created_at: OffsetDateTime,
}

impl TrackRow {
    fn statistics(&self) -> TrackStatistics {
        let bounds = match (self.min_lat, self.min_lon, self.max_lat, self.max_lon) {
            (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => Some(Bounds {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            }),
            _ => None,
        };

        TrackStatistics {
            total_distance_meters: self.total_distance_meters,
            elevation_gain_meters: self.elevation_gain_meters,
            elevation_loss_meters: self.elevation_loss_meters,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_seconds: self.duration_seconds,
            moving_duration_seconds: self.moving_duration_seconds,
            max_speed_meters_per_second: self.max_speed_meters_per_second,
            point_count: self.point_count as usize,
            segment_count: self.segment_count as usize,
            bounds,
        }
    }

    fn into_summary(self) -> TrackSummary {
        TrackSummary {
            statistics: self.statistics(),
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            filename: self.filename,
            created_at: self.created_at,
        }
    }

    fn into_track(self, segments: Vec<Segment>) -> Track {
        Track {
            statistics: self.statistics(),
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            filename: self.filename,
            segments,
            raw_object_path: self.raw_object_path,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PointRow {
    segment_index: i32,
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    recorded_at: Option<OffsetDateTime>,
}

/// Seven binds per row keeps each insert well under the 65535 parameter limit.
const POINT_ROWS_PER_INSERT: usize = 5_000;

const TRACK_COLUMNS: &str = r#"
    id, owner_id, title, filename,
    total_distance_meters, elevation_gain_meters, elevation_loss_meters,
    start_time, end_time, duration_seconds, moving_duration_seconds,
    max_speed_meters_per_second, point_count, segment_count,
    min_lat, min_lon, max_lat, max_lon,
    raw_object_path, created_at
"#;

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.into()))
    }

    async fn get_points(&self, track_id: Uuid) -> Result<Vec<Segment>, AppError> {
        let rows: Vec<PointRow> = sqlx::query_as(
            r#"
            SELECT segment_index, latitude, longitude, elevation, recorded_at
            FROM track_points
            WHERE track_id = $1
            ORDER BY segment_index, point_index
            "#,
        )
        .bind(track_id)
        .fetch_all(&self.pool)
        .await?;

        let mut segments = Vec::new();
        let mut current: Vec<Point> = Vec::new();
        let mut current_index = None;

        for row in rows {
            if current_index.is_some_and(|i| i != row.segment_index) {
                segments.extend(Segment::new(std::mem::take(&mut current)));
            }
            current_index = Some(row.segment_index);
            let point = Point::new(row.latitude, row.longitude, row.elevation, row.recorded_at)
                .map_err(ParseError::from)?;
            current.push(point);
        }
        segments.extend(Segment::new(current));

        Ok(segments)
    }
}

#[async_trait]
impl TrackStore for Database {
    async fn save_track(&self, track: &Track) -> Result<(), AppError> {
        let stats = &track.statistics;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tracks (id, owner_id, title, filename,
                                total_distance_meters, elevation_gain_meters, elevation_loss_meters,
                                start_time, end_time, duration_seconds, moving_duration_seconds,
                                max_speed_meters_per_second, point_count, segment_count,
                                min_lat, min_lon, max_lat, max_lon,
                                raw_object_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(track.id)
        .bind(&track.owner_id)
        .bind(&track.title)
        .bind(&track.filename)
        .bind(stats.total_distance_meters)
        .bind(stats.elevation_gain_meters)
        .bind(stats.elevation_loss_meters)
        .bind(stats.start_time)
        .bind(stats.end_time)
        .bind(stats.duration_seconds)
        .bind(stats.moving_duration_seconds)
        .bind(stats.max_speed_meters_per_second)
        .bind(stats.point_count as i64)
        .bind(stats.segment_count as i64)
        .bind(stats.bounds.map(|b| b.min_lat))
        .bind(stats.bounds.map(|b| b.min_lon))
        .bind(stats.bounds.map(|b| b.max_lat))
        .bind(stats.bounds.map(|b| b.max_lon))
        .bind(&track.raw_object_path)
        .bind(track.created_at)
        .execute(&mut *tx)
        .await?;

        let points: Vec<(i32, i32, &Point)> = track
            .segments
            .iter()
            .enumerate()
            .flat_map(|(segment_index, segment)| {
                segment
                    .points()
                    .iter()
                    .enumerate()
                    .map(move |(point_index, point)| (segment_index as i32, point_index as i32, point))
            })
            .collect();

        for chunk in points.chunks(POINT_ROWS_PER_INSERT) {
            let mut insert = QueryBuilder::<Postgres>::new(
                "INSERT INTO track_points (track_id, segment_index, point_index, \
                 latitude, longitude, elevation, recorded_at) ",
            );
            insert.push_values(chunk, |mut row, (segment_index, point_index, point)| {
                row.push_bind(track.id)
                    .push_bind(*segment_index)
                    .push_bind(*point_index)
                    .push_bind(point.lat())
                    .push_bind(point.lon())
                    .push_bind(point.elevation())
                    .push_bind(point.timestamp());
            });
            insert.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_track(&self, id: Uuid) -> Result<Option<Track>, AppError> {
        let row: Option<TrackRow> =
            sqlx::query_as(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let segments = self.get_points(row.id).await?;
                Ok(Some(row.into_track(segments)))
            }
            None => Ok(None),
        }
    }

    async fn list_tracks(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError> {
        let rows: Vec<TrackRow> = sqlx::query_as(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE owner_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrackRow::into_summary).collect())
    }

    async fn rename_track(&self, id: Uuid, title: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE tracks SET title = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_track(&self, id: Uuid) -> Result<bool, AppError> {
        // track_points cascade.
        let result = sqlx::query("DELETE FROM tracks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
