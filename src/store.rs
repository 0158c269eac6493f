use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{MySql, QueryBuilder, Row};

use crate::config::validate_identifier;
use crate::error::EtlError;
use crate::models::{RawRecord, SummaryRow};

const INSERT_BATCH: usize = 1000;

/// Where raw device rows come from.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>, EtlError>;
    async fn close(self) -> Result<(), EtlError>;
}

/// Where hourly summaries go. `replace_summaries` discards prior contents.
#[allow(async_fn_in_trait)]
pub trait SummarySink {
    async fn replace_summaries(&self, rows: &[SummaryRow]) -> Result<u64, EtlError>;
    async fn fetch_summaries(&self) -> Result<Vec<SummaryRow>, EtlError>;
    async fn close(self) -> Result<(), EtlError>;
}

pub struct PgSource {
    pool: PgPool,
    table: String,
}

impl PgSource {
    pub async fn connect(url: &str, table: &str) -> Result<Self, EtlError> {
        validate_identifier(table)?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| EtlError::from_connect("source", e))?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

impl RecordSource for PgSource {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>, EtlError> {
        // Coerce in SQL so json/text locations and int/text times all decode.
        let query = format!(
            "SELECT device_id, temperature::float8 AS temperature, \
             location::text AS location, \"time\"::text AS \"time\" \
             FROM {}",
            self.table
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::Read(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(RawRecord {
                device_id: decode(&row, "device_id")?,
                temperature: decode(&row, "temperature")?,
                location: decode(&row, "location")?,
                time: decode(&row, "time")?,
            });
        }

        Ok(records)
    }

    async fn close(self) -> Result<(), EtlError> {
        self.pool.close().await;
        Ok(())
    }
}

pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
}

impl MySqlSink {
    pub async fn connect(url: &str, table: &str) -> Result<Self, EtlError> {
        validate_identifier(table)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| EtlError::from_connect("sink", e))?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    async fn execute(&self, sql: &str) -> Result<(), EtlError> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::Write(format!("{sql}: {e}")))?;
        Ok(())
    }
}

impl SummarySink for MySqlSink {
    /// Builds the new table beside the live one and swaps it in with a
    /// single `RENAME TABLE`, so readers never observe a partial table.
    async fn replace_summaries(&self, rows: &[SummaryRow]) -> Result<u64, EtlError> {
        let table = &self.table;
        let staging = format!("{table}_staging");
        let retired = format!("{table}_retired");

        self.execute(&format!("DROP TABLE IF EXISTS {staging}")).await?;
        self.execute(&format!(
            "CREATE TABLE {staging} (\
             device_id VARCHAR(255) NOT NULL, \
             hour_start DATETIME NOT NULL, \
             max_temperature DOUBLE NOT NULL, \
             sample_count BIGINT NOT NULL, \
             total_distance_km DOUBLE NOT NULL)"
        ))
        .await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
                "INSERT INTO {staging} \
                 (device_id, hour_start, max_temperature, sample_count, total_distance_km) "
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.device_id)
                    .push_bind(row.hour_start.naive_utc())
                    .push_bind(row.max_temperature)
                    .push_bind(row.sample_count)
                    .push_bind(row.total_distance_km);
            });
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| EtlError::Write(e.to_string()))?;
            inserted += result.rows_affected();
        }

        self.execute(&format!("CREATE TABLE IF NOT EXISTS {table} LIKE {staging}"))
            .await?;
        self.execute(&format!("DROP TABLE IF EXISTS {retired}")).await?;
        self.execute(&format!(
            "RENAME TABLE {table} TO {retired}, {staging} TO {table}"
        ))
        .await?;
        self.execute(&format!("DROP TABLE {retired}")).await?;

        Ok(inserted)
    }

    async fn fetch_summaries(&self) -> Result<Vec<SummaryRow>, EtlError> {
        let query = format!(
            "SELECT device_id, hour_start, max_temperature, sample_count, total_distance_km \
             FROM {} ORDER BY device_id, hour_start",
            self.table
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::Read(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let hour_start: NaiveDateTime = decode(&row, "hour_start")?;
            summaries.push(SummaryRow {
                device_id: decode(&row, "device_id")?,
                hour_start: hour_start.and_utc(),
                max_temperature: decode(&row, "max_temperature")?,
                sample_count: decode(&row, "sample_count")?,
                total_distance_km: decode(&row, "total_distance_km")?,
            });
        }

        Ok(summaries)
    }

    async fn close(self) -> Result<(), EtlError> {
        self.pool.close().await;
        Ok(())
    }
}

fn decode<'r, R, T>(row: &'r R, column: &'r str) -> Result<T, EtlError>
where
    R: Row,
    T: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    &'r str: sqlx::ColumnIndex<R>,
{
    row.try_get(column)
        .map_err(|e| EtlError::Read(format!("column {column}: {e}")))
}

/// Creates the source table if needed, in the shape the upstream generator
/// writes it.
pub async fn ensure_source_table(pool: &PgPool, table: &str) -> anyhow::Result<()> {
    validate_identifier(table)?;
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         device_id VARCHAR(255), \
         temperature INTEGER, \
         location JSON, \
         \"time\" VARCHAR(255))"
    ))
    .execute(pool)
    .await
    .with_context(|| format!("failed to create table {table}"))?;
    Ok(())
}

pub async fn insert_raw(pool: &PgPool, table: &str, record: &RawRecord) -> anyhow::Result<u64> {
    let result = sqlx::query(&format!(
        "INSERT INTO {table} (device_id, temperature, location, \"time\") \
         VALUES ($1, $2::float8, $3::json, $4)"
    ))
    .bind(&record.device_id)
    .bind(record.temperature)
    .bind(&record.location)
    .bind(&record.time)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert record for {}", record.device_id))?;
    Ok(result.rows_affected())
}

pub async fn seed(pool: &PgPool, table: &str) -> anyhow::Result<usize> {
    ensure_source_table(pool, table).await?;

    let records = [
        ("device_1", 42.0, "-23.3827865", "74.578627", "1687060684"),
        ("device_1", 38.0, "-23.3827873", "74.578628", "1687061284"),
        ("device_2", 35.0, "18.5204", "73.8567", "1687060684"),
        ("device_2", 40.0, "19.0760", "72.8777", "1687060690"),
        ("device_3", 21.0, "18.5196", "73.8554", "1687064400"),
        ("device_3", 24.0, "17.2894", "74.1818", "1687065000"),
        ("device_3", 23.0, "16.7050", "74.2433", "1687065600"),
    ];

    let mut inserted = 0usize;
    for (device_id, temperature, latitude, longitude, time) in records {
        let record = RawRecord {
            device_id: device_id.to_string(),
            temperature,
            location: serde_json::json!({ "latitude": latitude, "longitude": longitude })
                .to_string(),
            time: time.to_string(),
        };
        inserted += insert_raw(pool, table, &record).await? as usize;
    }

    Ok(inserted)
}

/// Loads `device_id,temperature,location,time` rows from a CSV file.
pub async fn import_csv(
    pool: &PgPool,
    table: &str,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    ensure_source_table(pool, table).await?;

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<RawRecord>().enumerate() {
        let record = result.with_context(|| format!("invalid CSV row {}", line + 1))?;
        inserted += insert_raw(pool, table, &record).await? as usize;
    }

    Ok(inserted)
}

pub async fn connect_source_pool(url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}
