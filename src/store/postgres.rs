// src/store/postgres.rs - Voter table access through the bb8 pool

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::error::ConfigError;
use crate::models::stats_models::{PartitionCount, PartitionStat, StoreStatistics};
use crate::models::voter::{
    NameField, VoterRecord, REVIEW_DUPLICATE_DETECTED, STATUS_INACTIVE, UNKNOWN_PARTITION,
};
use crate::store::{duplicate_percentage, RecordStore, TOP_PARTITIONS};
use crate::utils::db_connect::PgPool;
use crate::utils::dedup_config::TableConfig;

pub struct PgRecordStore {
    pool: PgPool,
    table: TableConfig,
}

impl PgRecordStore {
    /// Fails on identifiers that are unsafe to interpolate into SQL.
    pub fn new(pool: PgPool, table: TableConfig) -> Result<Self, ConfigError> {
        table.validate()?;
        Ok(Self { pool, table })
    }

    fn active_predicate(&self) -> String {
        format!(
            "({status} IS NULL OR {status} <> '{inactive}')",
            status = self.table.status_column,
            inactive = STATUS_INACTIVE
        )
    }

    fn bucketed_partition(&self) -> String {
        bucketed_partition_expr(&self.table.partition_column)
    }

    fn select_columns(&self) -> String {
        let t = &self.table;
        format!(
            "{id}::bigint AS id, {name}::text AS voter_name, {rel}::text AS relative_name, \
             {gender}::text AS gender, {part}::text AS partition_key, {status}::text AS status, \
             {dup}::bigint AS duplicate_of, {review}::text AS review_flag",
            id = t.id_column,
            name = t.voter_name_column,
            rel = t.relative_column,
            gender = t.gender_column,
            part = t.partition_column,
            status = t.status_column,
            dup = t.duplicate_of_column,
            review = t.review_column,
        )
    }

    fn name_column(&self, field: NameField) -> &str {
        match field {
            NameField::Voter => &self.table.voter_name_column,
            NameField::Relative => &self.table.relative_column,
        }
    }

    fn row_to_record(row: &Row) -> VoterRecord {
        VoterRecord {
            id: row.get("id"),
            voter_name: row.get("voter_name"),
            relative_name: row.get("relative_name"),
            gender_raw: row.get("gender"),
            partition_key: row.get("partition_key"),
            status: row.get("status"),
            duplicate_of: row.get("duplicate_of"),
            review_flag: row.get("review_flag"),
        }
    }
}

/// Partition key as text, with null and empty values folded into the UNKNOWN
/// bucket. The cast keeps integer ward or booth columns usable.
fn bucketed_partition_expr(column: &str) -> String {
    format!("COALESCE(NULLIF({}::text, ''), '{}')", column, UNKNOWN_PARTITION)
}

/// `%value%` with LIKE wildcards in the value matched literally.
fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn validate(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for table validation")?;

        let rows = conn
            .query(
                "SELECT column_name::text AS column_name
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2",
                &[&self.table.schema, &self.table.table],
            )
            .await
            .context("Failed to read table columns from information_schema")?;

        let existing: HashSet<String> = rows.iter().map(|r| r.get("column_name")).collect();
        if existing.is_empty() {
            warn!("⚠️ Table {} not found or has no columns", self.table.qualified_table());
        }
        for (_, column) in self.table.columns() {
            if !existing.contains(column) {
                return Err(ConfigError::UnknownColumn {
                    table: self.table.qualified_table(),
                    column: column.to_string(),
                }
                .into());
            }
        }

        info!("✅ Table {} validated", self.table.qualified_table());
        Ok(())
    }

    async fn fetch_active_records(
        &self,
        partition_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VoterRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for fetch_active_records")?;

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_columns(),
            self.table.qualified_table(),
            self.active_predicate()
        );
        let limit_param = limit.map(|l| l as i64);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(partition) = partition_filter.as_ref() {
            params.push(partition);
            sql.push_str(&format!(" AND {} = ${}", self.bucketed_partition(), params.len()));
        }
        sql.push_str(&format!(
            " ORDER BY {} ASC, {} ASC",
            self.bucketed_partition(),
            self.table.id_column
        ));
        if let Some(limit) = limit_param.as_ref() {
            params.push(limit);
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }
        debug!("fetch_active_records SQL: {}", sql);

        let rows = conn
            .query(sql.as_str(), &params)
            .await
            .context("Failed to fetch active voter records")?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn mark_duplicates(&self, pairs: &[(i64, i64)]) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for mark_duplicates")?;

        let member_ids: Vec<i64> = pairs.iter().map(|(member, _)| *member).collect();
        let primary_ids: Vec<i64> = pairs.iter().map(|(_, primary)| *primary).collect();
        let t = &self.table;
        let sql = format!(
            "UPDATE {table} AS t
             SET {status} = '{inactive}', {dup} = v.primary_id, {review} = '{flag}'
             FROM UNNEST($1::bigint[], $2::bigint[]) AS v(member_id, primary_id)
             WHERE t.{id} = v.member_id",
            table = t.qualified_table(),
            status = t.status_column,
            inactive = STATUS_INACTIVE,
            dup = t.duplicate_of_column,
            review = t.review_column,
            flag = REVIEW_DUPLICATE_DETECTED,
            id = t.id_column,
        );

        let updated = conn
            .execute(sql.as_str(), &[&member_ids, &primary_ids])
            .await
            .context("Failed to mark duplicate records as INACTIVE")?;
        Ok(updated as usize)
    }

    async fn reset_markers(&self) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for reset_markers")?;

        let t = &self.table;
        let sql = format!(
            "UPDATE {table}
             SET {status} = NULL, {dup} = NULL, {review} = NULL
             WHERE {status} = '{inactive}' OR {review} IS NOT NULL OR {dup} IS NOT NULL",
            table = t.qualified_table(),
            status = t.status_column,
            dup = t.duplicate_of_column,
            review = t.review_column,
            inactive = STATUS_INACTIVE,
        );
        let reset = conn
            .execute(sql.as_str(), &[])
            .await
            .context("Failed to reset dedup markers")?;
        Ok(reset as usize)
    }

    async fn fetch_records_by_ids(&self, ids: &[i64]) -> Result<Vec<VoterRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for fetch_records_by_ids")?;

        let id_list: Vec<i64> = ids.to_vec();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}::bigint = ANY($1) ORDER BY {} ASC",
            self.select_columns(),
            self.table.qualified_table(),
            self.table.id_column,
            self.table.id_column
        );
        let rows = conn
            .query(sql.as_str(), &[&id_list])
            .await
            .context("Failed to fetch voter records by id")?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for statistics")?;

        let status = &self.table.status_column;
        let partition = self.bucketed_partition();
        let totals_sql = format!(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE {status} = '{inactive}') AS inactive,
                    COUNT(DISTINCT {partition}) AS partitions
             FROM {table}",
            status = status,
            inactive = STATUS_INACTIVE,
            partition = partition,
            table = self.table.qualified_table(),
        );
        let totals = conn
            .query_one(totals_sql.as_str(), &[])
            .await
            .context("Failed to compute voter table totals")?;
        let total = totals.get::<_, i64>("total") as usize;
        let inactive = totals.get::<_, i64>("inactive") as usize;
        let total_partitions = totals.get::<_, i64>("partitions") as usize;

        let top_sql = format!(
            "SELECT {partition} AS partition_name,
                    COUNT(*) AS total_records,
                    COUNT(*) FILTER (WHERE {status} = '{inactive}') AS inactive_records
             FROM {table}
             GROUP BY 1
             ORDER BY inactive_records DESC, partition_name ASC
             LIMIT {limit}",
            partition = partition,
            status = status,
            inactive = STATUS_INACTIVE,
            table = self.table.qualified_table(),
            limit = TOP_PARTITIONS,
        );
        let top_partitions = conn
            .query(top_sql.as_str(), &[])
            .await
            .context("Failed to compute per-partition statistics")?
            .iter()
            .map(|row| PartitionStat {
                partition: row.get("partition_name"),
                total_records: row.get::<_, i64>("total_records") as usize,
                inactive_records: row.get::<_, i64>("inactive_records") as usize,
            })
            .collect();

        Ok(StoreStatistics {
            total_records: total,
            active_records: total - inactive,
            inactive_records: inactive,
            duplicate_percentage: duplicate_percentage(inactive, total),
            total_partitions,
            top_partitions,
        })
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionCount>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_partitions")?;

        let sql = format!(
            "SELECT {partition} AS partition_name, COUNT(*) AS active_records
             FROM {table}
             WHERE {active}
             GROUP BY 1
             ORDER BY active_records DESC, partition_name ASC",
            partition = self.bucketed_partition(),
            table = self.table.qualified_table(),
            active = self.active_predicate(),
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to list partitions")?;
        Ok(rows
            .iter()
            .map(|row| PartitionCount {
                partition: row.get("partition_name"),
                active_records: row.get::<_, i64>("active_records") as usize,
            })
            .collect())
    }

    async fn search_candidates(
        &self,
        patterns: &[String],
        fields: &[NameField],
        partition_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VoterRecord>> {
        if patterns.is_empty() || fields.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for search_candidates")?;

        let like_values: Vec<String> = patterns.iter().map(|p| contains_pattern(p)).collect();
        let limit_param = limit as i64;
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut conditions = Vec::new();
        for value in &like_values {
            params.push(value);
            for field in fields {
                conditions.push(format!(
                    "{}::text ILIKE ${}",
                    self.name_column(*field),
                    params.len()
                ));
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} WHERE ({})",
            self.select_columns(),
            self.table.qualified_table(),
            conditions.join(" OR ")
        );
        if let Some(partition) = partition_filter.as_ref() {
            params.push(partition);
            sql.push_str(&format!(" AND {} = ${}", self.bucketed_partition(), params.len()));
        }
        params.push(&limit_param);
        sql.push_str(&format!(
            " ORDER BY {} ASC LIMIT ${}",
            self.table.id_column,
            params.len()
        ));
        debug!("search_candidates SQL: {}", sql);

        let rows = conn
            .query(sql.as_str(), &params)
            .await
            .context("Failed to fetch search candidates")?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }
}
