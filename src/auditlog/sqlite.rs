//! SQLite audit store backed by SeaORM.
//!
//! Timestamps are written as fixed-width RFC3339 strings with microsecond
//! precision in UTC (`2026-10-16T08:30:00.000000Z`), so string comparison
//! and `ORDER BY timestamp` follow chronological order.

use crate::auditlog::db_entities::{self, Column, Entity};
use crate::auditlog::entry::Entry;
use crate::auditlog::provider::StorageProvider;
use crate::auditlog::query::{self, FilterField, ListOptions, SortField};
use crate::error_handling::types::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error};
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema,
};
use std::path::{Path, PathBuf};

pub struct SqliteProvider {
    db: DatabaseConnection,
    path: PathBuf,
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_stored_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("invalid stored timestamp {:?}: {}", raw, e)))
}

fn filter_column(field: FilterField) -> Column {
    match field {
        FilterField::TimestampGt
        | FilterField::TimestampLt
        | FilterField::TimestampSince
        | FilterField::TimestampUntil => Column::Timestamp,
        FilterField::Username => Column::Username,
        FilterField::RemoteIp => Column::RemoteIp,
        FilterField::Application => Column::Application,
        FilterField::Action => Column::Action,
        FilterField::AffectedId => Column::AffectedId,
        FilterField::ClientId => Column::ClientId,
        FilterField::ClientHostname => Column::ClientHostname,
    }
}

fn sort_column(field: SortField) -> Column {
    match field {
        SortField::Timestamp => Column::Timestamp,
        SortField::Username => Column::Username,
        SortField::RemoteIp => Column::RemoteIp,
        SortField::Application => Column::Application,
        SortField::Action => Column::Action,
        SortField::AffectedId => Column::AffectedId,
        SortField::ClientId => Column::ClientId,
        SortField::ClientHostname => Column::ClientHostname,
    }
}

fn value_condition(field: FilterField, value: &str) -> Result<SimpleExpr, StorageError> {
    let column = filter_column(field);
    if !field.is_timestamp() {
        return Ok(column.eq(value));
    }
    let ts = query::parse_timestamp_value(value).ok_or_else(|| {
        StorageError::ReadFailed(format!("invalid {} value {:?}", field.name(), value))
    })?;
    let ts = format_timestamp(&ts);
    Ok(match field {
        FilterField::TimestampGt => column.gt(ts),
        FilterField::TimestampLt => column.lt(ts),
        FilterField::TimestampSince => column.gte(ts),
        _ => column.lte(ts),
    })
}

/// Filters are AND-ed, the values of a single filter OR-ed.
fn build_condition(options: &ListOptions) -> Result<Condition, StorageError> {
    let mut all = Condition::all();
    for filter in &options.filters {
        let mut any = Condition::any();
        for value in &filter.values {
            any = any.add(value_condition(filter.field, value)?);
        }
        all = all.add(any);
    }
    Ok(all)
}

fn entry_from_model(model: db_entities::Model) -> Result<Entry, StorageError> {
    Ok(Entry {
        timestamp: parse_stored_timestamp(&model.timestamp)?,
        username: model.username,
        remote_ip: model.remote_ip,
        application: model.application,
        action: model.action,
        id: model.affected_id,
        client_id: model.client_id,
        client_hostname: model.client_hostname,
        request: model.request,
        response: model.response,
    })
}

impl SqliteProvider {
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_schema(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let mut table = schema.create_table_from_entity(Entity);
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;
        for mut index in schema.create_index_from_entity(Entity) {
            index.if_not_exists();
            db.execute(backend.build(&index)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for SqliteProvider {
    async fn open(path: &Path) -> Result<Self, StorageError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opts = ConnectOptions::new(url);
        opts.sqlx_logging(false);
        let db = Database::connect(opts).await.map_err(|e| {
            error!("Failed to open audit store {}: {}", path.display(), e);
            StorageError::ConnectionFailed(format!("{}: {}", path.display(), e))
        })?;
        if let Err(e) = Self::create_schema(&db).await {
            error!("Failed to create audit schema in {}: {}", path.display(), e);
            let _ = db.close().await;
            return Err(StorageError::ConnectionFailed(format!(
                "{}: {}",
                path.display(),
                e
            )));
        }
        debug!("Audit store opened at {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    async fn save(&self, entry: &Entry) -> Result<(), StorageError> {
        let row = db_entities::ActiveModel {
            id: NotSet,
            timestamp: Set(format_timestamp(&entry.timestamp)),
            username: Set(entry.username.clone()),
            remote_ip: Set(entry.remote_ip.clone()),
            application: Set(entry.application.clone()),
            action: Set(entry.action.clone()),
            affected_id: Set(entry.id.clone()),
            client_id: Set(entry.client_id.clone()),
            client_hostname: Set(entry.client_hostname.clone()),
            request: Set(entry.request.clone()),
            response: Set(entry.response.clone()),
        };
        Entity::insert(row)
            .exec(&self.db)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<Entry>, StorageError> {
        let mut select = Entity::find().filter(build_condition(options)?);
        for sort in &options.sorts {
            let order = if sort.ascending { Order::Asc } else { Order::Desc };
            select = select.order_by(sort_column(sort.field), order);
        }
        select = select.order_by(Column::Id, Order::Asc);
        if let Some(page) = options.pagination {
            select = select.offset(page.offset).limit(page.limit);
        }
        let rows = select
            .all(&self.db)
            .await
            .map_err(|e| StorageError::ReadFailed(format!("{}: {}", self.path.display(), e)))?;
        rows.into_iter().map(entry_from_model).collect()
    }

    async fn count(&self, options: &ListOptions) -> Result<u64, StorageError> {
        Entity::find()
            .filter(build_condition(options)?)
            .count(&self.db)
            .await
            .map_err(|e| StorageError::ReadFailed(format!("{}: {}", self.path.display(), e)))
    }

    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let oldest = Entity::find()
            .select_only()
            .column(Column::Timestamp)
            .order_by(Column::Timestamp, Order::Asc)
            .limit(1)
            .into_tuple::<String>()
            .one(&self.db)
            .await
            .map_err(|e| StorageError::ReadFailed(format!("{}: {}", self.path.display(), e)))?;
        oldest.as_deref().map(parse_stored_timestamp).transpose()
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.db
            .clone()
            .close()
            .await
            .map_err(|e| StorageError::CloseFailed(format!("{}: {}", self.path.display(), e)))?;
        debug!("Audit store {} closed", self.path.display());
        Ok(())
    }
}
