use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::common::field_names_without_id;
use crate::postgres_common::core::{entity, insert, select_one, QueryCondition};

/// Applied-migration bookkeeping. The runner consults this table before
/// executing a numbered migration and records it afterwards, all in one
/// transaction.
entity! {
    #[derive(Debug, Clone)]
    pub struct Migration {
        pub id: Uuid,
        pub name: String,
        pub seq_order: i32,
        pub up: String,
        pub down: String,
        pub applied_on: NaiveDateTime,
    }
}

pub fn migration_table() -> String {
    "migrations".to_string()
}

pub fn find_one<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Vec<MigrationCriteria>) -> BoxFuture<'a, Result<Option<Migration>, anyhow::Error>>
{
    move |crit: Vec<MigrationCriteria>| {
        Box::pin(async move {
            let conds: Vec<QueryCondition> = crit.iter().map(|c| c.to_query_condition()).collect();
            select_one(tx, &migration_table(), &conds, Migration::from_row).await
        })
    }
}

pub fn create<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Migration) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |migration: Migration| {
        Box::pin(async move {
            let fields = field_names_without_id(Migration::field_names());
            insert(
                tx,
                &migration_table(),
                "id",
                fields.as_slice(),
                &migration.id,
                &migration.to_params(),
            )
            .await
        })
    }
}
