use chrono::Utc;
use tokio_postgres::Client;
use uuid::Uuid;

use orgkit_core::models::migrations::{self, Migration, MigrationCriteria};

const UP: &[&str] = &[
    "create table if not exists users (
  id uuid not null primary key,
  username varchar(255) not null,
  email varchar(255) not null unique,
  verified boolean not null default false,
  created_at timestamp not null default current_timestamp
)",
    "create type org_role as enum ('owner', 'admin', 'creator', 'member')",
    "create type payment_status as enum ('created', 'paid', 'failed')",
    "create table if not exists organizations (
  id uuid not null primary key,
  name varchar(255) not null,
  campus varchar(255),
  created_by uuid references users(id),
  created_at timestamp not null default current_timestamp,
  updated_at timestamp not null default current_timestamp
)",
    "create table if not exists payments (
  id uuid not null primary key,
  user_id uuid references users(id),
  order_id varchar(100) not null unique,
  gateway_payment_id varchar(100),
  signature varchar(255),
  amount bigint not null,
  status payment_status not null default 'created',
  failure_reason varchar(255),
  created_at timestamp not null default current_timestamp
)",
    "create table if not exists memberships (
  id uuid not null primary key,
  user_id uuid not null references users(id),
  org_id uuid not null references organizations(id),
  role org_role not null default 'member',
  is_active boolean not null default true,
  joined_at timestamp not null default current_timestamp,
  unique (user_id, org_id)
)",
    // the real one-owner enforcement; application checks are advisory
    "create unique index one_owner_per_org on memberships (org_id) where role = 'owner'",
    "create table if not exists invites (
  id uuid not null primary key,
  token uuid not null unique,
  org_id uuid not null references organizations(id),
  email varchar(255) not null,
  role org_role not null default 'member',
  invited_by uuid references users(id),
  payment_id uuid unique references payments(id),
  accepted boolean not null default false,
  created_at timestamp not null default current_timestamp,
  expires_at timestamp not null
)",
];

const DOWN: &[&str] = &[
    "drop table if exists invites",
    "drop table if exists memberships",
    "drop table if exists payments",
    "drop table if exists organizations",
    "drop table if exists users",
    "drop type if exists payment_status",
    "drop type if exists org_role",
];

pub async fn run_migration(client: &mut Client) -> Result<(), anyhow::Error> {
    let tx = client.build_transaction().start().await?;
    let crit = vec![MigrationCriteria::SeqOrderEq(1)];
    let applied = migrations::find_one(&tx)(crit).await?;
    match applied {
        Some(_) => {
            tracing::info!("migration 1 already applied, skipping");
        }
        None => {
            for sql in UP {
                let stmt = tx.prepare(sql).await?;
                tx.execute(&stmt, &[]).await?;
            }
            let record = Migration {
                id: Uuid::new_v4(),
                name: "migration_01".to_string(),
                seq_order: 1,
                up: UP.join(";\n"),
                down: DOWN.join(";\n"),
                applied_on: Utc::now().naive_utc(),
            };
            migrations::create(&tx)(record).await?;
            tracing::info!("migration 1 applied");
        }
    }
    tx.commit().await?;
    Ok(())
}
