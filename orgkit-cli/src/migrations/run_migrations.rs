use tokio_postgres::Client;

use super::migration_01;

const BOOTSTRAP: &str = "create table if not exists migrations (
  id uuid not null primary key,
  name varchar(255) not null,
  seq_order int not null,
  up text not null,
  down text not null,
  applied_on timestamp not null
)";

pub async fn run_migrations_up(client: &mut Client) -> Result<(), anyhow::Error> {
    client.batch_execute(BOOTSTRAP).await?;
    migration_01::run_migration(client).await
}
