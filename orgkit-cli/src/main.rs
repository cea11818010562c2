mod migrations;

use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use orgkit_core::common::hash_map_to_string;
use orgkit_core::models::organizations::{
    create_organization, insert_membership, insert_organization, CreateOrganizationError,
    OrganizationDto,
};
use orgkit_core::models::users::{
    find_user_by_email, insert_user, register_user, RegisterUserError, UserDto,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Operation to run: migrate | create-org
    #[clap(long)]
    op: String,

    /// Path to a YAML bootstrap file (create-org only)
    path: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct EnvConfig {
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_pass: String,
    pub db_name: String,
    pub base_url: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Operator bootstrap: an organization plus its founding owner. If a user
/// with the owner email already exists it is reused.
#[derive(Debug, Serialize, Deserialize)]
pub struct YamlBootstrapOrg {
    pub name: String,
    pub campus: Option<String>,
    pub owner_username: String,
    pub owner_email: String,
}

async fn connect(cfg: &EnvConfig) -> Result<Client, anyhow::Error> {
    let conn_str = format!(
        "host={} port={} user={} password={} dbname={}",
        cfg.db_host, cfg.db_port, cfg.db_user, cfg.db_pass, cfg.db_name
    );
    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection error");
        }
    });
    Ok(client)
}

async fn create_org(client: &mut Client, boot: &YamlBootstrapOrg) -> Result<(), anyhow::Error> {
    let tx = client.build_transaction().start().await?;
    let now = Utc::now().naive_utc();

    let founder = match find_user_by_email(&tx)(boot.owner_email.clone()).await? {
        Some(existing) => existing,
        None => {
            let dto = UserDto {
                id: Uuid::new_v4(),
                username: boot.owner_username.clone(),
                email: boot.owner_email.clone(),
            };
            register_user(find_user_by_email(&tx), insert_user(&tx), &dto, now)
                .await
                .map_err(|e| match e {
                    RegisterUserError::UserInvalid(map) => {
                        anyhow::anyhow!("owner invalid: {}", hash_map_to_string(map))
                    }
                    other => anyhow::Error::new(other),
                })?
        }
    };

    let org_dto = OrganizationDto {
        id: Uuid::new_v4(),
        name: boot.name.clone(),
        campus: boot.campus.clone(),
    };
    let (org, membership) = create_organization(
        insert_organization(&tx),
        insert_membership(&tx),
        &org_dto,
        &founder,
        now,
    )
    .await
    .map_err(|e| match e {
        CreateOrganizationError::OrganizationInvalid(map) => {
            anyhow::anyhow!("organization invalid: {}", hash_map_to_string(map))
        }
        other => anyhow::Error::new(other),
    })?;
    tx.commit().await?;

    tracing::info!(
        org_id = %org.id.0,
        owner = %founder.email,
        role = %membership.role,
        "organization created"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg: EnvConfig = envy::from_env()?;
    match args.op.as_str() {
        "migrate" => {
            let mut client = connect(&cfg).await?;
            migrations::run_migrations::run_migrations_up(&mut client).await
        }
        "create-org" => match args.path {
            None => {
                println!("Bootstrap file path required for {} operation", args.op);
                Ok(())
            }
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let boot: YamlBootstrapOrg = serde_yaml::from_reader(file)?;
                let mut client = connect(&cfg).await?;
                create_org(&mut client, &boot).await
            }
        },
        other => {
            println!("operation {} not recognized", other);
            Ok(())
        }
    }
}
