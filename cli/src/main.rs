//! docman-admin: maintenance tool for a DocMan database.
//!
//! Seeds reference data, clears collections, creates users and mints bearer
//! tokens for development. Connection settings are read the same way the
//! server reads them.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bson::DateTime as BsonDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use docman::auth::models::Role;
use docman::auth::password::hash_password;
use docman::auth::token::TokenKeys;
use docman::config::Settings;
use docman::db::models::{Category, ExternalContactType, Team, User};
use docman::db::user_repository::{MongoUserRepository, UserRepository};
use docman::services::validation::{validate_email, validate_name, validate_password};
use tracing_subscriber::EnvFilter;

mod seed;

#[derive(Parser, Debug)]
#[command(name = "docman-admin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file shared with the server
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert reference data that is not present yet
    Seed {
        collection: SeedTarget,

        /// YAML file to read instead of the bundled data
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Delete every record of a collection
    Clear {
        collection: Collection,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Create a user account
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "viewer")]
        role: String,
    },

    /// Print a bearer token for an existing user
    IssueToken {
        #[arg(long)]
        email: String,

        /// Lifetime in hours. Defaults to `auth.token_ttl_hours`.
        #[arg(long)]
        ttl_hours: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SeedTarget {
    Categories,
    ContactTypes,
    Teams,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Collection {
    Users,
    Documents,
    Files,
    Notifications,
    ReviewAssignments,
    BlacklistedTokens,
    Categories,
    Teams,
    Projects,
    ContactTypes,
    Contacts,
    Charts,
}

impl Collection {
    fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Documents => "documents",
            Collection::Files => "files",
            Collection::Notifications => "notifications",
            Collection::ReviewAssignments => "reviewAssignments",
            Collection::BlacklistedTokens => "blacklistedTokens",
            Collection::Categories => "categories",
            Collection::Teams => "teams",
            Collection::Projects => "projects",
            Collection::ContactTypes => "externalContactTypes",
            Collection::Contacts => "externalContacts",
            Collection::Charts => "customCharts",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "docman=info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let client = mongodb::Client::with_uri_str(settings.mongo.connection_uri()?)
        .await
        .context("Failed to connect to MongoDB")?;
    let db = client.database(&settings.mongo.database);

    match cli.command {
        Commands::Seed { collection, file } => {
            let data = match file {
                Some(path) => seed::ReferenceData::from_file(&path)?,
                None => seed::ReferenceData::bundled()?,
            };
            run_seed(&db, collection, &data).await
        }
        Commands::Clear { collection, yes } => {
            if !yes {
                bail!("Refusing to clear '{}' without --yes", collection.name());
            }
            let result = db
                .collection::<bson::Document>(collection.name())
                .delete_many(bson::doc! {})
                .await?;
            println!("Deleted {} records from {}", result.deleted_count, collection.name());
            Ok(())
        }
        Commands::CreateUser {
            name,
            email,
            password,
            role,
        } => {
            let role = Role::from_str_ci(&role).with_context(|| format!("Unknown role '{role}'"))?;
            let id = create_user(&db, &name, &email, &password, role).await?;
            println!("{id}");
            Ok(())
        }
        Commands::IssueToken { email, ttl_hours } => {
            let users = MongoUserRepository::new(&db);
            let user = users
                .find_by_email(&email.trim().to_lowercase())
                .await?
                .with_context(|| format!("No user with email '{email}'"))?;
            let id = user.id.context("Stored user has no id")?;

            let ttl = chrono::Duration::hours(ttl_hours.unwrap_or(settings.auth.token_ttl_hours));
            let token = TokenKeys::from_secret(&settings.auth.jwt_secret).issue(
                &id.to_hex(),
                user.role,
                chrono::Utc::now(),
                ttl,
            )?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn run_seed(
    db: &mongodb::Database,
    target: SeedTarget,
    data: &seed::ReferenceData,
) -> Result<()> {
    if matches!(target, SeedTarget::Categories | SeedTarget::All) {
        let added = seed::seed::<Category>(db, &data.categories).await?;
        println!("categories: {added} added");
    }
    if matches!(target, SeedTarget::ContactTypes | SeedTarget::All) {
        let added = seed::seed::<ExternalContactType>(db, &data.contact_types).await?;
        println!("contact types: {added} added");
    }
    if matches!(target, SeedTarget::Teams | SeedTarget::All) {
        let added = seed::seed::<Team>(db, &data.teams).await?;
        println!("teams: {added} added");
    }
    Ok(())
}

async fn create_user(
    db: &mongodb::Database,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<bson::oid::ObjectId> {
    let name = validate_name(name)?;
    let email = validate_email(email)?;
    validate_password(password)?;

    let users = MongoUserRepository::new(db);
    users.ensure_indexes().await?;
    if users.find_by_email(&email).await?.is_some() {
        bail!("A user with email '{email}' already exists");
    }

    let now = BsonDateTime::now();
    let user = users
        .insert(User {
            id: None,
            name,
            email,
            username: None,
            password_hash: hash_password(password)?,
            role,
            department: None,
            title: None,
            phone: None,
            team: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(email = %user.email, %role, "User created");
    user.id.context("Inserted user has no id")
}
