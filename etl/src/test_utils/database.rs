use chrono::{DateTime, Utc};
use indexer_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use crate::source::postgres::PgSource;

/// Tables of the `content` schema read by [`PgSource`].
///
/// Link tables accept `NULL` film work ids, as the production schema does.
const CONTENT_SCHEMA: &str = r#"
    create schema content;

    create table content.film_work (
        id uuid primary key,
        title text,
        description text,
        rating double precision,
        modified timestamptz not null default now()
    );

    create table content.person (
        id uuid primary key,
        full_name text not null,
        modified timestamptz not null default now()
    );

    create table content.genre (
        id uuid primary key,
        name text not null,
        description text,
        modified timestamptz not null default now()
    );

    create table content.person_film_work (
        id uuid primary key default gen_random_uuid(),
        film_work_id uuid references content.film_work (id),
        person_id uuid not null references content.person (id),
        role text not null
    );

    create table content.genre_film_work (
        id uuid primary key default gen_random_uuid(),
        film_work_id uuid references content.film_work (id),
        genre_id uuid not null references content.genre (id)
    );
"#;

/// Reads connection parameters of the local test server from the environment.
///
/// - `TESTS_DATABASE_HOST`: Postgres server hostname (required)
/// - `TESTS_DATABASE_PORT`: Postgres server port (required)
/// - `TESTS_DATABASE_USERNAME`: Database user (required)
/// - `TESTS_DATABASE_PASSWORD`: Database password (optional)
///
/// Every call picks a new database name so tests never share data.
fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        require_tls: false,
    }
}

/// A throwaway database holding an empty `content` schema.
pub struct SourceDatabase {
    config: PgConnectionConfig,
    pool: PgPool,
}

impl SourceDatabase {
    /// Returns a [`PgSource`] reading this database through its own lazy pool.
    pub fn source(&self) -> PgSource {
        PgSource::new(&self.config)
    }

    pub async fn insert_film_work(
        &self,
        id: Uuid,
        title: &str,
        rating: Option<f64>,
        modified: DateTime<Utc>,
    ) {
        sqlx::query(
            "insert into content.film_work (id, title, rating, modified) values ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(title)
        .bind(rating)
        .bind(modified)
        .execute(&self.pool)
        .await
        .expect("Failed to insert film work");
    }

    pub async fn insert_person(&self, id: Uuid, full_name: &str, modified: DateTime<Utc>) {
        sqlx::query("insert into content.person (id, full_name, modified) values ($1, $2, $3)")
            .bind(id)
            .bind(full_name)
            .bind(modified)
            .execute(&self.pool)
            .await
            .expect("Failed to insert person");
    }

    pub async fn insert_genre(&self, id: Uuid, name: &str, modified: DateTime<Utc>) {
        sqlx::query("insert into content.genre (id, name, modified) values ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(modified)
            .execute(&self.pool)
            .await
            .expect("Failed to insert genre");
    }

    /// Links a person to a film work. A `None` film work leaves a dangling link.
    pub async fn link_person(&self, film_work_id: Option<Uuid>, person_id: Uuid, role: &str) {
        sqlx::query(
            "insert into content.person_film_work (film_work_id, person_id, role) values ($1, $2, $3)",
        )
        .bind(film_work_id)
        .bind(person_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .expect("Failed to link person");
    }

    /// Links a genre to a film work. A `None` film work leaves a dangling link.
    pub async fn link_genre(&self, film_work_id: Option<Uuid>, genre_id: Uuid) {
        sqlx::query("insert into content.genre_film_work (film_work_id, genre_id) values ($1, $2)")
            .bind(film_work_id)
            .bind(genre_id)
            .execute(&self.pool)
            .await
            .expect("Failed to link genre");
    }

    /// Closes every connection and drops the database.
    pub async fn drop_database(self) {
        self.pool.close().await;

        let options: PgConnectOptions = self.config.without_db();
        let mut connection = PgConnection::connect_with(&options)
            .await
            .expect("Failed to connect to Postgres");
        connection
            .execute(&*format!(
                r#"drop database if exists "{}" with (force)"#,
                self.config.name
            ))
            .await
            .expect("Failed to drop test database");
    }
}

/// Creates a new database with the `content` schema on the server described by the
/// `TESTS_DATABASE_*` variables.
///
/// # Panics
///
/// Panics if the server is unreachable or the schema cannot be created.
pub async fn spawn_source_database() -> SourceDatabase {
    let config = local_pg_connection_config();

    let options: PgConnectOptions = config.without_db();
    let mut connection = PgConnection::connect_with(&options)
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}""#, config.name))
        .await
        .expect("Failed to create test database");

    let options: PgConnectOptions = config.with_db();
    let pool = PgPool::connect_with(options)
        .await
        .expect("Failed to connect to test database");
    pool.execute(CONTENT_SCHEMA)
        .await
        .expect("Failed to create content schema");

    SourceDatabase { config, pool }
}
