// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into all PostgreSQL repository implementations. Only used when the
//! `database` section of `devspace-config.yaml` is present.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema. Statements are idempotent.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(INITIAL_SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply database schema")?;
        tracing::info!("Database schema applied");
        Ok(())
    }
}
