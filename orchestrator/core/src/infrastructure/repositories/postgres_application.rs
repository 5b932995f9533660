// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Application
//!
//! PostgreSQL persistence for applications, linked GitHub accounts, source
//! repositories and machines.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the provisioning-side repository traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::application::{Application, ApplicationId, GitHubAccountId, UserId};
use crate::domain::machine::{Machine, MachineId, MachineState};
use crate::domain::repository::{
    ApplicationRepository, GitHubAccountRepository, MachineRepository, RepositoryError,
    SourceRepoRepository,
};
use crate::domain::source_repo::{
    GitHubAccount, GitHubCredentials, RepositoryAccess, SourceRepo, SourceRepoId,
};

pub struct PostgresApplicationRepository {
    pool: PgPool,
}

impl PostgresApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO applications (id, name, owner_id, github_account_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(application.id.0)
        .bind(&application.name)
        .bind(application.owner.as_ref().map(|o| o.0.clone()))
        .bind(application.github_account.as_ref().map(|a| a.0.clone()))
        .bind(application.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert application: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("Application {}", application.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, owner_id, github_account_id, created_at
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| parse_application_row(&r)))
    }

    async fn list_all(&self) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, owner_id, github_account_id, created_at
            FROM applications
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(parse_application_row).collect())
    }

    async fn delete(&self, id: ApplicationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Application {} not found", id)));
        }
        Ok(())
    }
}

fn parse_application_row(row: &PgRow) -> Application {
    let owner: Option<String> = row.get("owner_id");
    let account: Option<String> = row.get("github_account_id");
    Application {
        id: ApplicationId(row.get("id")),
        name: row.get("name"),
        owner: owner.map(UserId),
        github_account: account.map(GitHubAccountId),
        created_at: row.get("created_at"),
    }
}

pub struct PostgresGitHubAccountRepository {
    pool: PgPool,
}

impl PostgresGitHubAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GitHubAccountRepository for PostgresGitHubAccountRepository {
    async fn save(&self, account: &GitHubAccount) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO github_accounts (id, username, access_token, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                access_token = EXCLUDED.access_token,
                updated_at = NOW()
            "#,
        )
        .bind(&account.id.0)
        .bind(&account.credentials.username)
        .bind(&account.credentials.token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &GitHubAccountId) -> Result<Option<GitHubAccount>, RepositoryError> {
        let row = sqlx::query("SELECT id, username, access_token FROM github_accounts WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| GitHubAccount {
            id: GitHubAccountId(r.get("id")),
            credentials: GitHubCredentials {
                username: r.get("username"),
                token: r.get("access_token"),
            },
        }))
    }
}

pub struct PostgresSourceRepoRepository {
    pool: PgPool,
}

impl PostgresSourceRepoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SOURCE_REPO_COLUMNS: &str =
    "r.id, r.application_id, r.owner, r.name, r.clone_url, r.html_url, r.github_account_id, r.is_default, r.created_at";

#[async_trait]
impl SourceRepoRepository for PostgresSourceRepoRepository {
    async fn insert(&self, repository: &SourceRepo) -> Result<(), RepositoryError> {
        // The unique constraint on application_id makes the existence check
        // and insert a single statement.
        let result = sqlx::query(
            r#"
            INSERT INTO source_repositories (
                id, application_id, owner, name, clone_url, html_url,
                github_account_id, is_default, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(repository.id.0)
        .bind(repository.application_id.0)
        .bind(&repository.owner)
        .bind(&repository.name)
        .bind(&repository.clone_url)
        .bind(&repository.html_url)
        .bind(repository.github_account.as_ref().map(|a| a.0.clone()))
        .bind(repository.is_default)
        .bind(repository.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Source repository for application {}",
                repository.application_id
            )));
        }
        Ok(())
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<SourceRepo>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM source_repositories r WHERE r.application_id = $1",
            SOURCE_REPO_COLUMNS
        ))
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| parse_source_repo_row(&r)))
    }

    async fn find_access(
        &self,
        application_id: ApplicationId,
        fallback: Option<&GitHubCredentials>,
    ) -> Result<Option<RepositoryAccess>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}, a.username AS account_username, a.access_token AS account_token
            FROM source_repositories r
            LEFT JOIN github_accounts a ON a.id = r.github_account_id
            WHERE r.application_id = $1
            "#,
            SOURCE_REPO_COLUMNS
        ))
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let repository = parse_source_repo_row(&row);
        let username: Option<String> = row.get("account_username");
        let token: Option<String> = row.get("account_token");

        let credentials = match (&repository.github_account, username, token) {
            (Some(_), Some(username), Some(token)) => GitHubCredentials { username, token },
            (Some(account), _, _) => {
                return Err(RepositoryError::NotFound(format!("GitHub account {}", account)));
            }
            (None, _, _) => fallback.cloned().ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "No credentials for repository {}",
                    repository.full_name()
                ))
            })?,
        };

        Ok(Some(RepositoryAccess { repository, credentials }))
    }

    async fn delete(&self, id: SourceRepoId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM source_repositories WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Source repository {} not found", id)));
        }
        Ok(())
    }
}

fn parse_source_repo_row(row: &PgRow) -> SourceRepo {
    let account: Option<String> = row.get("github_account_id");
    SourceRepo {
        id: SourceRepoId(row.get("id")),
        application_id: ApplicationId(row.get("application_id")),
        owner: row.get("owner"),
        name: row.get("name"),
        clone_url: row.get("clone_url"),
        html_url: row.get("html_url"),
        github_account: account.map(GitHubAccountId),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
    }
}

pub struct PostgresMachineRepository {
    pool: PgPool,
}

impl PostgresMachineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MachineRepository for PostgresMachineRepository {
    async fn insert(&self, machine: &Machine) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO machines (
                id, application_id, instance_name, zone, state, ip_address,
                domain, backend_url, backend_project_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(machine.id.0)
        .bind(machine.application_id.0)
        .bind(&machine.instance_name)
        .bind(&machine.zone)
        .bind(machine.state.as_str())
        .bind(&machine.ip_address)
        .bind(&machine.domain)
        .bind(&machine.backend_url)
        .bind(&machine.backend_project_id)
        .bind(machine.created_at)
        .bind(machine.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Machine for application {}",
                machine.application_id
            )));
        }
        Ok(())
    }

    async fn save(&self, machine: &Machine) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE machines SET
                state = $2,
                ip_address = $3,
                domain = $4,
                backend_url = $5,
                backend_project_id = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(machine.id.0)
        .bind(machine.state.as_str())
        .bind(&machine.ip_address)
        .bind(&machine.domain)
        .bind(&machine.backend_url)
        .bind(&machine.backend_project_id)
        .bind(machine.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Machine {} not found", machine.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: MachineId) -> Result<Option<Machine>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, instance_name, zone, state, ip_address,
                   domain, backend_url, backend_project_id, created_at, updated_at
            FROM machines
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| parse_machine_row(&r)).transpose()
    }

    async fn find_by_application(&self, application_id: ApplicationId) -> Result<Option<Machine>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, instance_name, zone, state, ip_address,
                   domain, backend_url, backend_project_id, created_at, updated_at
            FROM machines
            WHERE application_id = $1
            "#,
        )
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| parse_machine_row(&r)).transpose()
    }

    async fn delete(&self, id: MachineId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Machine {} not found", id)));
        }
        Ok(())
    }
}

fn parse_machine_row(row: &PgRow) -> Result<Machine, RepositoryError> {
    let state_text: String = row.get("state");
    let state = MachineState::parse(&state_text)
        .ok_or_else(|| RepositoryError::Serialization(format!("Unknown machine state: {}", state_text)))?;
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    Ok(Machine {
        id: MachineId(row.get("id")),
        application_id: ApplicationId(row.get("application_id")),
        instance_name: row.get("instance_name"),
        zone: row.get("zone"),
        state,
        ip_address: row.get("ip_address"),
        domain: row.get("domain"),
        backend_url: row.get("backend_url"),
        backend_project_id: row.get("backend_project_id"),
        created_at,
        updated_at,
    })
}
