use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

use crate::rls::{disable_rls_sql, enable_rls_sql, RlsCommand, RlsPolicy};

/// Tables whose rows anyone may read.
pub const PUBLIC_TABLES: &[&str] = &["users", "categories", "subcategories", "posts"];

/// `(table, owner column)` for tables only the owner may write.
pub const OWNED_TABLES: &[(&str, &str)] = &[("users", "id"), ("services", "user_id"), ("posts", "user_id")];

const ALL_TABLES: &[&str] = &["users", "categories", "subcategories", "services", "posts"];

/// Every policy this migration installs.
pub fn marketplace_policies() -> Vec<RlsPolicy> {
    let mut policies: Vec<RlsPolicy> = PUBLIC_TABLES
        .iter()
        .map(|table| RlsPolicy::public_read(table))
        .collect();

    // services は所有者のみ閲覧可能
    policies.push(RlsPolicy::owner_only("services", "user_id", RlsCommand::Select));

    for (table, owner_column) in OWNED_TABLES {
        for command in [RlsCommand::Insert, RlsCommand::Update, RlsCommand::Delete] {
            policies.push(RlsPolicy::owner_only(table, owner_column, command));
        }
    }

    policies
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in ALL_TABLES {
            db.execute_unprepared(&enable_rls_sql(table, None)).await?;
        }
        for policy in marketplace_policies() {
            db.execute_unprepared(&policy.create_policy_sql()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for policy in marketplace_policies() {
            db.execute_unprepared(&policy.drop_policy_sql()).await?;
        }
        for table in ALL_TABLES {
            db.execute_unprepared(&disable_rls_sql(table, None)).await?;
        }

        Ok(())
    }
}
