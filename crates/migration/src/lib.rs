pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_marketplace_tables;
pub mod m20240301_000002_enable_row_level_security;
mod m20240301_000003_seed_reference_categories;

// RLS ポリシー用のユーティリティ
pub mod rls;
pub mod seed;

pub use rls::{disable_rls_sql, enable_rls_sql, RlsCommand, RlsPolicy, RlsRole};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_marketplace_tables::Migration),
            Box::new(m20240301_000002_enable_row_level_security::Migration),
            Box::new(m20240301_000003_seed_reference_categories::Migration),
        ]
    }
}
