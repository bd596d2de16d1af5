use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, Statement};

use crate::seed::REFERENCE_CATEGORIES;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let backend = manager.get_database_backend();

        for (category, subcategories) in REFERENCE_CATEGORIES {
            db.execute(Statement::from_sql_and_values(
                backend,
                "INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
                [(*category).into()],
            ))
            .await?;

            for subcategory in *subcategories {
                db.execute(Statement::from_sql_and_values(
                    backend,
                    "INSERT INTO subcategories (name, category_id) \
                     SELECT $1, id FROM categories WHERE name = $2 \
                     ON CONFLICT (name, category_id) DO NOTHING",
                    [(*subcategory).into(), (*category).into()],
                ))
                .await?;
            }
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let backend = manager.get_database_backend();

        // subcategories は ON DELETE CASCADE で消える
        for (category, _) in REFERENCE_CATEGORIES {
            db.execute(Statement::from_sql_and_values(
                backend,
                "DELETE FROM categories WHERE name = $1",
                [(*category).into()],
            ))
            .await?;
        }

        Ok(())
    }
}
