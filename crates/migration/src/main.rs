use sea_orm_migration::prelude::*;

use gigboard_migration::Migrator;

#[tokio::main]
async fn main() {
    // .env が無くても続行する
    dotenvy::dotenv().ok();

    cli::run_cli(Migrator).await;
}
