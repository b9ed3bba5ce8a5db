pub use sea_orm_migration::prelude::*;

mod m20251018_100000_create_accounts_and_apps;
mod m20251018_110000_create_oauth_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251018_100000_create_accounts_and_apps::Migration),
            Box::new(m20251018_110000_create_oauth_tables::Migration),
        ]
    }
}
