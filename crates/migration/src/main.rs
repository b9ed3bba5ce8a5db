use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

/// Used when neither `DATABASE_URL` nor `config.yaml` names a database.
const DEFAULT_DATABASE_URL: &str = "sqlite://stybase.db?mode=rwc";

#[tokio::main]
async fn main() {
    if env::var("DATABASE_URL").is_err() {
        let url = Config::builder()
            .add_source(config::File::with_name("config.yaml").required(false))
            .build()
            .ok()
            .and_then(|settings| settings.get_string("database_url").ok())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        env::set_var("DATABASE_URL", url);
    }
    cli::run_cli(migration::Migrator).await;
}
