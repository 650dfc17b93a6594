// database/connection.rs
use mongodb::{Client, Database};
use tracing::{info, warn};

use crate::errors::Result;

pub async fn get_db_client(database_url: &str, db_name: &str) -> Result<Database> {
    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(db_name);

    // Verify the database is reachable by listing collections
    match db.list_collection_names().await {
        Ok(collections) => {
            info!("✅ Connected to database: {}", db_name);
            info!("📂 Collections found: {:?}", collections);
        }
        Err(e) => {
            warn!(
                "⚠️ Database '{}' may not exist or is inaccessible: {}",
                db_name, e
            );
        }
    }

    Ok(db)
}
