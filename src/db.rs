use std::sync::Arc;

use log::info;
use mongodb::{options::ClientOptions, Client, Database};

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::store::{MongoTaskStore, MongoUserStore};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> StoreResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        info!("Connected to MongoDB database {}", db_name);
        Ok(MongoDB { client, db })
    }

    /// Opens both stores over this database and makes sure their indexes exist.
    pub async fn stores(&self, clock: Arc<dyn Clock>) -> StoreResult<(MongoTaskStore, MongoUserStore)> {
        let tasks = MongoTaskStore::new(&self.db, clock.clone());
        let users = MongoUserStore::new(&self.db, clock);
        tasks.ensure_indexes().await?;
        users.ensure_indexes().await?;
        Ok((tasks, users))
    }
}
