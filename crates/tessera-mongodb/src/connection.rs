//! MongoDB connection bootstrap with pool configuration and health checking

use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use tessera_common::{Result, TesseraError};
use tracing::info;

use crate::driver::DatabaseHandle;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 5)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(5),
            max_pool_size: Some(20),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("tessera".to_string()),
        }
    }
}

impl PoolConfig {
    fn apply(self, options: &mut ClientOptions) {
        if let Some(min) = self.min_pool_size {
            options.min_pool_size = Some(min);
        }
        if let Some(max) = self.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.max_idle_time {
            options.max_idle_time = Some(idle);
        }
        if let Some(connect) = self.connect_timeout {
            options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = self.server_selection_timeout {
            options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = self.app_name {
            options.app_name = Some(app);
        }
    }
}

/// MongoDB connection bound to the URI's default database
pub struct Connection {
    client: Client,
    database: Database,
}

impl Connection {
    /// Connect with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Connect with custom pool configuration
    ///
    /// # Errors
    /// Returns a connection error if the URI names no default database
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(connection_string).await?;
        config.apply(&mut client_options);

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        let database = client.default_database().ok_or_else(|| {
            TesseraError::Connection("No default database specified in connection string".to_string())
        })?;

        info!(database = %database.name(), "Connected to MongoDB");

        Ok(Self { client, database })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Database handle for building models
    pub fn handle(&self) -> Arc<dyn DatabaseHandle> {
        Arc::new(self.database.clone())
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<bool> {
        match self.database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(true),
            Err(e) => Err(TesseraError::Connection(format!("Ping failed: {}", e))),
        }
    }
}
