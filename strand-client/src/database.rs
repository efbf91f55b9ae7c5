/// Database management operations
use crate::error::{ClientError, Result};
use strand_proto::{self as proto, strand_client::StrandClient};
use tonic::transport::Channel;
use tracing::info;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ClientError::InvalidArgument(
            "database name is empty".to_string(),
        ));
    }
    Ok(())
}

/// Create, delete and list databases on the server.
///
/// # Example
/// ```no_run
/// # use strand_client::Client;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect("http://localhost:1729").await?;
/// let databases = client.databases();
///
/// if !databases.contains("social").await? {
///     databases.create("social").await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    rpc: StrandClient<Channel>,
}

impl DatabaseManager {
    pub(crate) fn new(rpc: StrandClient<Channel>) -> Self {
        Self { rpc }
    }

    /// Check whether a database exists
    pub async fn contains(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let response = self
            .rpc
            .clone()
            .database_contains(proto::DatabaseContainsReq {
                name: name.to_string(),
            })
            .await?
            .into_inner();
        Ok(response.contains)
    }

    /// Create a database
    ///
    /// # Errors
    /// `AlreadyExists` if the name is taken
    pub async fn create(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.rpc
            .clone()
            .database_create(proto::DatabaseCreateReq {
                name: name.to_string(),
            })
            .await?;
        info!(database = %name, "Database created");
        Ok(())
    }

    /// Delete a database and everything in it
    ///
    /// # Errors
    /// `NotFound` if there is no such database
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.rpc
            .clone()
            .database_delete(proto::DatabaseDeleteReq {
                name: name.to_string(),
            })
            .await?;
        info!(database = %name, "Database deleted");
        Ok(())
    }

    /// Names of all databases
    pub async fn all(&self) -> Result<Vec<String>> {
        let response = self
            .rpc
            .clone()
            .database_all(proto::DatabaseAllReq {})
            .await?
            .into_inner();
        Ok(response.names)
    }
}
