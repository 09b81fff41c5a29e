//! Vault management.

use serde::Deserialize;
use serde::Serialize;

use crate::connection::{check_limit, read_json, Connection, Parameters};
use crate::error::{Error, ErrorKind, Result};
use crate::payload::Payload;
use crate::time::{parse_rfc3339, DateTime};

/// Description of a vault as returned by the service.
#[derive(Debug, Clone)]
pub struct Vault {
    /// When the vault was created.
    pub creation_date: DateTime,
    /// When the service last generated an inventory, if it ever has.
    pub last_inventory_date: Option<DateTime>,
    /// Number of archives stored.
    pub number_of_archives: u64,
    /// Total size of all archives in bytes.
    pub size_in_bytes: u64,
    /// Amazon Resource Name of the vault.
    pub vault_arn: String,
    /// Name of the vault.
    pub vault_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VaultWire {
    creation_date: String,
    #[serde(default)]
    last_inventory_date: Option<String>,
    number_of_archives: u64,
    size_in_bytes: u64,
    #[serde(rename = "VaultARN")]
    vault_arn: String,
    vault_name: String,
}

impl VaultWire {
    fn into_vault(self) -> Result<Vault> {
        let last_inventory_date = match &self.last_inventory_date {
            Some(date) => Some(parse_rfc3339(date)?),
            None => None,
        };
        Ok(Vault {
            creation_date: parse_rfc3339(&self.creation_date)?,
            last_inventory_date,
            number_of_archives: self.number_of_archives,
            size_in_bytes: self.size_in_bytes,
            vault_arn: self.vault_arn,
            vault_name: self.vault_name,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VaultListWire {
    #[serde(default)]
    marker: Option<String>,
    vault_list: Vec<VaultWire>,
}

/// Vault notification configuration: the topic notified and the event
/// names that trigger a notification, e.g. `ArchiveRetrievalCompleted`
/// and `InventoryRetrievalCompleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultNotifications {
    /// Topic the service publishes notifications to.
    #[serde(rename = "SNSTopic")]
    pub sns_topic: String,
    /// Events that trigger a notification.
    #[serde(rename = "Events")]
    pub events: Vec<String>,
}

impl Connection {
    /// List vaults, sorted by name. At most `limit` (1 to 1000, service
    /// default 1000) vaults are returned; when more remain the returned
    /// marker resumes the listing.
    pub fn list_vaults(
        &self,
        limit: Option<u32>,
        marker: Option<&str>,
    ) -> Result<(Vec<Vault>, Option<String>)> {
        let mut params = Parameters::default();
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.add("limit", &limit.to_string());
        }
        if let Some(marker) = marker {
            params.add("marker", marker);
        }

        let url = format!(
            "https://{}/-/vaults{}",
            self.region().endpoint,
            params.encode()
        );
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let list: VaultListWire = read_json(response)?;
        let vaults = list
            .vault_list
            .into_iter()
            .map(VaultWire::into_vault)
            .collect::<Result<Vec<_>>>()?;
        Ok((vaults, list.marker))
    }

    /// Create a vault. Vault names are 1 to 255 characters from the set
    /// `a-z A-Z 0-9 _ - .`; creation is idempotent.
    pub fn create_vault(&self, vault: &str) -> Result<()> {
        let mut req = self.request("PUT", &self.vault_url(vault))?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        self.execute(req, &[201])?;
        Ok(())
    }

    /// Delete a vault. The service only deletes empty vaults.
    pub fn delete_vault(&self, vault: &str) -> Result<()> {
        let mut req = self.request("DELETE", &self.vault_url(vault))?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        self.execute(req, &[204])?;
        Ok(())
    }

    /// Describe a vault.
    pub fn describe_vault(&self, vault: &str) -> Result<Vault> {
        let mut req = self.request("GET", &self.vault_url(vault))?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let wire: VaultWire = read_json(response)?;
        wire.into_vault()
    }

    /// Get the vault's notification configuration.
    pub fn get_vault_notifications(&self, vault: &str) -> Result<VaultNotifications> {
        let url = format!("{}/notification-configuration", self.vault_url(vault));
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        read_json(response)
    }

    /// Set the vault's notification configuration.
    pub fn set_vault_notifications(
        &self,
        vault: &str,
        notifications: &VaultNotifications,
    ) -> Result<()> {
        let body = serde_json::to_vec(notifications).map_err(|e| {
            Error::new(ErrorKind::Encoding, "encoding notification configuration failed")
                .with_operation("vault::set_vault_notifications")
                .set_source(e)
        })?;

        let url = format!("{}/notification-configuration", self.vault_url(vault));
        let mut req = self.request("PUT", &url)?;
        self.sign(&mut req, Payload::InMemory(body))?;
        self.execute(req, &[204])?;
        Ok(())
    }

    /// Delete the vault's notification configuration.
    pub fn delete_vault_notifications(&self, vault: &str) -> Result<()> {
        let url = format!("{}/notification-configuration", self.vault_url(vault));
        let mut req = self.request("DELETE", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        self.execute(req, &[204])?;
        Ok(())
    }
}
