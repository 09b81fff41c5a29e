//! Client library for cold-storage archival services speaking the
//! Glacier wire protocol.
//!
//! A [`Connection`] exposes the vault, archive, multipart, job, policy
//! and notification verbs. Every call signs its request with the
//! AWS Signature Version 4 scheme and runs blocking until the HTTP
//! exchange completes; there are no background tasks and no retries.
//! Uploads carry a [tree hash](treehash::TreeHash) over 1 MiB leaves
//! alongside the flat SHA-256 so the service can verify them, and so
//! callers can verify aligned downloads.
//!
//! # Example
//!
//! ```no_run
//! use coldvault::{keys_from_env, region, Connection};
//!
//! fn main() -> coldvault::Result<()> {
//!     // Reads AWS_SECRET_KEY and AWS_ACCESS_KEY.
//!     let (secret, access) = keys_from_env();
//!     let connection = Connection::new(&secret, &access, &region::US_EAST_1);
//!
//!     let (vaults, _marker) = connection.list_vaults(None, None)?;
//!     for vault in vaults {
//!         println!("{}: {} bytes", vault.vault_name, vault.size_in_bytes);
//!     }
//!
//!     let archive = std::fs::File::open("backup.tar")?;
//!     let id = connection.upload_archive("backups", "nightly backup", archive)?;
//!     println!("stored archive {id}");
//!     Ok(())
//! }
//! ```
//!
//! # Notes
//!
//! - Retrieval output
//!   ([`get_retrieval_job`](Connection::get_retrieval_job)) hands the
//!   response body to the caller, who must read and drop it, and who
//!   verifies the tree hash when the requested range is aligned.
//! - Cancellation and timeouts belong to the transport; configure them
//!   on the [`ureq::Agent`] passed to
//!   [`with_agent`](Connection::with_agent).

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod credential;
pub mod region;
pub mod treehash;

mod archive;
mod connection;
mod constants;
mod error;
mod hash;
mod jobs;
mod multipart;
mod payload;
mod policy;
mod sign;
mod time;
mod vault;

pub use connection::Connection;
pub use credential::{keys_from_env, keys_from_file, Credential, RefreshKeys};
pub use error::{Error, ErrorKind, Result, ServiceError};
pub use jobs::{Inventory, InventoryArchive, Job};
pub use multipart::{MultipartUpload, MultipartUploadInfo, Part, PartList};
pub use payload::{Body, Payload, ReadSeek};
pub use policy::{DataRetrievalPolicy, DataRetrievalStrategy};
pub use region::Region;
pub use sign::Signer;
pub use treehash::{verify_tree_hash, MultiTreeHash, TreeHash};
pub use vault::{Vault, VaultNotifications};

/// UTC timestamp used across the crate's public types.
pub use crate::time::DateTime;
