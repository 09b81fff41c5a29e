//! Asynchronous retrieval and inventory jobs.
//!
//! Retrieving an archive or a vault inventory is a two-step process:
//! initiate a job, then download its output once the service has
//! completed it (typically hours later). Completion can be watched by
//! polling [`describe_job`](Connection::describe_job) or through the
//! vault's notification topic.

use std::io::Read;

use serde::Deserialize;
use serde::Serialize;

use crate::connection::{check_limit, read_json, required_header, Connection, Parameters};
use crate::constants::{X_AMZ_JOB_ID, X_AMZ_SHA256_TREE_HASH};
use crate::error::{Error, ErrorKind, Result};
use crate::payload::Payload;
use crate::time::{parse_rfc3339, DateTime};

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JobRequest<'a> {
    #[serde(rename = "Type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    archive_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    format: &'a str,
    #[serde(rename = "SNSTopic", skip_serializing_if = "str::is_empty")]
    sns_topic: &'a str,
}

/// Description of a retrieval or inventory job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job kind: `ArchiveRetrieval` or `InventoryRetrieval`.
    pub action: String,
    /// Archive being retrieved; absent for inventory jobs.
    pub archive_id: Option<String>,
    /// Size of the archive being retrieved; absent for inventory jobs.
    pub archive_size_in_bytes: Option<u64>,
    /// Whether the job has finished.
    pub completed: bool,
    /// When the job finished, if it has.
    pub completion_date: Option<DateTime>,
    /// When the job was initiated.
    pub creation_date: DateTime,
    /// Size of the inventory output; absent for archive jobs.
    pub inventory_size_in_bytes: Option<u64>,
    /// Description the job was initiated with.
    pub job_description: Option<String>,
    /// The job id.
    pub job_id: String,
    /// Tree hash of the archive being retrieved; absent for inventory
    /// jobs.
    pub sha256_tree_hash: Option<String>,
    /// Topic notified on completion, if one was supplied.
    pub sns_topic: Option<String>,
    /// Job status: `InProgress`, `Succeeded`, or `Failed`.
    pub status_code: String,
    /// Human readable status, when the service supplies one.
    pub status_message: Option<String>,
    /// Amazon Resource Name of the vault.
    pub vault_arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobWire {
    action: String,
    #[serde(default)]
    archive_id: Option<String>,
    #[serde(default)]
    archive_size_in_bytes: Option<u64>,
    completed: bool,
    #[serde(default)]
    completion_date: Option<String>,
    creation_date: String,
    #[serde(default)]
    inventory_size_in_bytes: Option<u64>,
    #[serde(default)]
    job_description: Option<String>,
    job_id: String,
    #[serde(default, rename = "SHA256TreeHash")]
    sha256_tree_hash: Option<String>,
    #[serde(default, rename = "SNSTopic")]
    sns_topic: Option<String>,
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(rename = "VaultARN")]
    vault_arn: String,
}

impl JobWire {
    fn into_job(self) -> Result<Job> {
        let completion_date = match &self.completion_date {
            Some(date) => Some(parse_rfc3339(date)?),
            None => None,
        };
        Ok(Job {
            action: self.action,
            archive_id: self.archive_id,
            archive_size_in_bytes: self.archive_size_in_bytes,
            completed: self.completed,
            completion_date,
            creation_date: parse_rfc3339(&self.creation_date)?,
            inventory_size_in_bytes: self.inventory_size_in_bytes,
            job_description: self.job_description,
            job_id: self.job_id,
            sha256_tree_hash: self.sha256_tree_hash,
            sns_topic: self.sns_topic,
            status_code: self.status_code,
            status_message: self.status_message,
            vault_arn: self.vault_arn,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobListWire {
    #[serde(default)]
    marker: Option<String>,
    job_list: Vec<JobWire>,
}

/// One archive of a vault inventory.
#[derive(Debug, Clone)]
pub struct InventoryArchive {
    /// The archive id.
    pub archive_id: String,
    /// Description the archive was uploaded with.
    pub archive_description: String,
    /// When the archive was uploaded.
    pub creation_date: DateTime,
    /// Archive size in bytes.
    pub size: u64,
    /// Hex tree hash of the archive.
    pub sha256_tree_hash: String,
}

/// A point-in-time snapshot of a vault's contents. The service updates
/// it roughly once a day, so it may trail uploads and deletes.
#[derive(Debug, Clone)]
pub struct Inventory {
    /// Amazon Resource Name of the vault.
    pub vault_arn: String,
    /// When the snapshot was taken.
    pub inventory_date: DateTime,
    /// The archives in the vault at snapshot time.
    pub archive_list: Vec<InventoryArchive>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InventoryWire {
    #[serde(rename = "VaultARN")]
    vault_arn: String,
    inventory_date: String,
    archive_list: Vec<InventoryArchiveWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InventoryArchiveWire {
    archive_id: String,
    #[serde(default)]
    archive_description: Option<String>,
    creation_date: String,
    size: u64,
    #[serde(rename = "SHA256TreeHash")]
    sha256_tree_hash: String,
}

impl Connection {
    /// Initiate an archive retrieval job and return the job id. If a
    /// topic is supplied the service notifies it on completion, in
    /// addition to the vault's own notification configuration.
    pub fn initiate_retrieval_job(
        &self,
        vault: &str,
        archive: &str,
        topic: &str,
        description: &str,
    ) -> Result<String> {
        self.initiate_job(
            vault,
            &JobRequest {
                kind: "archive-retrieval",
                archive_id: archive,
                description,
                format: "",
                sns_topic: topic,
            },
        )
    }

    /// Initiate a vault inventory job and return the job id. `format`
    /// selects the output encoding, `CSV` or `JSON`; leave it empty for
    /// the service default (JSON).
    pub fn initiate_inventory_job(
        &self,
        vault: &str,
        topic: &str,
        description: &str,
        format: &str,
    ) -> Result<String> {
        self.initiate_job(
            vault,
            &JobRequest {
                kind: "inventory-retrieval",
                archive_id: "",
                description,
                format,
                sns_topic: topic,
            },
        )
    }

    fn initiate_job(&self, vault: &str, job: &JobRequest) -> Result<String> {
        let body = serde_json::to_vec(job).map_err(|e| {
            Error::new(ErrorKind::Encoding, "encoding job request failed")
                .with_operation("jobs::initiate_job")
                .set_source(e)
        })?;

        let url = format!("{}/jobs", self.vault_url(vault));
        let mut req = self.request("POST", &url)?;
        self.sign(&mut req, Payload::InMemory(body))?;
        let response = self.execute(req, &[202])?;

        required_header(&response, X_AMZ_JOB_ID)
    }

    /// Describe a single job.
    pub fn describe_job(&self, vault: &str, job_id: &str) -> Result<Job> {
        let url = format!("{}/jobs/{}", self.vault_url(vault), job_id);
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let wire: JobWire = read_json(response)?;
        wire.into_job()
    }

    /// List jobs for the vault, optionally filtered by completion state
    /// and status code (`InProgress`, `Succeeded`, or `Failed`).
    pub fn list_jobs(
        &self,
        vault: &str,
        completed: Option<bool>,
        status_code: Option<&str>,
        limit: Option<u32>,
        marker: Option<&str>,
    ) -> Result<(Vec<Job>, Option<String>)> {
        let mut params = Parameters::default();
        if let Some(completed) = completed {
            params.add("completed", if completed { "true" } else { "false" });
        }
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.add("limit", &limit.to_string());
        }
        if let Some(marker) = marker {
            params.add("marker", marker);
        }
        if let Some(status_code) = status_code {
            params.add("statuscode", status_code);
        }

        let url = format!("{}/jobs{}", self.vault_url(vault), params.encode());
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let list: JobListWire = read_json(response)?;
        let jobs = list
            .job_list
            .into_iter()
            .map(JobWire::into_job)
            .collect::<Result<Vec<_>>>()?;
        Ok((jobs, list.marker))
    }

    /// Download the output of a completed archive retrieval job.
    ///
    /// Returns the response body and, when present, the tree hash the
    /// service computed for the returned range. The body must be read
    /// and dropped by the caller. The hash header is only sent for
    /// aligned ranges: the whole archive, or a range whose start is a
    /// MiB multiple and whose end is one byte short of a MiB multiple or
    /// the end of the archive. Callers are expected to recompute the
    /// hash over the bytes read, with [`TreeHash`](crate::treehash::TreeHash),
    /// and compare via [`verify_tree_hash`](crate::treehash::verify_tree_hash).
    pub fn get_retrieval_job(
        &self,
        vault: &str,
        job_id: &str,
        range: Option<(u64, u64)>,
    ) -> Result<(Box<dyn Read + Send>, Option<String>)> {
        let url = format!("{}/jobs/{}/output", self.vault_url(vault), job_id);
        let mut req = self.request("GET", &url)?;
        if let Some((start, end)) = range {
            req.headers_mut().insert(
                http::header::RANGE,
                crate::connection::header_value(&format!("bytes={start}-{end}"))?,
            );
        }

        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200, 206])?;

        let tree_hash = response.header(X_AMZ_SHA256_TREE_HASH).map(str::to_string);
        Ok((Box::new(response.into_reader()), tree_hash))
    }

    /// Download and decode the output of a completed inventory job.
    ///
    /// Only JSON inventories decode here; a job initiated with the `CSV`
    /// format is fetched raw via
    /// [`get_retrieval_job`](Connection::get_retrieval_job).
    pub fn get_inventory_job(&self, vault: &str, job_id: &str) -> Result<Inventory> {
        let url = format!("{}/jobs/{}/output", self.vault_url(vault), job_id);
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let wire: InventoryWire = read_json(response)?;
        let mut archive_list = Vec::with_capacity(wire.archive_list.len());
        for archive in wire.archive_list {
            archive_list.push(InventoryArchive {
                archive_id: archive.archive_id,
                archive_description: archive.archive_description.unwrap_or_default(),
                creation_date: parse_rfc3339(&archive.creation_date)?,
                size: archive.size,
                sha256_tree_hash: archive.sha256_tree_hash,
            });
        }
        Ok(Inventory {
            vault_arn: wire.vault_arn,
            inventory_date: parse_rfc3339(&wire.inventory_date)?,
            archive_list,
        })
    }
}
