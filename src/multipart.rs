//! Multipart uploads.

use std::io::Write as _;

use serde::Deserialize;

use crate::connection::{
    check_limit, header_value, read_json, required_header, Connection, Parameters,
};
use crate::constants::{
    X_AMZ_ARCHIVE_DESCRIPTION, X_AMZ_ARCHIVE_ID, X_AMZ_ARCHIVE_SIZE, X_AMZ_CONTENT_SHA_256,
    X_AMZ_MULTIPART_UPLOAD_ID, X_AMZ_PART_SIZE, X_AMZ_SHA256_TREE_HASH,
};
use crate::error::{Error, ErrorKind, Result};
use crate::payload::{Body, Payload};
use crate::time::{parse_rfc3339, DateTime};
use crate::treehash::{MultiTreeHash, TreeHash};

const MIN_PART_SIZE: u64 = 1 << 20;
const MAX_PART_SIZE: u64 = 4 << 30;

/// Tracker for one in-flight multipart upload: the upload id, the fixed
/// part size, and the tree-hash root of every part uploaded so far, kept
/// in range order so completion can fold them into the archive root.
pub struct MultipartUpload {
    vault: String,
    upload_id: String,
    part_size: u64,
    parts: Vec<(u64, [u8; 32])>,
}

impl MultipartUpload {
    /// The vault this upload targets.
    pub fn vault(&self) -> &str {
        &self.vault
    }

    /// The upload id assigned by the service.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// The fixed size every part except the last must have.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Combine the retained per-part roots into the archive-level tree
    /// hash, or `None` before any part was uploaded.
    pub fn tree_hash(&self) -> Option<[u8; 32]> {
        let mut combiner = MultiTreeHash::new();
        for (_, root) in &self.parts {
            combiner.add(*root);
        }
        combiner.root()
    }
}

/// Description of an in-progress multipart upload, as listed by the
/// service.
#[derive(Debug, Clone)]
pub struct MultipartUploadInfo {
    /// Description the upload was initiated with.
    pub archive_description: Option<String>,
    /// When the upload was initiated.
    pub creation_date: DateTime,
    /// The upload id.
    pub multipart_upload_id: String,
    /// The fixed part size in bytes.
    pub part_size_in_bytes: u64,
    /// Amazon Resource Name of the vault.
    pub vault_arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MultipartWire {
    #[serde(default)]
    archive_description: Option<String>,
    creation_date: String,
    multipart_upload_id: String,
    part_size_in_bytes: u64,
    #[serde(rename = "VaultARN")]
    vault_arn: String,
}

impl MultipartWire {
    fn into_info(self) -> Result<MultipartUploadInfo> {
        Ok(MultipartUploadInfo {
            archive_description: self.archive_description,
            creation_date: parse_rfc3339(&self.creation_date)?,
            multipart_upload_id: self.multipart_upload_id,
            part_size_in_bytes: self.part_size_in_bytes,
            vault_arn: self.vault_arn,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MultipartListWire {
    #[serde(default)]
    marker: Option<String>,
    uploads_list: Vec<MultipartWire>,
}

/// One uploaded part of a multipart upload.
#[derive(Debug, Clone)]
pub struct Part {
    /// First byte offset the part covers.
    pub range_start: u64,
    /// Last byte offset the part covers, inclusive.
    pub range_end: u64,
    /// Hex tree hash root of the part.
    pub sha256_tree_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PartWire {
    range_in_bytes: String,
    #[serde(rename = "SHA256TreeHash")]
    sha256_tree_hash: String,
}

impl PartWire {
    fn into_part(self) -> Result<Part> {
        let (start, end) = self
            .range_in_bytes
            .split_once('-')
            .and_then(|(start, end)| Some((start.parse().ok()?, end.parse().ok()?)))
            .ok_or_else(|| {
                Error::new(ErrorKind::Service, "part range is not of the form a-b")
                    .with_operation("multipart::list_parts")
            })?;
        Ok(Part {
            range_start: start,
            range_end: end,
            sha256_tree_hash: self.sha256_tree_hash,
        })
    }
}

/// The parts uploaded so far, as listed by the service.
#[derive(Debug, Clone)]
pub struct PartList {
    /// Description the upload was initiated with.
    pub archive_description: Option<String>,
    /// When the upload was initiated.
    pub creation_date: DateTime,
    /// The upload id.
    pub multipart_upload_id: String,
    /// The fixed part size in bytes.
    pub part_size_in_bytes: u64,
    /// The listed parts, in range order.
    pub parts: Vec<Part>,
    /// Amazon Resource Name of the vault.
    pub vault_arn: String,
    /// Marker resuming the listing when more parts remain.
    pub marker: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PartListWire {
    #[serde(default)]
    archive_description: Option<String>,
    creation_date: String,
    #[serde(default)]
    marker: Option<String>,
    multipart_upload_id: String,
    part_size_in_bytes: u64,
    parts: Vec<PartWire>,
    #[serde(rename = "VaultARN")]
    vault_arn: String,
}

// Part sizes are a power-of-two number of MiB up to 4 GiB; anything else
// breaks the equality between the combined per-part roots and the tree
// hash of the whole archive.
fn check_part_size(part_size: u64) -> Result<()> {
    if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size) || !part_size.is_power_of_two() {
        return Err(Error::new(
            ErrorKind::Config,
            "part size must be a power of two between 1 MiB and 4 GiB",
        )
        .with_operation("multipart::check_part_size"));
    }
    Ok(())
}

impl Connection {
    /// Begin a multipart upload and return its tracker. Every part
    /// except the last must be exactly `part_size` bytes.
    pub fn initiate_multipart(
        &self,
        vault: &str,
        part_size: u64,
        description: &str,
    ) -> Result<MultipartUpload> {
        check_part_size(part_size)?;

        let url = format!("{}/multipart-uploads", self.vault_url(vault));
        let mut req = self.request("POST", &url)?;
        req.headers_mut()
            .insert(X_AMZ_PART_SIZE, header_value(&part_size.to_string())?);
        if !description.is_empty() {
            req.headers_mut()
                .insert(X_AMZ_ARCHIVE_DESCRIPTION, header_value(description)?);
        }

        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[201])?;

        Ok(MultipartUpload {
            vault: vault.to_string(),
            upload_id: required_header(&response, X_AMZ_MULTIPART_UPLOAD_ID)?,
            part_size,
            parts: Vec::new(),
        })
    }

    /// Upload one part starting at `offset` and record its tree-hash
    /// root in the tracker. The offset must be a multiple of the part
    /// size; only the last part may be shorter than the part size.
    pub fn upload_part(
        &self,
        upload: &mut MultipartUpload,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        if data.is_empty() || data.len() as u64 > upload.part_size {
            return Err(Error::new(
                ErrorKind::Config,
                "part must be between 1 byte and the part size",
            )
            .with_operation("multipart::upload_part"));
        }
        if offset % upload.part_size != 0 {
            return Err(Error::new(
                ErrorKind::Config,
                "part offset must be a multiple of the part size",
            )
            .with_operation("multipart::upload_part"));
        }

        let mut hasher = TreeHash::new();
        hasher.write_all(data).map_err(|e| {
            Error::new(ErrorKind::PayloadIo, "hashing part failed")
                .with_operation("multipart::upload_part")
                .set_source(e)
        })?;
        hasher.close();

        let url = format!(
            "{}/multipart-uploads/{}",
            self.vault_url(&upload.vault),
            upload.upload_id
        );
        let mut req = self.request("PUT", &url)?;
        let end = offset + data.len() as u64 - 1;
        req.headers_mut().insert(
            http::header::CONTENT_RANGE,
            header_value(&format!("bytes {offset}-{end}/*"))?,
        );
        req.headers_mut().insert(
            X_AMZ_SHA256_TREE_HASH,
            header_value(&hex::encode(hasher.tree_hash()))?,
        );
        req.headers_mut().insert(
            X_AMZ_CONTENT_SHA_256,
            header_value(&hex::encode(hasher.hash()))?,
        );

        self.sign(&mut req, Payload::PreHashed(hasher.hash()))?;
        *req.body_mut() = Body::Bytes(data.to_vec());
        self.execute(req, &[204])?;

        let position = upload.parts.partition_point(|(start, _)| *start < offset);
        upload.parts.insert(position, (offset, hasher.tree_hash()));
        Ok(())
    }

    /// Complete the upload and return the archive id. `size` is the
    /// total archive size in bytes; the archive-level tree hash is
    /// folded from the roots recorded by [`upload_part`](Connection::upload_part).
    pub fn complete_multipart(&self, upload: &MultipartUpload, size: u64) -> Result<String> {
        let root = upload.tree_hash().ok_or_else(|| {
            Error::new(ErrorKind::Config, "multipart upload has no parts")
                .with_operation("multipart::complete_multipart")
        })?;
        self.complete_multipart_with_hash(&upload.vault, &upload.upload_id, root, size)
    }

    /// Complete an upload from its raw coordinates, for uploads whose
    /// tracker was lost; the archive-level root can be rebuilt with
    /// [`tree_hash_from_multipart_upload`](Connection::tree_hash_from_multipart_upload).
    pub fn complete_multipart_with_hash(
        &self,
        vault: &str,
        upload_id: &str,
        tree_hash: [u8; 32],
        size: u64,
    ) -> Result<String> {
        let url = format!("{}/multipart-uploads/{}", self.vault_url(vault), upload_id);
        let mut req = self.request("POST", &url)?;
        req.headers_mut().insert(
            X_AMZ_SHA256_TREE_HASH,
            header_value(&hex::encode(tree_hash))?,
        );
        req.headers_mut()
            .insert(X_AMZ_ARCHIVE_SIZE, header_value(&size.to_string())?);

        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[201])?;
        required_header(&response, X_AMZ_ARCHIVE_ID)
    }

    /// Rebuild the archive-level tree hash from the parts the service
    /// has recorded, paging through the listing.
    pub fn tree_hash_from_multipart_upload(
        &self,
        vault: &str,
        upload_id: &str,
    ) -> Result<[u8; 32]> {
        let mut combiner = MultiTreeHash::new();
        let mut marker: Option<String> = None;
        loop {
            let list = self.list_parts(vault, upload_id, None, marker.as_deref())?;
            // The service lists parts in range order.
            for part in &list.parts {
                combiner.add_hex(&part.sha256_tree_hash)?;
            }
            match list.marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        combiner.root().ok_or_else(|| {
            Error::new(ErrorKind::Service, "upload has no parts")
                .with_operation("multipart::tree_hash_from_multipart_upload")
        })
    }

    /// Abort a multipart upload, discarding all uploaded parts.
    pub fn abort_multipart(&self, vault: &str, upload_id: &str) -> Result<()> {
        let url = format!("{}/multipart-uploads/{}", self.vault_url(vault), upload_id);
        let mut req = self.request("DELETE", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        self.execute(req, &[204])?;
        Ok(())
    }

    /// List in-progress multipart uploads for the vault.
    pub fn list_multipart_uploads(
        &self,
        vault: &str,
        limit: Option<u32>,
        marker: Option<&str>,
    ) -> Result<(Vec<MultipartUploadInfo>, Option<String>)> {
        let mut params = Parameters::default();
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.add("limit", &limit.to_string());
        }
        if let Some(marker) = marker {
            params.add("marker", marker);
        }

        let url = format!("{}/multipart-uploads{}", self.vault_url(vault), params.encode());
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let list: MultipartListWire = read_json(response)?;
        let uploads = list
            .uploads_list
            .into_iter()
            .map(MultipartWire::into_info)
            .collect::<Result<Vec<_>>>()?;
        Ok((uploads, list.marker))
    }

    /// List the parts uploaded so far for a multipart upload.
    pub fn list_parts(
        &self,
        vault: &str,
        upload_id: &str,
        limit: Option<u32>,
        marker: Option<&str>,
    ) -> Result<PartList> {
        let mut params = Parameters::default();
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.add("limit", &limit.to_string());
        }
        if let Some(marker) = marker {
            params.add("marker", marker);
        }

        let url = format!(
            "{}/multipart-uploads/{}{}",
            self.vault_url(vault),
            upload_id,
            params.encode()
        );
        let mut req = self.request("GET", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        let response = self.execute(req, &[200])?;

        let wire: PartListWire = read_json(response)?;
        let parts = wire
            .parts
            .into_iter()
            .map(PartWire::into_part)
            .collect::<Result<Vec<_>>>()?;
        Ok(PartList {
            archive_description: wire.archive_description,
            creation_date: parse_rfc3339(&wire.creation_date)?,
            multipart_upload_id: wire.multipart_upload_id,
            part_size_in_bytes: wire.part_size_in_bytes,
            parts,
            vault_arn: wire.vault_arn,
            marker: wire.marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::treehash::MIB;

    #[test]
    fn test_check_part_size() {
        assert!(check_part_size(1 << 20).is_ok());
        assert!(check_part_size(8 << 20).is_ok());
        assert!(check_part_size(4 << 30).is_ok());

        for invalid in [0, 1, 1 << 19, 3 << 20, (1 << 20) + 1, 8 << 30] {
            let err = check_part_size(invalid).expect_err("must fail");
            assert_eq!(err.kind(), ErrorKind::Config, "part size {invalid}");
        }
    }

    #[test]
    fn test_tracker_combines_in_range_order() {
        let full = {
            let mut th = TreeHash::new();
            th.write_all(&vec![b'a'; 2 * MIB + MIB / 2])
                .expect("write must succeed");
            th.close();
            th
        };

        let mut upload = MultipartUpload {
            vault: "vault".to_string(),
            upload_id: "upload".to_string(),
            part_size: MIB as u64,
            parts: Vec::new(),
        };
        assert_eq!(upload.tree_hash(), None);

        // Record parts out of order; the ledger keeps them in range
        // order, so the fold still matches the streaming hash.
        let data = vec![b'a'; 2 * MIB + MIB / 2];
        let mut roots = Vec::new();
        for chunk in data.chunks(MIB) {
            let mut th = TreeHash::new();
            th.write_all(chunk).expect("write must succeed");
            th.close();
            roots.push(th.tree_hash());
        }
        for index in [2usize, 0, 1] {
            let offset = index as u64 * MIB as u64;
            let position = upload.parts.partition_point(|(start, _)| *start < offset);
            upload.parts.insert(position, (offset, roots[index]));
        }

        assert_eq!(
            upload.parts.iter().map(|(start, _)| *start).collect::<Vec<_>>(),
            vec![0, MIB as u64, 2 * MIB as u64]
        );
        assert_eq!(upload.tree_hash(), Some(full.tree_hash()));
    }

    #[test]
    fn test_parse_multipart_list() {
        let content = r#"{
            "Marker": null,
            "UploadsList": [{
                "ArchiveDescription": "backup tuesday",
                "CreationDate": "2012-03-20T17:03:43.221Z",
                "MultipartUploadId": "nPyGOnyFcx67qqX7E-0tSGiRi88hHMOwOxR-_jNyM6RjVMFg2J9GUABSLjTG8G",
                "PartSizeInBytes": 4194304,
                "VaultARN": "arn:aws:glacier:us-east-1:012345678901:vaults/examplevault"
            }]
        }"#;

        let mut list: MultipartListWire = serde_json::from_str(content).expect("must deserialize");
        let info = list
            .uploads_list
            .remove(0)
            .into_info()
            .expect("dates must parse");
        assert_eq!(info.archive_description.as_deref(), Some("backup tuesday"));
        assert_eq!(info.part_size_in_bytes, 4194304);
    }

    #[test]
    fn test_parse_part_list() {
        let content = r#"{
            "ArchiveDescription": null,
            "CreationDate": "2012-03-20T17:03:43.221Z",
            "Marker": null,
            "MultipartUploadId": "OW2fM5iVylEpFEMM9_HpKowRapC3vn5sSL39_396UW9zLFUWVrnRHaPjUJddQ5OxSHVXjYtrN47NBZ-khxOjyEXAMPLE",
            "PartSizeInBytes": 4194304,
            "Parts": [{
                "RangeInBytes": "0-4194303",
                "SHA256TreeHash": "01d34dabf7be316472c93b1ef80721f5d4"
            }],
            "VaultARN": "arn:aws:glacier:us-east-1:012345678901:vaults/demo1-vault"
        }"#;

        let mut wire: PartListWire = serde_json::from_str(content).expect("must deserialize");
        assert_eq!(wire.parts.len(), 1);
        let part = wire.parts.remove(0).into_part().expect("range must parse");
        assert_eq!(part.range_start, 0);
        assert_eq!(part.range_end, 4194303);
    }

    #[test]
    fn test_parse_part_bad_range() {
        let wire = PartWire {
            range_in_bytes: "4194303".to_string(),
            sha256_tree_hash: String::new(),
        };
        let err = wire.into_part().expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Service);
    }
}
