//! Archive upload and deletion.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write as _;

use http::header;

use crate::connection::{header_value, required_header, Connection};
use crate::constants::{
    X_AMZ_ARCHIVE_DESCRIPTION, X_AMZ_CONTENT_SHA_256, X_AMZ_SHA256_TREE_HASH,
};
use crate::error::{Error, ErrorKind, Result};
use crate::payload::{Body, Payload, ReadSeek};
use crate::treehash::TreeHash;

impl Connection {
    /// Upload an archive and return its id.
    ///
    /// The archive is read twice: once to compute the tree and content
    /// hashes, once for transport. The optional description travels in
    /// the `x-amz-archive-description` header; the service stores it
    /// verbatim and returns it in inventories.
    pub fn upload_archive(
        &self,
        vault: &str,
        description: &str,
        archive: impl ReadSeek + 'static,
    ) -> Result<String> {
        let mut archive = Box::new(archive);

        let size = archive.seek(SeekFrom::End(0)).map_err(stream_err)?;
        archive.seek(SeekFrom::Start(0)).map_err(stream_err)?;
        let hasher = tree_hash_stream(&mut archive)?;
        archive.seek(SeekFrom::Start(0)).map_err(stream_err)?;

        let url = format!("{}/archives", self.vault_url(vault));
        let mut req = self.request("POST", &url)?;
        if !description.is_empty() {
            req.headers_mut()
                .insert(X_AMZ_ARCHIVE_DESCRIPTION, header_value(description)?);
        }
        req.headers_mut().insert(
            X_AMZ_SHA256_TREE_HASH,
            header_value(&hex::encode(hasher.tree_hash()))?,
        );
        req.headers_mut().insert(
            X_AMZ_CONTENT_SHA_256,
            header_value(&hex::encode(hasher.hash()))?,
        );
        req.headers_mut()
            .insert(header::CONTENT_LENGTH, header_value(&size.to_string())?);

        // The hashing pass already consumed the stream once; sign with
        // the computed digest so it is not read a third time.
        self.sign(&mut req, Payload::PreHashed(hasher.hash()))?;
        *req.body_mut() = Body::Reader(archive);

        let response = self.execute(req, &[201])?;
        let location = required_header(&response, "Location")?;
        let id = location.rsplit('/').next().unwrap_or(&location);
        Ok(id.to_string())
    }

    /// Delete an archive. Deletion is idempotent; deleting an already
    /// deleted archive succeeds.
    pub fn delete_archive(&self, vault: &str, archive: &str) -> Result<()> {
        let url = format!("{}/archives/{}", self.vault_url(vault), archive);
        let mut req = self.request("DELETE", &url)?;
        self.sign(&mut req, Payload::InMemory(Vec::new()))?;
        self.execute(req, &[204])?;
        Ok(())
    }
}

// Run the tree hasher over the whole stream from its current position.
pub(crate) fn tree_hash_stream(stream: &mut impl Read) -> Result<TreeHash> {
    let mut hasher = TreeHash::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = stream.read(&mut buf).map_err(stream_err)?;
        if n == 0 {
            break;
        }
        hasher
            .write_all(&buf[..n])
            .map_err(stream_err)?;
    }
    hasher.close();
    Ok(hasher)
}

fn stream_err(err: std::io::Error) -> Error {
    Error::new(ErrorKind::PayloadIo, "reading archive stream failed")
        .with_operation("archive::upload_archive")
        .set_source(err)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_tree_hash_stream() {
        let mut cursor = Cursor::new(vec![b'a'; 2 * crate::treehash::MIB]);
        let hasher = tree_hash_stream(&mut cursor).expect("hashing must succeed");

        assert_eq!(
            hex::encode(hasher.tree_hash()),
            "560c2c9333c719cb00cfdffee3ba293db17f58743cdd1f7e4055373ae6300afa"
        );
        assert_eq!(
            hex::encode(hasher.hash()),
            "5256ec18f11624025905d057d6befb03d77b243511ac5f77ed5e0221ce6d84b5"
        );
    }
}
