use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

/// Service name used in the signing scope.
pub const SERVICE: &str = "glacier";

/// Protocol version sent with every request.
pub const GLACIER_VERSION: &str = "2012-06-01";

// Headers used by the service.
pub const X_AMZ_GLACIER_VERSION: &str = "x-amz-glacier-version";
pub const X_AMZ_SHA256_TREE_HASH: &str = "x-amz-sha256-tree-hash";
pub const X_AMZ_CONTENT_SHA_256: &str = "x-amz-content-sha256";
pub const X_AMZ_ARCHIVE_DESCRIPTION: &str = "x-amz-archive-description";
pub const X_AMZ_ARCHIVE_SIZE: &str = "x-amz-archive-size";
pub const X_AMZ_ARCHIVE_ID: &str = "x-amz-archive-id";
pub const X_AMZ_PART_SIZE: &str = "x-amz-part-size";
pub const X_AMZ_MULTIPART_UPLOAD_ID: &str = "x-amz-multipart-upload-id";
pub const X_AMZ_JOB_ID: &str = "x-amz-job-id";

// Env values used for credential discovery.
pub const AWS_SECRET_KEY: &str = "AWS_SECRET_KEY";
pub const AWS_ACCESS_KEY: &str = "AWS_ACCESS_KEY";

/// AsciiSet covering every byte outside the RFC 3986 unreserved set:
/// 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
///
/// Path segments and query components are encoded against this set
/// exactly once; this service does not double-encode.
pub static URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
