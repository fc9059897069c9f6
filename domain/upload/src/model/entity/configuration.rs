use std::{collections::HashMap, path::PathBuf};

use typed_builder::TypedBuilder;

use crate::{
    exception::{UploadException, UploadResult},
    model::vo::{ByteStream, UploadSource, UploadTarget},
};

/// Smallest part the multipart protocol accepts, except for the last one.
pub const MIN_PART_SIZE_FLOOR: u64 = 5 * 1024 * 1024;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_PART_RETRIES: u32 = 2;

/// Header sent on create unless the caller overrides it.
pub const DEFAULT_ACL: (&str, &str) = ("ACL", "private");

/// Options of one upload, validated into an [`UploadConfiguration`].
#[derive(TypedBuilder)]
pub struct UploadOptions {
    #[builder(default, setter(into))]
    pub bucket: String,
    #[builder(default, setter(into))]
    pub key: String,
    #[builder(default, setter(strip_option))]
    pub stream: Option<ByteStream>,
    #[builder(default, setter(strip_option, into))]
    pub file: Option<PathBuf>,
    #[builder(default)]
    pub headers: HashMap<String, String>,
    #[builder(default = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
    #[builder(default = true)]
    pub no_disk: bool,
    #[builder(default = DEFAULT_MAX_PART_RETRIES)]
    pub max_part_retries: u32,
    /// Retries allowed across all parts, unlimited when unset.
    ///
    /// A cap makes a long upload over a flaky link fail once that many
    /// transient errors add up, even if every part would get through on its
    /// own retries.
    #[builder(default, setter(strip_option))]
    pub max_total_retries: Option<u32>,
    #[builder(default = MIN_PART_SIZE_FLOOR)]
    pub min_part_size: u64,
    #[builder(default, setter(strip_option))]
    pub max_part_size: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub max_total_size: Option<u64>,
}

/// Validated, immutable upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfiguration {
    pub target: UploadTarget,
    pub headers: HashMap<String, String>,
    pub concurrency: usize,
    /// Disk buffering hint, parts are always held in memory.
    pub no_disk: bool,
    pub max_part_retries: u32,
    /// Retries allowed across all parts of the upload, unlimited when `None`.
    pub max_total_retries: Option<u32>,
    pub min_part_size: u64,
    pub max_part_size: Option<u64>,
    pub max_total_size: Option<u64>,
}

impl UploadOptions {
    /// Validate the options and split off the input source.
    pub fn validate(self) -> UploadResult<(UploadConfiguration, UploadSource)> {
        if self.key.is_empty() {
            return Err(UploadException::MissingObjectKey);
        }
        let source = match (self.stream, self.file) {
            (Some(_), Some(_)) => return Err(UploadException::ConflictedSource),
            (Some(stream), None) => UploadSource::Stream(stream),
            (None, Some(path)) => UploadSource::File(path),
            (None, None) => return Err(UploadException::MissingSource),
        };
        if self.min_part_size < MIN_PART_SIZE_FLOOR {
            return Err(UploadException::PartSizeBelowFloor {
                min_part_size: self.min_part_size,
                floor: MIN_PART_SIZE_FLOOR,
            });
        }
        if let Some(max_part_size) = self.max_part_size {
            if max_part_size < self.min_part_size {
                return Err(UploadException::InvalidPartSizeRange {
                    min_part_size: self.min_part_size,
                    max_part_size,
                });
            }
        }
        if self.concurrency == 0 {
            return Err(UploadException::InvalidConcurrency);
        }
        Ok((
            UploadConfiguration {
                target: UploadTarget {
                    bucket: self.bucket,
                    key: self.key,
                },
                headers: self.headers,
                concurrency: self.concurrency,
                no_disk: self.no_disk,
                max_part_retries: self.max_part_retries,
                max_total_retries: self.max_total_retries,
                min_part_size: self.min_part_size,
                max_part_size: self.max_part_size,
                max_total_size: self.max_total_size,
            },
            source,
        ))
    }
}

impl UploadConfiguration {
    /// Headers for the create call: custom headers over the default ACL.
    pub fn create_headers(&self) -> HashMap<String, String> {
        let (acl, private) = DEFAULT_ACL;
        let mut headers = HashMap::from([(acl.to_string(), private.to_string())]);
        headers.extend(self.headers.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        headers
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn empty_stream() -> ByteStream {
        Box::pin(stream::empty())
    }

    #[test]
    fn defaults() {
        let (config, source) = UploadOptions::builder()
            .bucket("bucket")
            .key("key")
            .file("some/file")
            .build()
            .validate()
            .unwrap();
        assert!(matches!(source, UploadSource::File(_)));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_part_retries, 2);
        assert_eq!(config.max_total_retries, None);
        assert_eq!(config.min_part_size, 5 * 1024 * 1024);
        assert!(config.no_disk);
        assert!(config.max_part_size.is_none());
        assert!(config.max_total_size.is_none());
    }

    #[test]
    fn key_is_required() {
        let err = UploadOptions::builder().file("f").build().validate().unwrap_err();
        assert!(matches!(err, UploadException::MissingObjectKey));
        assert!(err.is_configuration());
    }

    #[test]
    fn source_is_required() {
        let err = UploadOptions::builder().key("k").build().validate().unwrap_err();
        assert!(matches!(err, UploadException::MissingSource));
    }

    #[test]
    fn stream_and_file_conflict() {
        let err = UploadOptions::builder()
            .key("k")
            .file("f")
            .stream(empty_stream())
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, UploadException::ConflictedSource));
    }

    #[test]
    fn min_part_size_floor() {
        let err = UploadOptions::builder()
            .key("k")
            .stream(empty_stream())
            .min_part_size(1024)
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, UploadException::PartSizeBelowFloor { .. }));
    }

    #[test]
    fn max_part_size_below_min() {
        let err = UploadOptions::builder()
            .key("k")
            .stream(empty_stream())
            .min_part_size(8 * 1024 * 1024)
            .max_part_size(6 * 1024 * 1024)
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, UploadException::InvalidPartSizeRange { .. }));
    }

    #[test]
    fn zero_concurrency() {
        let err = UploadOptions::builder()
            .key("k")
            .stream(empty_stream())
            .concurrency(0)
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, UploadException::InvalidConcurrency));
    }

    #[test]
    fn custom_headers_override_acl() {
        let (config, _) = UploadOptions::builder()
            .key("k")
            .stream(empty_stream())
            .headers(HashMap::from([
                ("ACL".to_string(), "public-read".to_string()),
                ("ContentType".to_string(), "text/plain".to_string()),
            ]))
            .build()
            .validate()
            .unwrap();
        let headers = config.create_headers();
        assert_eq!(headers["ACL"], "public-read");
        assert_eq!(headers["ContentType"], "text/plain");

        let (config, _) =
            UploadOptions::builder().key("k").stream(empty_stream()).build().validate().unwrap();
        assert_eq!(config.create_headers()["ACL"], "private");
    }
}
