//! Wire resources of the storage JSON API
//!
//! The API encodes int64 fields (`size`, `generation`) as JSON strings;
//! deserializers here accept both forms.

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};

/// One object (or virtual directory) in a listing or metadata response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub name: String,

    #[serde(
        default,
        deserialize_with = "de_opt_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Last update time, RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,

    /// Base64 MD5 digest, when the object has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,

    /// Base64 big-endian CRC32C digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,

    /// Object generation (microsecond-resolution creation stamp)
    #[serde(
        default,
        deserialize_with = "de_opt_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub generation: Option<u64>,

    /// True for name-only placeholders wrapped around listing `prefixes`
    #[serde(skip)]
    pub is_prefix: bool,
}

impl ObjectEntry {
    /// Name-only placeholder representing a virtual directory
    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            content_type: None,
            updated: None,
            md5_hash: None,
            crc32c: None,
            generation: None,
            is_prefix: true,
        }
    }

    /// Update time truncated to whole seconds (the remote API does not
    /// guarantee sub-second precision round-trips)
    pub fn updated_secs(&self) -> Option<i64> {
        self.updated.map(|t| t.as_second())
    }
}

/// One bucket in a bucket listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage<T> {
    #[serde(default)]
    pub prefixes: Vec<String>,

    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// Continuation cursor; absence signals the end of the sequence
    #[serde(default)]
    pub next_page_token: Option<String>,
}

fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
