use aws_smithy_types::DateTime;

use crate::paths;

/// S3 storage classes as reported on listed objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageClass {
    Standard,
    StandardIa,
    OnezoneIa,
    ReducedRedundancy,
    Glacier,
    IntelligentTiering,
    DeepArchive,
    Other(String),
}

impl StorageClass {
    pub fn from_api(value: &str) -> StorageClass {
        match value {
            "STANDARD" => StorageClass::Standard,
            "STANDARD_IA" => StorageClass::StandardIa,
            "ONEZONE_IA" => StorageClass::OnezoneIa,
            "REDUCED_REDUNDANCY" => StorageClass::ReducedRedundancy,
            "GLACIER" => StorageClass::Glacier,
            "INTELLIGENT_TIERING" => StorageClass::IntelligentTiering,
            "DEEP_ARCHIVE" => StorageClass::DeepArchive,
            other => StorageClass::Other(other.to_string()),
        }
    }

    /// Human readable label shown in the listing
    pub fn label(&self) -> &str {
        match self {
            StorageClass::Standard => "Standard",
            StorageClass::StandardIa => "Standard IA",
            StorageClass::OnezoneIa => "One Zone-IA",
            StorageClass::ReducedRedundancy => "Reduced Redundancy",
            StorageClass::Glacier => "Glacier",
            StorageClass::IntelligentTiering => "Intelligent Tiering",
            StorageClass::DeepArchive => "Deep Archive",
            StorageClass::Other(name) => name,
        }
    }
}

/// One row of the object listing, either an object or a simulated folder
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Full key; a trailing `/` marks a folder
    pub key: String,
    pub is_folder: bool,
    /// Bytes; always `None` for folders
    pub size: Option<u64>,
    pub last_modified: Option<DateTime>,
    pub storage_class: Option<StorageClass>,
}

impl Entry {
    pub fn object(
        key: impl Into<String>,
        size: Option<u64>,
        last_modified: Option<DateTime>,
        storage_class: Option<StorageClass>,
    ) -> Entry {
        Entry {
            key: key.into(),
            is_folder: false,
            size,
            last_modified,
            storage_class,
        }
    }

    /// Folders never carry size, timestamp or storage class
    pub fn folder(key: impl Into<String>) -> Entry {
        Entry {
            key: key.into(),
            is_folder: true,
            size: None,
            last_modified: None,
            storage_class: None,
        }
    }

    /// Display name: folder name for folders, filename for objects
    pub fn name(&self) -> String {
        if self.is_folder {
            paths::prefix_folder(&self.key)
        } else {
            paths::filename(&self.key).to_string()
        }
    }
}
