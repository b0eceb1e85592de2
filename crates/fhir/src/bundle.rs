//! FHIR `Bundle` wire model (searchset subset).

use crate::{from_value_with_path, FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// A search result bundle.
///
/// Entries are held as raw JSON until a caller asks for them as a concrete resource type with
/// [`Bundle::entries_as`]. A searchset with no matches may omit `entry` entirely; that is read as
/// an empty list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle<R = serde_json::Value> {
    pub resource_type: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry<R>>,
}

/// One entry of a [`Bundle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry<R = serde_json::Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    pub resource: R,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<serde_json::Value>,
}

impl Bundle {
    /// Parses a bundle from a JSON value, checking `resourceType`.
    pub fn from_json(value: serde_json::Value) -> FhirResult<Self> {
        let bundle: Bundle = from_value_with_path("Bundle", value)?;
        if bundle.resource_type != "Bundle" {
            return Err(FhirError::UnexpectedResource {
                expected: "Bundle".into(),
                found: bundle.resource_type,
            });
        }
        Ok(bundle)
    }

    /// Converts every entry's resource into `R`, preserving order.
    ///
    /// Fails on the first entry that does not match `R`; the error names the entry index.
    pub fn entries_as<R>(&self) -> FhirResult<Vec<BundleEntry<R>>>
    where
        R: serde::de::DeserializeOwned,
    {
        self.entry
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let resource = from_value_with_path(&format!("entry[{i}]"), e.resource.clone())?;
                Ok(BundleEntry {
                    full_url: e.full_url.clone(),
                    resource,
                    search: e.search.clone(),
                })
            })
            .collect()
    }
}
