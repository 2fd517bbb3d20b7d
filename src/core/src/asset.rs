//! Asset identity and packaged-asset metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared identity of an asset before it is packaged.
///
/// `sha256` is the declared content hash and the dedup key: two assets
/// with the same `sha256` occupy the same slot of an [`AssetMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub uri: String,
    pub sha256: String,
    pub stacks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub homepage: String,
}

impl AssetInfo {
    /// Convert into persisted metadata carrying the given layer diff-id.
    pub fn to_asset_value(&self, layer_diff_id: impl Into<String>) -> AssetValue {
        AssetValue {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            uri: self.uri.clone(),
            stacks: self.stacks.clone(),
            layer_diff_id: layer_diff_id.into(),
        }
    }
}

/// Persisted metadata for one packaged asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetValue {
    pub id: String,
    pub name: String,
    pub version: String,
    pub uri: String,
    pub stacks: Vec<String>,
    /// `sha256:<hex>` of the layer actually written; empty until then.
    #[serde(rename = "layerDiffID")]
    pub layer_diff_id: String,
}

/// Declared sha256 → packaged asset metadata.
///
/// Sorted so the serialized label is identical across runs.
pub type AssetMap = BTreeMap<String, AssetValue>;

#[cfg(test)]
mod tests {
    use super::*;

    fn first_asset() -> AssetInfo {
        AssetInfo {
            id: "first-asset".to_string(),
            name: "First Asset".to_string(),
            version: "1.2.3".to_string(),
            uri: "https://first-asset-uri".to_string(),
            sha256: "first-sha256".to_string(),
            stacks: vec!["io.buildpacks.stacks.bionic".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_to_asset_value() {
        let value = first_asset().to_asset_value("sha256:abc");
        assert_eq!(value.id, "first-asset");
        assert_eq!(value.name, "First Asset");
        assert_eq!(value.version, "1.2.3");
        assert_eq!(value.uri, "https://first-asset-uri");
        assert_eq!(value.stacks, vec!["io.buildpacks.stacks.bionic"]);
        assert_eq!(value.layer_diff_id, "sha256:abc");
    }

    #[test]
    fn test_asset_value_missing_fields_default() {
        let map: AssetMap = serde_json::from_str(r#"{"sha":{"id":"a"}}"#).unwrap();
        assert_eq!(map["sha"].id, "a");
        assert!(map["sha"].layer_diff_id.is_empty());
    }

    #[test]
    fn test_asset_value_json_shape() {
        let value = first_asset().to_asset_value("sha256:abc");
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["layerDiffID"], "sha256:abc");
        assert_eq!(json["id"], "first-asset");
        assert_eq!(json["stacks"][0], "io.buildpacks.stacks.bionic");
        assert_eq!(json.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_asset_map_json_is_sorted() {
        let mut map = AssetMap::new();
        map.insert("b".to_string(), AssetValue::default());
        map.insert("a".to_string(), AssetValue::default());
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.find("\"a\"").unwrap() < json.find("\"b\"").unwrap());
    }

    #[test]
    fn test_asset_info_yaml_defaults() {
        let info: AssetInfo = serde_yaml::from_str("id: jdk\nsha256: abc\n").unwrap();
        assert_eq!(info.id, "jdk");
        assert_eq!(info.sha256, "abc");
        assert!(info.uri.is_empty());
        assert!(info.stacks.is_empty());
        assert!(info.api_version.is_none());
    }
}
