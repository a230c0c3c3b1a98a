//! Serde mirror of the Tiled JSON map and tileset files.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Tiled stores custom properties as a flat name-to-value object.
pub(crate) type Properties = BTreeMap<String, Value>;

#[derive(Debug, Deserialize)]
pub(crate) struct MapFile {
    pub width: i64,
    pub height: i64,
    pub properties: Properties,
    pub tilesets: Vec<TilesetRef>,
    pub layers: Vec<LayerFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TilesetRef {
    pub firstgid: u32,
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TilesetFile {
    pub image: String,
    pub imagewidth: u32,
    pub imageheight: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub tileproperties: BTreeMap<String, Properties>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LayerFile {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub data: Option<Vec<u32>>,
    #[serde(default)]
    pub objects: Vec<ObjectFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectFile {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub properties: Option<Properties>,
}

/// Property value as text. Tiled writes strings, but numbers are accepted.
pub(crate) fn property<'a>(properties: &'a Properties, name: &str) -> Option<Cow<'a, str>> {
    match properties.get(name)? {
        Value::String(text) => Some(Cow::Borrowed(text)),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        _ => None,
    }
}
