//! Companion metadata files consulted while indexing. A sidecar that is
//! missing or does not parse is treated as absent.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::store::iso_seconds;

pub const FOLDER_SIDECAR: &str = "folder.json";
pub const AUDIO_SIDECAR_SUFFIX: &str = ".info.json";

/// One entry of a directory's `folder.json`, describing a child folder.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FolderMetadataSidecar {
    pub folder_name: String,
    pub name: String,
    pub original_url: Option<String>,
    pub url_broken: bool,
    pub directory_size: Option<String>,
}

/// `<basename>.info.json` beside an audio file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioInfoSidecar {
    pub title: Option<String>,
    pub meta_artist: Option<String>,
    pub upload_date: Option<String>,
    pub webpage_url: Option<String>,
    pub description: Option<String>,
    pub epoch: Option<f64>,
}

impl AudioInfoSidecar {
    /// `epoch` as `YYYY-MM-DDTHH:MM:SSZ`; non-positive or out of range is none.
    pub fn downloaded_at(&self) -> Option<String> {
        let epoch = self.epoch?;
        if !epoch.is_finite() || epoch <= 0.0 {
            return None;
        }
        let at = DateTime::<Utc>::from_timestamp(epoch.trunc() as i64, 0)?;
        Some(iso_seconds(at))
    }
}

/// Reads `folder.json` in `dir`, keyed by the child folder's disk name.
pub fn read_folder_sidecars(dir: &Path) -> HashMap<String, FolderMetadataSidecar> {
    let entries: Vec<FolderMetadataSidecar> = match fs::read(dir.join(FOLDER_SIDECAR)) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
        Err(_) => Vec::new(),
    };
    entries
        .into_iter()
        .filter(|entry| !entry.folder_name.is_empty())
        .map(|entry| (entry.folder_name.clone(), entry))
        .collect()
}

pub fn read_audio_sidecar(dir: &Path, base_name: &str) -> Option<AudioInfoSidecar> {
    let path = dir.join(format!("{}{}", base_name, AUDIO_SIDECAR_SUFFIX));
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn folder_sidecar_is_keyed_by_folder_name() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(FOLDER_SIDECAR),
            r#"[{"folder_name":"rock","name":"Rock Hits","original_url":"https://example.com/rock","url_broken":true,"directory_size":"1.2 GB"},
               {"folder_name":"jazz","name":"Jazz"}]"#,
        )
        .unwrap();
        let map = read_folder_sidecars(dir.path());
        assert_eq!(map.len(), 2);
        let rock = &map["rock"];
        assert_eq!(rock.name, "Rock Hits");
        assert!(rock.url_broken);
        assert_eq!(rock.directory_size.as_deref(), Some("1.2 GB"));
        assert_eq!(map["jazz"].original_url, None);
    }

    #[test]
    fn malformed_folder_sidecar_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FOLDER_SIDECAR), "{not json").unwrap();
        assert!(read_folder_sidecars(dir.path()).is_empty());
    }

    #[test]
    fn audio_sidecar_converts_epoch() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("track.info.json"),
            r#"{"title":"X","epoch":1700000000.75,"extra":"ignored"}"#,
        )
        .unwrap();
        let info = read_audio_sidecar(dir.path(), "track").unwrap();
        assert_eq!(info.title.as_deref(), Some("X"));
        assert_eq!(info.downloaded_at().as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn zero_epoch_has_no_download_time() {
        let info = AudioInfoSidecar {
            epoch: Some(0.0),
            ..Default::default()
        };
        assert_eq!(info.downloaded_at(), None);
    }

    #[test]
    fn unparseable_audio_sidecar_is_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.info.json"), r#"{"title": 5}"#).unwrap();
        assert!(read_audio_sidecar(dir.path(), "a").is_none());
    }
}
