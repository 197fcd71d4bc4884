//! Playlist persistence
//!
//! Playlists live under `${data}/playlists/` in one of three formats:
//! `.json` ({name, tracks}), `.m3u` (#EXTM3U header + one path per line),
//! or `.txt` (one path per line, `#` comments ignored). Loading tries the
//! formats in that order.

use atk_common::error::{Error, Result};
use atk_common::types::PlaylistInfo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMATS: &[&str] = &["json", "m3u", "txt"];

#[derive(Debug, Serialize, Deserialize)]
struct JsonPlaylist {
    name: String,
    tracks: Vec<String>,
}

fn playlists_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("playlists")
}

/// Save the given tracks as a playlist. Returns the file written.
pub fn save(data_dir: &Path, name: &str, format: &str, tracks: &[String]) -> Result<PathBuf> {
    if !FORMATS.contains(&format) {
        return Err(Error::InvalidArgs(format!(
            "Unsupported playlist format: {}",
            format
        )));
    }

    let dir = playlists_dir(data_dir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.{}", name, format));

    let contents = match format {
        "json" => {
            let playlist = JsonPlaylist {
                name: name.to_string(),
                tracks: tracks.to_vec(),
            };
            serde_json::to_string_pretty(&playlist)
                .map_err(|e| Error::Internal(format!("serialize playlist: {}", e)))?
        }
        "m3u" => {
            let mut out = String::from("#EXTM3U\n");
            for uri in tracks {
                out.push_str(uri);
                out.push('\n');
            }
            out
        }
        _ => {
            let mut out = String::new();
            for uri in tracks {
                out.push_str(uri);
                out.push('\n');
            }
            out
        }
    };

    fs::write(&path, contents)?;
    debug!("Saved playlist {} ({} tracks)", path.display(), tracks.len());
    Ok(path)
}

/// Load a playlist by name, trying `.json`, `.m3u`, `.txt` in order.
/// Returns the file found and its track list.
pub fn load(data_dir: &Path, name: &str) -> Result<(PathBuf, Vec<String>)> {
    let dir = playlists_dir(data_dir);

    let path = FORMATS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|p| p.exists())
        .ok_or_else(|| Error::FileNotFound(format!("Playlist not found: {}", name)))?;

    let contents = fs::read_to_string(&path)?;

    let tracks = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let playlist: JsonPlaylist = serde_json::from_str(&contents)
            .map_err(|e| Error::Decode(format!("bad playlist {}: {}", path.display(), e)))?;
        playlist.tracks
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    Ok((path, tracks))
}

/// List saved playlists with their track counts.
pub fn list(data_dir: &Path) -> Result<Vec<PlaylistInfo>> {
    let dir = playlists_dir(data_dir);
    let mut playlists = Vec::new();

    if !dir.exists() {
        return Ok(playlists);
    }

    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !FORMATS.contains(&ext) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let track_count = count_tracks(&path, ext);
        playlists.push(PlaylistInfo {
            name: name.to_string(),
            track_count,
            format: ext.to_string(),
        });
    }

    playlists.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(playlists)
}

fn count_tracks(path: &Path, format: &str) -> usize {
    let Ok(contents) = fs::read_to_string(path) else {
        return 0;
    };

    if format == "json" {
        serde_json::from_str::<JsonPlaylist>(&contents)
            .map(|p| p.tracks.len())
            .unwrap_or(0)
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracks() -> Vec<String> {
        vec![
            "/music/x.mp3".to_string(),
            "/music/y.flac".to_string(),
            "/music/z.ogg".to_string(),
        ]
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = save(dir.path(), "fav", "json", &tracks()).unwrap();
        assert_eq!(path, dir.path().join("playlists/fav.json"));

        let contents = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["name"], "fav");
        assert_eq!(value["tracks"].as_array().unwrap().len(), 3);

        let (loaded_path, loaded) = load(dir.path(), "fav").unwrap();
        assert_eq!(loaded_path, path);
        assert_eq!(loaded, tracks());
    }

    #[test]
    fn test_m3u_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = save(dir.path(), "road", "m3u", &tracks()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("#EXTM3U\n"));

        let (_, loaded) = load(dir.path(), "road").unwrap();
        assert_eq!(loaded, tracks());
    }

    #[test]
    fn test_txt_skips_comments_and_blanks() {
        let dir = TempDir::new().unwrap();
        let playlist_dir = dir.path().join("playlists");
        fs::create_dir_all(&playlist_dir).unwrap();
        fs::write(
            playlist_dir.join("mix.txt"),
            "# my mix\n/a.mp3\n\n  /b.mp3  \n# end\n",
        )
        .unwrap();

        let (_, loaded) = load(dir.path(), "mix").unwrap();
        assert_eq!(loaded, vec!["/a.mp3".to_string(), "/b.mp3".to_string()]);
    }

    #[test]
    fn test_load_missing_playlist() {
        let dir = TempDir::new().unwrap();
        let err = load(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_save_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let err = save(dir.path(), "x", "xml", &tracks()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }

    #[test]
    fn test_list_counts_tracks() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), "a", "json", &tracks()).unwrap();
        save(dir.path(), "b", "txt", &tracks()[..2].to_vec()).unwrap();

        let listed = list(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "a");
        assert_eq!(listed[0].track_count, 3);
        assert_eq!(listed[0].format, "json");
        assert_eq!(listed[1].name, "b");
        assert_eq!(listed[1].track_count, 2);
    }

    #[test]
    fn test_list_empty_when_no_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
    }
}
