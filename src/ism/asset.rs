//! Assets and their bitrate ladders
//!
//! An asset is a directory `{vod_root}/{key}` holding one or more ISOBMFF
//! files. An optional `asset.toml` names the files, their bitrates, codec data
//! overrides and protection settings:
//!
//! ```toml
//! [[level]]
//! file = "speedway_2962.ismv"
//! video_bitrate = 2962000
//! audio_bitrate = 128000
//!
//! [protection]
//! key_id = "09e36702-8f33-436c-a5dd-60ffe6671e70"
//! content_key = "000102030405060708090a0b0c0d0e0f"
//! la_url = "http://localhost:8080/rightsmanager.asmx"
//! ```
//!
//! Without it every `.ismv`, `.mp4` and `.isma` file becomes a level and
//! bitrates are computed from the fragment sizes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;

use super::query::{ContentQuery, StartTime};
use crate::drm::{self, Protection};
use crate::error::{Error, Result};
use crate::media::{CodecConfig, Container, Fragment, ParseError, Track, TrackKind};

const DESCRIPTOR_FILE: &str = "asset.toml";
const MEDIA_EXTENSIONS: [&str; 3] = ["ismv", "mp4", "isma"];

#[derive(Debug, Default, Deserialize)]
struct AssetDescriptor {
    #[serde(default, rename = "level")]
    levels: Vec<LevelDescriptor>,
    protection: Option<ProtectionDescriptor>,
}

#[derive(Debug, Deserialize)]
struct LevelDescriptor {
    file: String,
    video_bitrate: Option<u32>,
    audio_bitrate: Option<u32>,
    video_codec_data: Option<String>,
    audio_codec_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtectionDescriptor {
    key_id: String,
    content_key: String,
    la_url: String,
}

/// One quality rendition of an asset
#[derive(Debug, Clone)]
pub struct Level {
    pub kind: TrackKind,
    /// Position among the asset's levels of the same kind
    pub index: usize,
    pub bitrate: u32,
    pub width: u16,
    pub height: u16,
    pub track_id: u32,
    pub fragment_count: usize,
    pub codec: CodecConfig,
    /// `CodecPrivateData` as rendered in the Smooth manifest
    pub codec_private_data: String,
    pub container: Arc<Container>,
}

impl Level {
    fn new(container: Arc<Container>, track: &Track, bitrate: Option<u32>, codec_data: Option<&str>) -> Result<Self> {
        let fragments = container.fragment_index(track.id)?;
        let bitrate = bitrate.unwrap_or_else(|| computed_bitrate(fragments));
        let codec_private_data = match codec_data {
            Some(data) => data.trim().to_ascii_uppercase(),
            None => track.codec.codec_private_data(),
        };

        Ok(Self {
            kind: track.kind,
            index: 0,
            bitrate,
            width: track.width,
            height: track.height,
            track_id: track.id,
            fragment_count: fragments.len(),
            codec: track.codec.clone(),
            codec_private_data,
            container,
        })
    }

    /// Fragment index of the level's track
    pub fn fragments(&self) -> Result<&[Fragment]> {
        self.container.fragment_index(self.track_id)
    }

    /// `v0`, `a1`, ...
    pub fn id(&self) -> String {
        let prefix = if self.kind == TrackKind::Video { 'v' } else { 'a' };
        format!("{}{}", prefix, self.index)
    }
}

fn computed_bitrate(fragments: &[Fragment]) -> u32 {
    let bytes: u64 = fragments.iter().map(|f| f.size).sum();
    let duration: u64 = fragments.iter().map(|f| f.duration).sum();
    if duration == 0 {
        return 0;
    }
    ((bytes as u128 * 8 * 10_000_000) / duration as u128).min(u32::MAX as u128) as u32
}

/// A content fragment response body
#[derive(Debug, Clone)]
pub enum Content {
    /// Initialization segment
    Init(Bytes),
    /// `moof` followed by `mdat`
    Fragment { header: Bytes, payload: Bytes },
}

/// A content item and its bitrate ladder
#[derive(Debug)]
pub struct Asset {
    pub key: String,
    /// End of the last fragment, in 100 ns units
    pub duration: u64,
    pub video: Vec<Level>,
    pub audio: Vec<Level>,
    pub protection: Option<Protection>,
}

impl Asset {
    /// Load the asset `key` from under `root`
    pub fn load(root: &Path, key: &str) -> Result<Self> {
        if !is_safe_component(key) {
            return Err(Error::not_found(format!("asset {:?}", key)));
        }
        let dir = root.join(key);
        if !dir.is_dir() {
            return Err(Error::not_found(format!("asset {:?}", key)));
        }

        let descriptor_path = dir.join(DESCRIPTOR_FILE);
        let descriptor = if descriptor_path.is_file() {
            let text = std::fs::read_to_string(&descriptor_path)?;
            toml::from_str::<AssetDescriptor>(&text)
                .map_err(|e| Error::Config(format!("{}: {}", descriptor_path.display(), e)))?
        } else {
            scan_media_files(&dir)?
        };

        let mut containers: HashMap<String, Arc<Container>> = HashMap::new();
        let mut levels = Vec::new();
        for entry in &descriptor.levels {
            if !is_safe_component(&entry.file) {
                return Err(Error::Config(format!("bad level file {:?}", entry.file)));
            }
            let container = match containers.get(&entry.file) {
                Some(c) => c.clone(),
                None => {
                    let c = Arc::new(Container::load(dir.join(&entry.file))?);
                    containers.insert(entry.file.clone(), c.clone());
                    c
                }
            };

            for track in container.tracks() {
                let (bitrate, codec_data) = match track.kind {
                    TrackKind::Video => (entry.video_bitrate, entry.video_codec_data.as_deref()),
                    TrackKind::Audio => (entry.audio_bitrate, entry.audio_codec_data.as_deref()),
                    TrackKind::Other => continue,
                };
                levels.push(Level::new(container.clone(), track, bitrate, codec_data)?);
            }
        }

        let protection = descriptor
            .protection
            .map(|p| Protection::from_hex(&p.key_id, &p.content_key, p.la_url))
            .transpose()?;

        let asset = Self::from_levels(key, levels, protection)?;
        tracing::info!(
            asset = %asset.key,
            video_levels = asset.video.len(),
            audio_levels = asset.audio.len(),
            duration = asset.duration,
            protected = asset.protection.is_some(),
            "Loaded asset"
        );
        Ok(asset)
    }

    /// Assemble an asset from loaded levels: levels are ordered by bitrate,
    /// duplicates of a bitrate dropped, and fragment timelines validated.
    pub fn from_levels(key: &str, levels: Vec<Level>, protection: Option<Protection>) -> Result<Self> {
        let (mut video, mut audio): (Vec<Level>, Vec<Level>) =
            levels.into_iter().partition(|l| l.kind == TrackKind::Video);

        for ladder in [&mut video, &mut audio] {
            ladder.sort_by_key(|l| l.bitrate);
            ladder.dedup_by_key(|l| l.bitrate);
            for (i, level) in ladder.iter_mut().enumerate() {
                level.index = i;
            }
            validate_timeline(ladder)?;
        }
        if video.is_empty() && audio.is_empty() {
            return Err(ParseError::MissingBox("trak").into());
        }

        let last_end = |ladder: &[Level]| -> Result<Option<u64>> {
            match ladder.first() {
                Some(level) => Ok(level.fragments()?.last().map(Fragment::end)),
                None => Ok(None),
            }
        };
        let duration = match last_end(&video)? {
            Some(end) => end,
            None => last_end(&audio)?.unwrap_or(0),
        };

        Ok(Self {
            key: key.to_string(),
            duration,
            video,
            audio,
            protection,
        })
    }

    pub fn levels(&self, kind: TrackKind) -> &[Level] {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
            TrackKind::Other => &[],
        }
    }

    /// Level of `kind` with exactly `bitrate`
    pub fn level(&self, kind: TrackKind, bitrate: u32) -> Option<&Level> {
        self.levels(kind).iter().find(|l| l.bitrate == bitrate)
    }

    /// Level by its id (`v0`, `a1`, ...)
    pub fn level_by_id(&self, id: &str) -> Result<&Level> {
        let not_found = || Error::not_found(format!("level {:?} of {}", id, self.key));
        let mut chars = id.chars();
        let kind = match chars.next() {
            Some('v') => TrackKind::Video,
            Some('a') => TrackKind::Audio,
            _ => return Err(not_found()),
        };
        let index: usize = chars.as_str().parse().map_err(|_| not_found())?;
        self.levels(kind).get(index).ok_or_else(not_found)
    }

    /// Largest video dimensions of the ladder
    pub fn max_size(&self) -> (u16, u16) {
        let width = self.video.iter().map(|l| l.width).max().unwrap_or(0);
        let height = self.video.iter().map(|l| l.height).max().unwrap_or(0);
        (width, height)
    }

    /// Resolve a `content` request to its response body. Fragment payloads
    /// of protected assets are encrypted; initialization segments never are.
    pub fn content(&self, query: &ContentQuery) -> Result<Content> {
        let level = self
            .level(query.kind, query.bitrate)
            .ok_or_else(|| Error::not_found(format!("no {} level at {}", query.kind.as_str(), query.bitrate)))?;

        let timestamp = match query.start {
            StartTime::Init => return Ok(Content::Init(level.container.init_segment(level.track_id)?)),
            StartTime::At(t) => t,
        };

        let fragment = level.container.fragment_by_timestamp(level.track_id, timestamp)?;
        let mut payload = level.container.assemble_payload(fragment)?;

        let ivs = match &self.protection {
            Some(protection) => {
                let header_len = payload.len() - fragment.size as usize;
                let iv = drm::fragment_iv(level.track_id, fragment.timestamp);
                let sizes = fragment.samples.iter().map(|s| s.size);
                Some(drm::encrypt_samples(&protection.content_key, iv, &mut payload, header_len, sizes)?)
            }
            None => None,
        };

        let header = level.container.serialize_fragment_header(fragment, ivs.as_deref());
        Ok(Content::Fragment {
            header,
            payload: payload.freeze(),
        })
    }
}

/// Every level of a ladder must share one fragment timeline
fn validate_timeline(ladder: &[Level]) -> Result<()> {
    let Some(first) = ladder.first() else {
        return Ok(());
    };
    let reference: Vec<(u64, u64)> = first.fragments()?.iter().map(|f| (f.timestamp, f.duration)).collect();

    for level in &ladder[1..] {
        let timeline = level.fragments()?.iter().map(|f| (f.timestamp, f.duration));
        if !timeline.eq(reference.iter().copied()) {
            return Err(ParseError::TimelineMismatch(format!(
                "{} level at {} differs from level at {}",
                level.kind.as_str(),
                level.bitrate,
                first.bitrate
            ))
            .into());
        }
    }
    Ok(())
}

fn scan_media_files(dir: &Path) -> Result<AssetDescriptor> {
    let mut files: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();

    Ok(AssetDescriptor {
        levels: files
            .into_iter()
            .map(|file| LevelDescriptor {
                file,
                video_bitrate: None,
                audio_bitrate: None,
                video_codec_data: None,
                audio_codec_data: None,
            })
            .collect(),
        protection: None,
    })
}

/// A single, non-hidden path component
pub(crate) fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_util::{self, fragmented_bytes, write_file, AssetSpec};

    const DESCRIPTOR: &str = r#"
[[level]]
file = "speedway.ismv"
video_bitrate = 2962000
audio_bitrate = 128000
"#;

    fn asset_dir(descriptor: Option<&str>) -> tempfile::TempDir {
        test_util::asset_dir("speedway", &AssetSpec::default(), descriptor)
    }

    #[test]
    fn test_load_with_descriptor() {
        let root = asset_dir(Some(DESCRIPTOR));
        let asset = Asset::load(root.path(), "speedway").unwrap();

        assert_eq!(asset.video.len(), 1);
        assert_eq!(asset.audio.len(), 1);
        assert_eq!(asset.video[0].bitrate, 2_962_000);
        assert_eq!(asset.audio[0].bitrate, 128_000);
        assert_eq!(asset.video[0].fragment_count, 3);
        assert_eq!(asset.duration, 30_000_000);
        assert_eq!((asset.video[0].width, asset.video[0].height), (640, 360));
        assert!(asset.protection.is_none());
    }

    #[test]
    fn test_load_by_scanning() {
        let root = asset_dir(None);
        let asset = Asset::load(root.path(), "speedway").unwrap();

        // 2 x 1000 bytes per 1 s fragment
        assert_eq!(asset.video[0].bitrate, 16_000);
        assert_eq!(asset.audio[0].bitrate, 3_200);
    }

    #[test]
    fn test_codec_data_override() {
        let root = asset_dir(Some(
            "[[level]]\nfile = \"speedway.ismv\"\nvideo_codec_data = \"00000001abcd\"\n",
        ));
        let asset = Asset::load(root.path(), "speedway").unwrap();
        assert_eq!(asset.video[0].codec_private_data, "00000001ABCD");
        assert_eq!(asset.audio[0].codec_private_data, "1210");
    }

    #[test]
    fn test_duration_falls_back_to_audio() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("radio");
        std::fs::create_dir(&dir).unwrap();
        let spec = AssetSpec {
            fragments: 4,
            ..AssetSpec::default()
        };
        write_file(&dir.join("radio.isma"), &fragmented_bytes(&spec));

        let container = Arc::new(Container::load(dir.join("radio.isma")).unwrap());
        let audio = container.track(2).unwrap();
        let level = Level::new(container.clone(), audio, Some(64_000), None).unwrap();

        let asset = Asset::from_levels("radio", vec![level], None).unwrap();
        assert!(asset.video.is_empty());
        assert_eq!(asset.duration, 40_000_000);
    }

    #[test]
    fn test_duration_ignores_longer_audio() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("mixed");
        std::fs::create_dir(&dir).unwrap();
        write_file(&dir.join("video.ismv"), &fragmented_bytes(&AssetSpec::default()));
        let longer = AssetSpec {
            fragments: 5,
            ..AssetSpec::default()
        };
        write_file(&dir.join("audio.isma"), &fragmented_bytes(&longer));

        let video_file = Arc::new(Container::load(dir.join("video.ismv")).unwrap());
        let audio_file = Arc::new(Container::load(dir.join("audio.isma")).unwrap());
        let video = Level::new(video_file.clone(), video_file.track(1).unwrap(), Some(2_962_000), None).unwrap();
        let audio = Level::new(audio_file.clone(), audio_file.track(2).unwrap(), Some(128_000), None).unwrap();
        assert_eq!(audio.fragments().unwrap().len(), 5);

        let asset = Asset::from_levels("mixed", vec![audio, video], None).unwrap();
        assert_eq!(asset.video[0].fragment_count, 3);
        assert_eq!(asset.duration, 30_000_000);
    }

    #[test]
    fn test_timeline_mismatch_fails_load() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ladder");
        std::fs::create_dir(&dir).unwrap();
        write_file(&dir.join("a.ismv"), &fragmented_bytes(&AssetSpec::default()));
        let short = AssetSpec {
            fragments: 2,
            video_sample_size: 3000,
            ..AssetSpec::default()
        };
        write_file(&dir.join("b.ismv"), &fragmented_bytes(&short));

        let err = Asset::load(root.path(), "ladder").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::TimelineMismatch(_))));
        assert_eq!(err.status(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ladder_is_ordered_and_indexed() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ladder");
        std::fs::create_dir(&dir).unwrap();
        let high = AssetSpec {
            video_sample_size: 5000,
            width: 1280,
            height: 720,
            ..AssetSpec::default()
        };
        write_file(&dir.join("a_high.ismv"), &fragmented_bytes(&high));
        write_file(&dir.join("b_low.ismv"), &fragmented_bytes(&AssetSpec::default()));

        let asset = Asset::load(root.path(), "ladder").unwrap();
        assert_eq!(asset.video.len(), 2);
        assert_eq!(asset.video[0].bitrate, 16_000);
        assert_eq!(asset.video[1].bitrate, 80_000);
        assert_eq!(asset.video[1].id(), "v1");
        // identical audio tracks collapse into one level
        assert_eq!(asset.audio.len(), 1);
        assert_eq!(asset.max_size(), (1280, 720));
        assert_eq!(asset.level_by_id("v1").unwrap().width, 1280);
        assert!(asset.level_by_id("v2").is_err());
        assert!(asset.level_by_id("x0").is_err());
    }

    #[test]
    fn test_unsafe_keys_are_not_found() {
        let root = asset_dir(None);
        for key in ["..", "../speedway", ".hidden", "", "a/b"] {
            assert!(matches!(Asset::load(root.path(), key), Err(Error::NotFound(_))), "{:?}", key);
        }
        assert!(matches!(Asset::load(root.path(), "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_content_fragment_is_exact() {
        let root = asset_dir(Some(DESCRIPTOR));
        let asset = Asset::load(root.path(), "speedway").unwrap();
        let query = ContentQuery {
            kind: TrackKind::Video,
            bitrate: 2_962_000,
            start: StartTime::At(10_000_000),
        };

        let level = &asset.video[0];
        let fragment = level.container.fragment_by_timestamp(1, 10_000_000).unwrap();
        let expected_header = level.container.serialize_fragment_header(fragment, None);
        let expected_payload = level.container.assemble_payload(fragment).unwrap();

        match asset.content(&query).unwrap() {
            Content::Fragment { header, payload } => {
                assert_eq!(header, expected_header);
                assert_eq!(payload, expected_payload.freeze());
            }
            other => panic!("unexpected {:?}", other),
        }

        let miss = ContentQuery {
            start: StartTime::At(5_000_000),
            ..query
        };
        assert_eq!(asset.content(&miss).unwrap_err().status(), http::StatusCode::NOT_FOUND);

        let wrong_bitrate = ContentQuery { bitrate: 1, ..query };
        assert!(matches!(asset.content(&wrong_bitrate), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_protected_content_is_encrypted() {
        let descriptor = format!(
            "{}\n[protection]\nkey_id = \"09e36702-8f33-436c-a5dd-60ffe6671e70\"\n\
             content_key = \"000102030405060708090a0b0c0d0e0f\"\nla_url = \"http://license\"\n",
            DESCRIPTOR
        );
        let root = asset_dir(Some(&descriptor));
        let asset = Asset::load(root.path(), "speedway").unwrap();
        assert!(asset.protection.is_some());

        let query = ContentQuery {
            kind: TrackKind::Audio,
            bitrate: 128_000,
            start: StartTime::At(0),
        };
        let Content::Fragment { header, payload } = asset.content(&query).unwrap() else {
            panic!("expected a fragment");
        };
        let spec = AssetSpec::default();
        assert_eq!(&payload[4..8], b"mdat");
        assert!(payload[8..].iter().any(|&b| b != spec.fill_byte(2, 0)));
        // moof gains a sample encryption box
        assert!(header.windows(4).any(|w| w == b"uuid"));

        let init = ContentQuery {
            start: StartTime::Init,
            ..query
        };
        let Content::Init(init) = asset.content(&init).unwrap() else {
            panic!("expected an init segment");
        };
        assert_eq!(&init[4..8], b"ftyp");
    }
}
