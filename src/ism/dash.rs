//! DASH manifests
//!
//! Two flavours over the same ladder: an on-demand MPD addressing byte ranges
//! of the pre-muxed files, and an isoff-live MPD with templated `content`
//! URLs and an explicit segment timeline.

use std::fmt::Write;

use super::asset::{Asset, Level};
use crate::drm::PLAYREADY_SYSTEM_ID;
use crate::error::{Error, Result};
use crate::media::TrackKind;

const MPD_NS: &str = "urn:mpeg:dash:schema:mpd:2011";
const PROFILE_ON_DEMAND: &str = "urn:mpeg:dash:profile:isoff-on-demand:2011";
const PROFILE_LIVE: &str = "urn:mpeg:dash:profile:isoff-live:2011";

/// `PT{seconds}S` with millisecond precision
fn duration_attr(hns: u64) -> String {
    format!("PT{}.{:03}S", hns / 10_000_000, (hns % 10_000_000) / 10_000)
}

fn write_header(s: &mut String, asset: &Asset, profile: &str) -> Result<()> {
    writeln!(s, "<?xml version=\"1.0\" encoding=\"utf-8\"?>")?;
    writeln!(
        s,
        "<MPD xmlns=\"{}\" profiles=\"{}\" type=\"static\" mediaPresentationDuration=\"{}\" minBufferTime=\"PT2S\">",
        MPD_NS,
        profile,
        duration_attr(asset.duration)
    )?;
    writeln!(s, "  <Period start=\"PT0S\">")?;
    Ok(())
}

fn write_footer(s: &mut String) -> Result<()> {
    writeln!(s, "  </Period>")?;
    writeln!(s, "</MPD>")?;
    Ok(())
}

fn write_adaptation_set_open(s: &mut String, asset: &Asset, kind: TrackKind) -> Result<()> {
    match kind {
        TrackKind::Video => {
            let (w, h) = asset.max_size();
            writeln!(
                s,
                "    <AdaptationSet mimeType=\"video/mp4\" segmentAlignment=\"true\" startWithSAP=\"1\" maxWidth=\"{}\" maxHeight=\"{}\">",
                w, h
            )?;
        }
        _ => {
            writeln!(
                s,
                "    <AdaptationSet mimeType=\"audio/mp4\" segmentAlignment=\"true\" startWithSAP=\"1\">"
            )?;
        }
    }
    if let Some(protection) = &asset.protection {
        writeln!(
            s,
            "      <ContentProtection schemeIdUri=\"urn:uuid:{}\">\
             <mspr:pro xmlns:mspr=\"urn:microsoft:playready\">{}</mspr:pro></ContentProtection>",
            PLAYREADY_SYSTEM_ID,
            protection.protection_header_base64()
        )?;
    }
    Ok(())
}

fn representation_attrs(level: &Level) -> String {
    let mut attrs = format!(
        "id=\"{}\" bandwidth=\"{}\" codecs=\"{}\"",
        level.id(),
        level.bitrate,
        level.codec.codecs()
    );
    if level.kind == TrackKind::Video {
        attrs.push_str(&format!(" width=\"{}\" height=\"{}\"", level.width, level.height));
    }
    attrs
}

/// On-demand MPD with range-addressed segments. Only assets built from
/// fragmented files (one track per `moof`) can be addressed this way.
pub fn render_range_mpd(asset: &Asset) -> Result<String> {
    let mut s = String::with_capacity(4096);
    write_header(&mut s, asset, PROFILE_ON_DEMAND)?;

    for kind in [TrackKind::Video, TrackKind::Audio] {
        let levels = asset.levels(kind);
        if levels.is_empty() {
            continue;
        }
        write_adaptation_set_open(&mut s, asset, kind)?;
        for level in levels {
            let not_addressable = || Error::not_found(format!("{} level {} has no byte ranges", asset.key, level.id()));
            let init = level.container.init_range().ok_or_else(not_addressable)?;
            let fragments = level.fragments()?;

            writeln!(s, "      <Representation {}>", representation_attrs(level))?;
            writeln!(s, "        <BaseURL>content-range/{}</BaseURL>", level.id())?;
            writeln!(
                s,
                "        <SegmentList timescale=\"10000000\" duration=\"{}\">",
                fragments.first().map(|f| f.duration).unwrap_or(0)
            )?;
            writeln!(
                s,
                "          <Initialization range=\"{}-{}\"/>",
                init.offset,
                init.offset + init.len - 1
            )?;
            for fragment in fragments {
                let range = fragment.file_range.ok_or_else(not_addressable)?;
                writeln!(
                    s,
                    "          <SegmentURL mediaRange=\"{}-{}\"/>",
                    range.offset,
                    range.offset + range.len - 1
                )?;
            }
            writeln!(s, "        </SegmentList>")?;
            writeln!(s, "      </Representation>")?;
        }
        writeln!(s, "    </AdaptationSet>")?;
    }

    write_footer(&mut s)?;
    Ok(s)
}

/// isoff-live MPD with `$Bandwidth$`/`$Time$` templated `content` URLs
pub fn render_live_mpd(asset: &Asset) -> Result<String> {
    let mut s = String::with_capacity(4096);
    write_header(&mut s, asset, PROFILE_LIVE)?;

    for kind in [TrackKind::Video, TrackKind::Audio] {
        let levels = asset.levels(kind);
        let Some(first) = levels.first() else {
            continue;
        };
        let stream = kind.as_str();

        write_adaptation_set_open(&mut s, asset, kind)?;
        writeln!(
            s,
            "      <SegmentTemplate timescale=\"10000000\" \
             media=\"content?stream={stream}&amp;bitrate=$Bandwidth$&amp;start_time=$Time$\" \
             initialization=\"content?stream={stream}&amp;bitrate=$Bandwidth$&amp;start_time=init\">",
            stream = stream
        )?;
        writeln!(s, "        <SegmentTimeline>")?;
        for fragment in first.fragments()? {
            writeln!(s, "          <S t=\"{}\" d=\"{}\"/>", fragment.timestamp, fragment.duration)?;
        }
        writeln!(s, "        </SegmentTimeline>")?;
        writeln!(s, "      </SegmentTemplate>")?;
        for level in levels {
            writeln!(s, "      <Representation {}/>", representation_attrs(level))?;
        }
        writeln!(s, "    </AdaptationSet>")?;
    }

    write_footer(&mut s)?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_util::{asset_dir, progressive_asset, AssetSpec};

    fn asset() -> (tempfile::TempDir, Asset) {
        let root = asset_dir("clip", &AssetSpec::default(), None);
        let asset = Asset::load(root.path(), "clip").unwrap();
        (root, asset)
    }

    #[test]
    fn test_duration_attr() {
        assert_eq!(duration_attr(30_000_000), "PT3.000S");
        assert_eq!(duration_attr(12_345_678), "PT1.234S");
    }

    #[test]
    fn test_live_mpd() {
        let (_root, asset) = asset();
        let mpd = render_live_mpd(&asset).unwrap();

        assert!(mpd.contains(PROFILE_LIVE));
        assert!(mpd.contains("mediaPresentationDuration=\"PT3.000S\""));
        assert!(mpd.contains(
            "media=\"content?stream=video&amp;bitrate=$Bandwidth$&amp;start_time=$Time$\""
        ));
        assert!(mpd.contains("initialization=\"content?stream=audio&amp;bitrate=$Bandwidth$&amp;start_time=init\""));
        assert_eq!(mpd.matches("<S t=").count(), 6);
        assert!(mpd.contains("<S t=\"20000000\" d=\"10000000\"/>"));
        assert!(mpd.contains("id=\"v0\" bandwidth=\"16000\" codecs=\"avc1.42c01f\" width=\"640\" height=\"360\""));
        assert!(mpd.contains("id=\"a0\" bandwidth=\"3200\" codecs=\"mp4a.40.2\""));
    }

    #[test]
    fn test_range_mpd_matches_file_layout() {
        let (_root, asset) = asset();
        let mpd = render_range_mpd(&asset).unwrap();

        let level = &asset.video[0];
        let init = level.container.init_range().unwrap();
        assert!(mpd.contains(&format!("<Initialization range=\"0-{}\"/>", init.len - 1)));
        assert!(mpd.contains("<BaseURL>content-range/v0</BaseURL>"));
        assert!(mpd.contains("<BaseURL>content-range/a0</BaseURL>"));
        assert_eq!(mpd.matches("<SegmentURL ").count(), 6);

        let second = level.fragments().unwrap()[1].file_range.unwrap();
        assert!(mpd.contains(&format!(
            "<SegmentURL mediaRange=\"{}-{}\"/>",
            second.offset,
            second.offset + second.len - 1
        )));
    }

    #[test]
    fn test_range_mpd_needs_fragmented_input() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("progressive");
        std::fs::create_dir(&dir).unwrap();
        let file = progressive_asset(4, 2);
        std::fs::copy(file.path(), dir.join("progressive.mp4")).unwrap();

        let asset = Asset::load(root.path(), "progressive").unwrap();
        assert!(matches!(render_range_mpd(&asset), Err(Error::NotFound(_))));
        assert!(render_live_mpd(&asset).is_ok());
    }

    #[test]
    fn test_protection_element() {
        let descriptor = "[[level]]\nfile = \"clip.ismv\"\n[protection]\n\
                          key_id = \"09e36702-8f33-436c-a5dd-60ffe6671e70\"\n\
                          content_key = \"000102030405060708090a0b0c0d0e0f\"\nla_url = \"http://license\"\n";
        let root = asset_dir("clip", &AssetSpec::default(), Some(descriptor));
        let asset = Asset::load(root.path(), "clip").unwrap();
        let mpd = render_live_mpd(&asset).unwrap();
        assert_eq!(
            mpd.matches("<ContentProtection schemeIdUri=\"urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95\">")
                .count(),
            2
        );
    }
}
