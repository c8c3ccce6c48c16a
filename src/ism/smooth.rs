//! Smooth Streaming manifest

use std::fmt::Write;

use super::asset::{Asset, Level};
use crate::drm::PLAYREADY_SYSTEM_ID;
use crate::error::Result;
use crate::media::CodecConfig;

/// Render the client manifest of `asset`
pub fn render_manifest(asset: &Asset) -> Result<String> {
    let mut s = String::with_capacity(4096);

    writeln!(s, "<?xml version=\"1.0\" encoding=\"utf-8\"?>")?;
    writeln!(
        s,
        "<SmoothStreamingMedia MajorVersion=\"2\" MinorVersion=\"1\" Duration=\"{}\">",
        asset.duration
    )?;

    if let Some(first) = asset.video.first() {
        let (max_width, max_height) = asset.max_size();
        writeln!(
            s,
            "  <StreamIndex Type=\"video\" Name=\"video\" Chunks=\"{}\" QualityLevels=\"{}\" \
             MaxWidth=\"{w}\" MaxHeight=\"{h}\" DisplayWidth=\"{w}\" DisplayHeight=\"{h}\" \
             Url=\"content?stream=video&amp;bitrate={{bitrate}}&amp;start_time={{start time}}\">",
            first.fragment_count,
            asset.video.len(),
            w = max_width,
            h = max_height,
        )?;
        for level in &asset.video {
            writeln!(
                s,
                "    <QualityLevel Index=\"{}\" Bitrate=\"{}\" FourCC=\"{}\" MaxWidth=\"{}\" \
                 MaxHeight=\"{}\" CodecPrivateData=\"{}\" />",
                level.index,
                level.bitrate,
                fourcc(level, "H264"),
                level.width,
                level.height,
                level.codec_private_data
            )?;
        }
        write_chunks(&mut s, first)?;
        writeln!(s, "  </StreamIndex>")?;
    }

    if let Some(first) = asset.audio.first() {
        writeln!(
            s,
            "  <StreamIndex Type=\"audio\" Index=\"0\" Name=\"audio\" Chunks=\"{}\" QualityLevels=\"{}\" \
             Url=\"content?stream=audio&amp;bitrate={{bitrate}}&amp;start_time={{start time}}\">",
            first.fragment_count,
            asset.audio.len(),
        )?;
        for level in &asset.audio {
            let (sample_rate, channels, bits) = match &level.codec {
                CodecConfig::Aac {
                    sample_rate,
                    channels,
                    sample_size,
                    ..
                } => (*sample_rate, *channels, *sample_size),
                _ => (44_100, 2, 16),
            };
            writeln!(
                s,
                "    <QualityLevel Index=\"{}\" FourCC=\"{}\" Bitrate=\"{}\" SamplingRate=\"{}\" \
                 Channels=\"{}\" BitsPerSample=\"{}\" PacketSize=\"4\" AudioTag=\"255\" \
                 CodecPrivateData=\"{}\" />",
                level.index,
                fourcc(level, "AACL"),
                level.bitrate,
                sample_rate,
                channels,
                bits,
                level.codec_private_data
            )?;
        }
        write_chunks(&mut s, first)?;
        writeln!(s, "  </StreamIndex>")?;
    }

    if let Some(protection) = &asset.protection {
        writeln!(s, "  <Protection>")?;
        writeln!(
            s,
            "    <ProtectionHeader SystemID=\"{}\">{}</ProtectionHeader>",
            PLAYREADY_SYSTEM_ID,
            protection.protection_header_base64()
        )?;
        writeln!(s, "  </Protection>")?;
    }

    writeln!(s, "</SmoothStreamingMedia>")?;
    Ok(s)
}

fn fourcc(level: &Level, fallback: &'static str) -> &'static str {
    match level.codec.fourcc() {
        "" => fallback,
        f => f,
    }
}

/// One `<c>` per fragment of the level's timeline
fn write_chunks(s: &mut String, level: &Level) -> Result<()> {
    for fragment in level.fragments()? {
        writeln!(s, "    <c d=\"{}\" />", fragment.duration)?;
    }
    Ok(())
}
