//! Streams: one deliverable rendition of a program

use crate::stats::Metrics;

use super::pipeline::Pipeline;

/// Container/codec family of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    OggTheoraVorbis,
    Webm,
    TsBaseline,
    TsMain,
    Flv,
}

impl StreamType {
    pub const ALL: [StreamType; 5] = [
        StreamType::OggTheoraVorbis,
        StreamType::Webm,
        StreamType::TsBaseline,
        StreamType::TsMain,
        StreamType::Flv,
    ];

    pub fn content_type(&self) -> &'static str {
        match self {
            StreamType::OggTheoraVorbis => "video/ogg",
            StreamType::Webm => "video/webm",
            StreamType::TsBaseline | StreamType::TsMain => "video/mp2t",
            StreamType::Flv => "video/x-flv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            StreamType::OggTheoraVorbis => "ogv",
            StreamType::Webm => "webm",
            StreamType::TsBaseline | StreamType::TsMain => "ts",
            StreamType::Flv => "flv",
        }
    }

    /// Suffix distinguishing types that share an extension
    pub fn modifier(&self) -> &'static str {
        match self {
            StreamType::TsMain => "-main",
            _ => "",
        }
    }

    /// Identifier used in `.list` files
    pub fn type_id(&self) -> &'static str {
        match self {
            StreamType::OggTheoraVorbis => "ogg",
            StreamType::Webm => "webm",
            StreamType::TsBaseline => "mpeg-ts",
            StreamType::TsMain => "mpeg-ts-main",
            StreamType::Flv => "flv",
        }
    }

    pub fn from_type_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_id() == id)
    }

    /// Type of an ingest body; anything unrecognised is Ogg
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime {
            "video/webm" => StreamType::Webm,
            "video/mp2t" => StreamType::TsBaseline,
            "video/x-flv" => StreamType::Flv,
            _ => StreamType::OggTheoraVorbis,
        }
    }
}

/// One rendition of a program, bound to a fan-out sink while running
pub struct Stream {
    pub index: usize,
    pub stream_type: StreamType,
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bitrate: u64,
    /// Resource path of the raw stream, e.g. `/news-640x360-600kbps.webm`
    pub location: String,
    /// Resource path of the playlist
    pub playlist: String,
    /// Upstream URL for follow programs
    pub follow_uri: Option<String>,
    /// Exclusively owned; present while the program runs
    pub pipeline: Option<Box<dyn Pipeline>>,
    /// Pipeline reported it is playing
    pub playing: bool,
    pub metrics: Metrics,
}

impl Stream {
    pub fn new(
        program: &str,
        index: usize,
        stream_type: StreamType,
        width: u32,
        height: u32,
        bitrate: u64,
    ) -> Self {
        let base = format!(
            "{}-{}x{}-{}kbps{}",
            program,
            width,
            height,
            bitrate / 1000,
            stream_type.modifier()
        );
        Self {
            index,
            stream_type,
            width,
            height,
            bitrate,
            location: format!("/{}.{}", base, stream_type.extension()),
            playlist: format!("/{}-{}.m3u8", base, stream_type.extension()),
            follow_uri: None,
            pipeline: None,
            playing: false,
            metrics: Metrics::new(),
        }
    }

    pub fn following(mut self, uri: impl Into<String>) -> Self {
        self.follow_uri = Some(uri.into());
        self
    }

    /// Stream name without the leading slash
    pub fn name(&self) -> &str {
        self.location.trim_start_matches('/')
    }

    /// Release the pipeline, if any
    pub fn shutdown(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(super::pipeline::PipelineState::Null) {
                tracing::debug!(stream = %self.location, error = %e, "Pipeline shutdown failed");
            }
            pipeline.sink().clear();
        }
        self.playing = false;
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("index", &self.index)
            .field("stream_type", &self.stream_type)
            .field("location", &self.location)
            .field("bitrate", &self.bitrate)
            .field("playing", &self.playing)
            .finish()
    }
}
