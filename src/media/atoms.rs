//! ISOBMFF box types and headers

/// Four-character box type code
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const NMHD: Self = Self(*b"nmhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const URL: Self = Self(*b"url ");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MFRA: Self = Self(*b"mfra");
    pub const UUID: Self = Self(*b"uuid");
    pub const AVC1: Self = Self(*b"avc1");
    pub const AVC3: Self = Self(*b"avc3");
    pub const AVCC: Self = Self(*b"avcC");
    pub const MP4A: Self = Self(*b"mp4a");
    pub const ESDS: Self = Self(*b"esds");
    pub const ENCV: Self = Self(*b"encv");
    pub const ENCA: Self = Self(*b"enca");

    /// The code as text, `????` when not ASCII
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoxType({})", self.as_str())
    }
}

/// Handler types carried in `hdlr`
pub mod handler {
    pub const VIDEO: [u8; 4] = *b"vide";
    pub const AUDIO: [u8; 4] = *b"soun";
}

/// Extended types of the `uuid` boxes the engine understands
pub mod uuid {
    /// Smooth Streaming track fragment extended header (absolute time)
    pub const TFXD: [u8; 16] = [
        0x6d, 0x1d, 0x9b, 0x05, 0x42, 0xd5, 0x44, 0xe6, 0x80, 0xe2, 0x14, 0x1d, 0xaf, 0xf7, 0x57,
        0xb2,
    ];

    /// PIFF sample encryption box
    pub const PIFF_SENC: [u8; 16] = [
        0xa2, 0x39, 0x4f, 0x52, 0x5a, 0x9b, 0x4f, 0x14, 0xa2, 0x44, 0x6c, 0x42, 0x7c, 0x64, 0x8d,
        0xf4,
    ];
}

/// Position of a box inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// File offset of the first header byte
    pub offset: u64,
    /// Size including the header
    pub size: u64,
    /// 8, or 16 with a 64-bit size
    pub header_size: u8,
}

impl BoxHeader {
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_type_display() {
        assert_eq!(BoxType::MOOF.to_string(), "moof");
        assert_eq!(BoxType::URL.as_str(), "url ");
        assert_eq!(BoxType([0xff, 0, 0, 0]).as_str(), "????");
    }

    #[test]
    fn test_header_geometry() {
        let header = BoxHeader {
            box_type: BoxType::MDAT,
            offset: 100,
            size: 1016,
            header_size: 16,
        };
        assert_eq!(header.data_offset(), 116);
        assert_eq!(header.data_size(), 1000);
        assert_eq!(header.end(), 1116);
    }
}
