//! PlayReady protection header
//!
//! The header is a PlayReady Object: a small little-endian record wrapping one
//! UTF-16LE `WRMHEADER` v4.0.0.0 XML document, base64-encoded for manifests.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};

/// PlayReady DRM system id
pub const PLAYREADY_SYSTEM_ID: &str = "9a04f079-9840-4286-ab92-e65be0885f95";

const WRMHEADER_NS: &str = "http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader";

/// Record type of a rights management header
const RECORD_TYPE_RIGHTS_MANAGEMENT: u16 = 1;

/// A 128-bit key id, stored as its GUID string reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId([u8; 16]);

impl KeyId {
    /// Parse `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` (braces and dashes optional)
    pub fn parse(guid: &str) -> Result<Self> {
        let digits: String = guid
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .chars()
            .filter(|c| *c != '-')
            .collect();
        let bytes = hex::decode(&digits).map_err(|e| Error::Crypto(format!("key id {:?}: {}", guid, e)))?;
        let raw: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::Crypto(format!("key id {:?} is not 16 bytes", guid)))?;
        Ok(Self(raw))
    }

    /// Microsoft GUID byte order: the first three fields little-endian
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = self.0;
        out[0..4].reverse();
        out[4..6].reverse();
        out[6..8].reverse();
        out
    }
}

/// Content protection settings of one asset
#[derive(Debug, Clone)]
pub struct Protection {
    pub key_id: KeyId,
    pub content_key: [u8; 16],
    pub la_url: String,
}

impl Protection {
    /// Build from a GUID key id and a hex content key
    pub fn from_hex(key_id: &str, content_key: &str, la_url: impl Into<String>) -> Result<Self> {
        let key = hex::decode(content_key.trim())
            .map_err(|e| Error::Crypto(format!("content key: {}", e)))?;
        let content_key: [u8; 16] = key
            .try_into()
            .map_err(|_| Error::Crypto("content key is not 16 bytes".into()))?;
        Ok(Self {
            key_id: KeyId::parse(key_id)?,
            content_key,
            la_url: la_url.into(),
        })
    }

    /// First 8 bytes of the key id encrypted with the content key
    pub fn checksum(&self) -> [u8; 8] {
        let cipher = Aes128::new(&self.content_key.into());
        let mut block = aes::Block::from(self.key_id.to_le_bytes());
        cipher.encrypt_block(&mut block);
        let mut out = [0u8; 8];
        out.copy_from_slice(&block[..8]);
        out
    }

    /// The WRMHEADER document, on one line
    pub fn header_xml(&self) -> String {
        format!(
            "<WRMHEADER xmlns=\"{}\" version=\"4.0.0.0\"><DATA><PROTECTINFO>\
             <KEYLEN>16</KEYLEN><ALGID>AESCTR</ALGID></PROTECTINFO>\
             <KID>{}</KID><CHECKSUM>{}</CHECKSUM><LA_URL>{}</LA_URL>\
             </DATA></WRMHEADER>",
            WRMHEADER_NS,
            STANDARD.encode(self.key_id.to_le_bytes()),
            STANDARD.encode(self.checksum()),
            escape_xml(&self.la_url),
        )
    }

    /// PlayReady Object bytes
    pub fn protection_header(&self) -> Vec<u8> {
        let xml: Vec<u8> = self
            .header_xml()
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();

        let mut out = Vec::with_capacity(xml.len() + 10);
        out.extend_from_slice(&((xml.len() + 10) as u32).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&RECORD_TYPE_RIGHTS_MANAGEMENT.to_le_bytes());
        out.extend_from_slice(&(xml.len() as u16).to_le_bytes());
        out.extend_from_slice(&xml);
        out
    }

    /// Header as embedded in manifests
    pub fn protection_header_base64(&self) -> String {
        STANDARD.encode(self.protection_header())
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
