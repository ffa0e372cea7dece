//! # Playable Handles
//!
//! A [`PlayableHandle`] is the only thing the cache hands to a media player.
//! Building one probes the container structure of the payload, so a handle
//! that exists is known to hold decodable media. Downloads are turned into
//! handles before they are written to the cache.

use bytes::Bytes;
use std::fmt;
use tracing::debug;

use crate::utils::{FeedError, Result};

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const TS_PACKET_SIZE: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;
const TS_PACKETS_TO_CHECK: usize = 5;

/// Container formats the feed player can open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// ISO base media file (MP4 / MOV)
    Mp4,
    /// Matroska / WebM
    Matroska,
    /// MPEG transport stream
    MpegTs,
}

/// Validated media bytes ready for a native player
#[derive(Clone)]
pub struct PlayableHandle {
    data: Bytes,
    format: MediaFormat,
}

impl PlayableHandle {
    /// Probe `data` and wrap it. Fails with a validation error if the bytes
    /// are not a recognizable, structurally sound container.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let format = FormatDetector::detect(&data)?;
        debug!("Validated {} byte {:?} payload", data.len(), format);
        Ok(Self { data, format })
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl fmt::Debug for PlayableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayableHandle")
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Container sniffing
pub struct FormatDetector;

impl FormatDetector {
    pub fn detect(data: &[u8]) -> Result<MediaFormat> {
        if data.is_empty() {
            return Err(FeedError::Validation("empty payload".to_string()));
        }

        if data.len() >= 8 && &data[4..8] == b"ftyp" {
            Self::validate_mp4(data)?;
            return Ok(MediaFormat::Mp4);
        }

        if data.starts_with(&EBML_MAGIC) {
            return Ok(MediaFormat::Matroska);
        }

        if data[0] == TS_SYNC_BYTE && data.len() >= TS_PACKET_SIZE {
            Self::validate_mpeg_ts(data)?;
            return Ok(MediaFormat::MpegTs);
        }

        Err(FeedError::Validation(
            "payload is not a recognized video container".to_string(),
        ))
    }

    /// Walk the top-level box chain. Every box must fit in the buffer and a
    /// `moov` box must be present.
    fn validate_mp4(data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        let mut has_moov = false;

        while offset < data.len() {
            let remaining = data.len() - offset;
            if remaining < 8 {
                return Err(FeedError::Validation(format!(
                    "truncated mp4 box header at offset {offset}"
                )));
            }

            let header = &data[offset..offset + 8];
            let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let box_type = &header[4..8];

            let box_size = match size32 {
                0 => remaining as u64, // box extends to end of data
                1 => {
                    if remaining < 16 {
                        return Err(FeedError::Validation(
                            "truncated mp4 large box header".to_string(),
                        ));
                    }
                    let mut large = [0u8; 8];
                    large.copy_from_slice(&data[offset + 8..offset + 16]);
                    u64::from_be_bytes(large)
                }
                size => size,
            };

            if box_size < 8 || box_size > remaining as u64 {
                return Err(FeedError::Validation(format!(
                    "corrupt mp4 box {:?} of size {} at offset {}",
                    String::from_utf8_lossy(box_type),
                    box_size,
                    offset
                )));
            }

            if box_type == b"moov" {
                has_moov = true;
            }
            offset += box_size as usize;
        }

        if !has_moov {
            return Err(FeedError::Validation("mp4 payload has no moov box".to_string()));
        }
        Ok(())
    }

    fn validate_mpeg_ts(data: &[u8]) -> Result<()> {
        let packets = (data.len() / TS_PACKET_SIZE).min(TS_PACKETS_TO_CHECK);
        for packet in 0..packets {
            if data[packet * TS_PACKET_SIZE] != TS_SYNC_BYTE {
                return Err(FeedError::Validation(format!(
                    "lost transport stream sync at packet {packet}"
                )));
            }
        }
        Ok(())
    }
}
