use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, ensure};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel data for the section-cap hatch pattern.
///
/// Shared between renderers via `Arc`; the backend keys its GPU texture on
/// `id`, so the last clone dropping releases the resource. Two images with
/// the same pixels are still distinct resources.
#[derive(Debug)]
pub struct HatchImage {
    id: u64,
    width: u32,
    height: u32,
    channels: u32,
    pixels: Vec<u8>,
}

impl HatchImage {
    pub fn new(width: u32, height: u32, channels: u32, pixels: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "hatch image has zero size");
        ensure!(
            (1..=4).contains(&channels),
            "hatch image has {channels} channels, expected 1..=4"
        );
        let expected = width as usize * height as usize * channels as usize;
        ensure!(
            pixels.len() == expected,
            "hatch image pixel buffer is {} bytes, expected {expected}",
            pixels.len()
        );
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self { id, width, height, channels, pixels })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl PartialEq for HatchImage {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HatchImage {}
