use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::ports::{Artifact, ChartRenderer, ChartRequest, RenderError};
use crate::types::schedule::{SLOTS_PER_DAY, SlotStatus, slot_index};
use crate::types::subscriber::DisplayMode;

const CELL_WIDTH: u32 = 12;
const STRIP_HEIGHT: u32 = 36;
const BANNER_HEIGHT: u32 = 4;

const ON: Rgb<u8> = Rgb([76, 175, 80]);
const OFF: Rgb<u8> = Rgb([38, 38, 38]);
const POSSIBLE: Rgb<u8> = Rgb([255, 193, 7]);
const UNKNOWN: Rgb<u8> = Rgb([189, 189, 189]);
const EMERGENCY: Rgb<u8> = Rgb([211, 47, 47]);
const MARKER: Rgb<u8> = Rgb([33, 150, 243]);
const HOUR_TICK: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws each visible day as a 48-cell colour strip.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngStripRenderer;

impl ChartRenderer for PngStripRenderer {
    fn render(&self, request: &ChartRequest) -> Result<Vec<Artifact>, RenderError> {
        match request.mode {
            DisplayMode::Dynamic => {
                let current = request
                    .marker
                    .map_or(0, |at| slot_index(at.hour(), at.minute()));
                let tomorrow = request.tomorrow.unwrap_or_default();
                let slots: Vec<SlotStatus> = request.today.slots()[current..]
                    .iter()
                    .chain(tomorrow.slots()[..current].iter())
                    .copied()
                    .collect();
                let marker = request.marker.map(|at| u32::from(at.minute() % 30) * CELL_WIDTH / 30);
                Ok(vec![artifact(
                    format!("{}-24h.png", request.queue_label),
                    strip(&slots, request.emergency, marker)?,
                )])
            }
            DisplayMode::Classic | DisplayMode::List => {
                let mut artifacts = vec![artifact(
                    format!("{}-today.png", request.queue_label),
                    strip(request.today.slots(), request.emergency, None)?,
                )];
                if let Some(tomorrow) = &request.tomorrow {
                    artifacts.push(artifact(
                        format!("{}-tomorrow.png", request.queue_label),
                        strip(tomorrow.slots(), request.emergency, None)?,
                    ));
                }
                Ok(artifacts)
            }
        }
    }
}

fn artifact(name: String, bytes: Vec<u8>) -> Artifact {
    Artifact {
        name,
        content_type: "image/png",
        bytes: Arc::from(bytes),
    }
}

/// `marker` is a pixel offset into the first cell.
fn strip(slots: &[SlotStatus], emergency: bool, marker: Option<u32>) -> Result<Vec<u8>, RenderError> {
    let width = CELL_WIDTH * SLOTS_PER_DAY as u32;
    let height = STRIP_HEIGHT + BANNER_HEIGHT;
    let banner = if emergency { EMERGENCY } else { UNKNOWN };
    let mut image = RgbImage::from_pixel(width, height, banner);

    for (index, status) in slots.iter().take(SLOTS_PER_DAY).enumerate() {
        let colour = match status {
            SlotStatus::On => ON,
            SlotStatus::Off => OFF,
            SlotStatus::Possible => POSSIBLE,
            SlotStatus::Unknown => UNKNOWN,
        };
        let left = index as u32 * CELL_WIDTH;
        for x in left..left + CELL_WIDTH {
            for y in BANNER_HEIGHT..height {
                image.put_pixel(x, y, colour);
            }
        }
    }
    for tick in (0..width).step_by((CELL_WIDTH * 2) as usize) {
        for y in height - 4..height {
            image.put_pixel(tick, y, HOUR_TICK);
        }
    }
    if let Some(offset) = marker {
        let x = offset.min(CELL_WIDTH - 1);
        for y in 0..height {
            image.put_pixel(x, y, MARKER);
        }
    }

    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|err| RenderError::Encode(err.to_string()))?;
    Ok(bytes)
}
