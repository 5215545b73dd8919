//! Canvas state transitions: disposal handling, background restoration and
//! painting of decoded frame data, including interlaced traversal and
//! clipping against the canvas extent.

use crate::error::GifError;
use crate::frame::{Frame, Rect};
use crate::lzw::{Lzw, LzwStatus};

/// Saved canvas pixels for restore-previous disposal.
pub(crate) struct Snapshot {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Frame index whose decode took the snapshot.
    pub frame: u32,
}

/// Amount a frame dimension overhangs the canvas extent, capped to the
/// dimension itself.
pub(crate) fn clip(offset: u32, dim: u32, extent: u32) -> u32 {
    (offset + dim).saturating_sub(extent).min(dim)
}

const INTERLACE_PASSES: [(u32, u32); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Frame-local row indices in the order scanlines appear in the stream.
pub(crate) enum RowOrder {
    Sequential(std::ops::Range<u32>),
    Interlaced(InterlaceRows),
}

impl RowOrder {
    pub(crate) fn new(interlaced: bool, height: u32) -> RowOrder {
        if interlaced {
            RowOrder::Interlaced(InterlaceRows {
                height,
                pass: 0,
                y: 0,
            })
        } else {
            RowOrder::Sequential(0..height)
        }
    }
}

impl Iterator for RowOrder {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            RowOrder::Sequential(range) => range.next(),
            RowOrder::Interlaced(rows) => rows.next(),
        }
    }
}

/// The four interlace passes: offsets 0, 4, 2, 1 with strides 8, 8, 4, 2.
pub(crate) struct InterlaceRows {
    height: u32,
    pass: usize,
    y: u32,
}

impl Iterator for InterlaceRows {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.pass < INTERLACE_PASSES.len() {
            if self.y < self.height {
                let row = self.y;
                self.y += INTERLACE_PASSES[self.pass].1;
                return Some(row);
            }
            self.pass += 1;
            if self.pass < INTERLACE_PASSES.len() {
                self.y = INTERLACE_PASSES[self.pass].0;
            }
        }
        None
    }
}

/// Restore a region of the canvas ahead of painting the next frame.
///
/// With no frame given the whole canvas is cleared to transparent. With a
/// frame, its redraw rectangle is filled with the background color, or
/// with transparency when the frame itself carried any.
pub(crate) fn restore_bg(
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    frame: Option<&Frame>,
    bg_color: u32,
) {
    let Some(frame) = frame else {
        let size = (canvas_width * canvas_height) as usize * 4;
        canvas[..size].fill(0);
        return;
    };

    let rect = &frame.rect;
    if rect.x0 >= canvas_width || rect.y0 >= canvas_height {
        return;
    }
    let width = rect.width() - clip(rect.x0, rect.width(), canvas_width);
    let height = rect.height() - clip(rect.y0, rect.height(), canvas_height);
    if !frame.display || width == 0 {
        return;
    }

    for y in rect.y0..rect.y0 + height {
        let start = (y * canvas_width + rect.x0) as usize * 4;
        let row = &mut canvas[start..start + width as usize * 4];
        if frame.transparency.is_some() {
            row.fill(0);
        } else {
            for pixel in row.chunks_exact_mut(4) {
                pixel.copy_from_slice(&bg_color.to_le_bytes());
            }
        }
    }
}

/// Copy the snapshot back over the canvas, over the intersection of the two
/// extents.
pub(crate) fn recover_frame(
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    snapshot: &Snapshot,
) {
    let width = canvas_width.min(snapshot.width) as usize * 4;
    let height = canvas_height.min(snapshot.height);

    for y in 0..height as usize {
        let to = y * canvas_width as usize * 4;
        let from = y * snapshot.width as usize * 4;
        canvas[to..to + width].copy_from_slice(&snapshot.pixels[from..from + width]);
    }
}

/// Snapshot the canvas so a later restore-previous disposal can bring it
/// back. Re-recording for the same frame index is a no-op.
pub(crate) fn record_frame(
    store: &mut Option<Snapshot>,
    canvas: &[u8],
    canvas_width: u32,
    canvas_height: u32,
    frame: u32,
) {
    let size = (canvas_width * canvas_height) as usize * 4;
    match store {
        Some(snapshot) if snapshot.frame == frame => {}
        Some(snapshot) => {
            snapshot.pixels.clear();
            snapshot.pixels.extend_from_slice(&canvas[..size]);
            snapshot.width = canvas_width;
            snapshot.height = canvas_height;
            snapshot.frame = frame;
        }
        None => {
            *store = Some(Snapshot {
                pixels: canvas[..size].to_vec(),
                width: canvas_width,
                height: canvas_height,
                frame,
            });
        }
    }
}

/// Fast path: the frame spans the full canvas width at x offset zero and is
/// not interlaced, so mapped LZW output lands straight in the canvas.
pub(crate) fn decode_simple(
    lzw: &mut Lzw,
    src: &[u8],
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    offset_y: u32,
    height: u32,
) -> Result<(), GifError> {
    if offset_y >= canvas_height {
        return Ok(());
    }
    let height = height - clip(offset_y, height, canvas_height);
    if height == 0 {
        return Ok(());
    }

    let base = (offset_y * canvas_width) as usize * 4;
    let end = base + (height * canvas_width) as usize * 4;
    let mut at = base;
    while at < end {
        let (written, status) = lzw.decode_mapped(src, &mut canvas[at..end])?;
        at += written * 4;
        if status == LzwStatus::Done {
            break;
        }
    }
    Ok(())
}

/// General path: scalar LZW output translated pixel by pixel, covering
/// x offsets, interlacing and frames wider or taller than the canvas.
///
/// Pixels belonging to clipped regions are consumed without being written
/// so the decoded stream stays aligned with the scanline traversal.
pub(crate) fn decode_complex(
    lzw: &mut Lzw,
    src: &[u8],
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    rect: &Rect,
    interlaced: bool,
    transparency: Option<u8>,
    color_table: &[u32; 256],
) -> Result<(), GifError> {
    if rect.x0 >= canvas_width || rect.y0 >= canvas_height {
        return Ok(());
    }
    let frame_width = rect.width();
    let frame_height = rect.height();
    let clip_x = clip(rect.x0, frame_width, canvas_width);
    let usable = (frame_width - clip_x) as usize;
    if usable == 0 || frame_height == 0 {
        return Ok(());
    }
    let rows_in_canvas = canvas_height - rect.y0;

    'rows: for y in RowOrder::new(interlaced, frame_height) {
        if y >= rows_in_canvas {
            if !interlaced {
                // every remaining row is clipped; leave the stream alone
                break;
            }
            if !skip_pixels(lzw, src, frame_width as usize)? {
                break;
            }
            continue;
        }

        let mut at = ((rect.y0 + y) * canvas_width + rect.x0) as usize * 4;
        let mut remaining = usable;
        while remaining > 0 {
            if lzw.buffered().is_empty() {
                match lzw.decode(src)? {
                    LzwStatus::Ok => {}
                    LzwStatus::Done => break 'rows,
                }
            }
            let pending = lzw.buffered();
            let run = pending.len().min(remaining);
            for &index in &pending[..run] {
                if transparency != Some(index) {
                    canvas[at..at + 4].copy_from_slice(&color_table[index as usize].to_le_bytes());
                }
                at += 4;
            }
            lzw.consume(run);
            remaining -= run;
        }

        if !skip_pixels(lzw, src, clip_x as usize)? {
            break;
        }
    }
    Ok(())
}

/// Walk `count` decoded pixels forward without writing them.
fn skip_pixels(lzw: &mut Lzw, src: &[u8], mut count: usize) -> Result<bool, GifError> {
    while count > 0 {
        if lzw.buffered().is_empty() {
            match lzw.decode(src)? {
                LzwStatus::Ok => {}
                LzwStatus::Done => return Ok(false),
            }
        }
        let run = lzw.buffered().len().min(count);
        lzw.consume(run);
        count -= run;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(interlaced: bool, height: u32) -> Vec<u32> {
        RowOrder::new(interlaced, height).collect()
    }

    #[test]
    fn interlace_row_order() {
        assert_eq!(rows(true, 1), [0]);
        assert_eq!(rows(true, 4), [0, 2, 1, 3]);
        assert_eq!(rows(true, 8), [0, 4, 2, 6, 1, 3, 5, 7]);
        assert_eq!(rows(true, 10), [0, 8, 4, 2, 6, 1, 3, 5, 7, 9]);
    }

    #[test]
    fn sequential_row_order() {
        assert_eq!(rows(false, 3), [0, 1, 2]);
        assert!(rows(false, 0).is_empty());
    }

    #[test]
    fn clip_amounts() {
        assert_eq!(clip(0, 2, 4), 0);
        assert_eq!(clip(2, 2, 4), 0);
        assert_eq!(clip(3, 2, 4), 1);
        assert_eq!(clip(6, 2, 4), 2);
    }
}
