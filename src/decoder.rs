//! The decoder object: a two-pass parser over the GIF container format and
//! the public operations driving it.
//!
//! The first pass (scanning) walks the source to discover structure: the
//! header, logical screen descriptor, color tables and each frame's
//! extension chain, image descriptor and image data, recording where every
//! frame starts. The second pass (decoding) replays the parse from a stored
//! frame offset, this time extracting the local palette and feeding the
//! compressed image data through LZW into the client bitmap.

use log::{debug, warn};

use crate::bitmap::{Bitmap, BitmapAllocator};
use crate::compositor::{self, Snapshot};
use crate::error::GifError;
use crate::frame::{Disposal, Frame, Rect};
use crate::lzw::{Lzw, MAX_CODE_BITS};

/// Loop count of an animation that repeats forever.
pub const INFINITE: u32 = u32::MAX;

const TRAILER: u8 = 0x3b;
const IMAGE_SEPARATOR: u8 = 0x2c;
const EXT_INTRODUCER: u8 = 0x21;
const EXT_GRAPHIC_CONTROL: u8 = 0xf9;
const EXT_COMMENT: u8 = 0xfe;
const EXT_APPLICATION: u8 = 0xff;

const COLOR_TABLE_MASK: u8 = 0x80;
const COLOR_TABLE_SIZE_MASK: u8 = 0x07;
const INTERLACE_MASK: u8 = 0x40;
const TRANSPARENCY_MASK: u8 = 0x01;
const DISPOSAL_MASK: u8 = 0x1c;

const MAX_COLORS: usize = 256;

/// Safety clamp against junk data describing millions of frames.
const MAX_FRAMES: u32 = 4096;

/// Primed into entry 0 of the global color table so a later scan call can
/// tell whether the table has been built yet. Decoded entries always carry
/// an alpha byte of 0xff, and cleared ones 0x00, so this value cannot occur
/// naturally.
const COLOR_TABLE_UNBUILT: u32 = 0xaa00_0000;

/// Screen sizes some broken encoders write regardless of content: the
/// dimensions of the surface the image was designed on.
const SUSPECT_SCREEN_SIZES: [(u32, u32); 6] = [
    (640, 480),
    (640, 512),
    (800, 600),
    (1024, 768),
    (1280, 1024),
    (1600, 1200),
];

/// Animation-wide properties discovered by scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    /// Canvas width in pixels. May grow while the first frame is scanned.
    pub width: u32,
    /// Canvas height in pixels. May grow while the first frame is scanned.
    pub height: u32,
    /// Number of complete frames found so far.
    pub frame_count: u32,
    /// Times the animation is meant to play, or [`INFINITE`].
    pub loop_max: u32,
    /// Completed playthroughs so far.
    pub loop_count: u32,
}

/// What [`Decoder::frame_prepare`] decided to show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    /// Canvas area that must be redrawn for this step of the animation.
    pub area: Rect,
    /// Time to show the frame for, in centiseconds.
    pub delay_cs: u32,
    /// The frame to pass to [`Decoder::frame_decode`].
    pub frame: u32,
}

/// Which color table the current frame paints with.
enum ColorTableRef {
    Global,
    Local,
}

enum ScanState {
    /// A frame was completed and more data follows.
    Working,
    /// The trailer was reached.
    Complete,
}

/// Progressive decoder for a single GIF data stream.
pub struct Decoder<A: BitmapAllocator> {
    allocator: A,
    canvas: Option<A::Bitmap>,

    src: Vec<u8>,
    /// Scan cursor: the offset the next structural element starts at.
    pos: usize,

    info: Info,
    frames: Vec<Frame>,
    /// Count of frames whose header has been seen, complete or not.
    frame_count_partial: u32,
    /// Frame currently materialised in the canvas.
    decoded_frame: Option<u32>,
    /// Frame most recently handed out by [`Decoder::frame_prepare`].
    prepared_frame: Option<u32>,

    bg_index: u8,
    bg_color: u32,
    global_table_present: bool,
    global_table_entries: u32,
    global_color_table: Box<[u32; MAX_COLORS]>,
    local_color_table: Box<[u32; MAX_COLORS]>,
    color_table: ColorTableRef,

    prev_frame: Option<Snapshot>,
    lzw: Box<Lzw>,
}

impl<A: BitmapAllocator> Decoder<A> {
    /// Create an empty decoder. The canvas is not allocated until the first
    /// frame is decoded.
    pub fn new(allocator: A) -> Decoder<A> {
        Decoder {
            allocator,
            canvas: None,
            src: Vec::new(),
            pos: 0,
            info: Info {
                width: 0,
                height: 0,
                frame_count: 0,
                loop_max: 1,
                loop_count: 0,
            },
            frames: Vec::new(),
            frame_count_partial: 0,
            decoded_frame: None,
            prepared_frame: None,
            bg_index: 0,
            bg_color: 0,
            global_table_present: false,
            global_table_entries: 0,
            global_color_table: Box::new([0; MAX_COLORS]),
            local_color_table: Box::new([0; MAX_COLORS]),
            color_table: ColorTableRef::Global,
            prev_frame: None,
            lzw: Box::new(Lzw::new()),
        }
    }

    /// Animation-wide properties discovered so far.
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Number of frames whose header has been seen, including a trailing
    /// frame whose pixel data is still incomplete.
    pub fn frame_count_partial(&self) -> u32 {
        self.frame_count_partial
    }

    /// Scan the source data for frames.
    ///
    /// `data` is the whole stream seen so far: every call must pass a
    /// prefix-extension of the previous call's bytes. Returns
    /// [`GifError::EndOfData`] when the stream is cut short; appending more
    /// data and calling again resumes where scanning left off, keeping all
    /// previously discovered frames.
    pub fn data_scan(&mut self, data: &[u8]) -> Result<(), GifError> {
        if data.len() > self.src.len() {
            let seen = self.src.len();
            self.src.extend_from_slice(&data[seen..]);
        }

        if self.pos == 0 {
            let mut pos = 0;
            self.parse_header(&mut pos)?;
            self.parse_screen_descriptor(&mut pos)?;
            self.pos = pos;

            // Broken encoders write the size of the screen the GIF was
            // designed on rather than its content. Start those at 1x1 and
            // let the first frame grow the canvas to its real size.
            let (w, h) = (self.info.width, self.info.height);
            if SUSPECT_SCREEN_SIZES.contains(&(w, h)) || w == 0 || h == 0 || w > 2048 || h > 2048 {
                warn!("implausible screen size {w}x{h}, sizing from the first frame");
                self.info.width = 1;
                self.info.height = 1;
            }

            self.global_color_table[0] = COLOR_TABLE_UNBUILT;

            // a GIF of nothing but header, descriptor and trailer is legal
            if self.src.len() == self.pos + 1 && self.src[self.pos] == TRAILER {
                return Ok(());
            }
        }

        if self.global_color_table[0] == COLOR_TABLE_UNBUILT {
            if self.global_table_present {
                let entries = self.global_table_entries as usize;
                if self.pos + entries * 3 > self.src.len() {
                    return Err(GifError::EndOfData);
                }
                extract_color_table(&mut self.global_color_table, &self.src[self.pos..], entries);
                self.pos += entries * 3;
            } else {
                // default table: black, then white
                self.global_color_table[0] = u32::from_le_bytes([0x00, 0x00, 0x00, 0xff]);
                self.global_color_table[1] = u32::from_le_bytes([0xff, 0xff, 0xff, 0xff]);
            }

            self.bg_color = if self.global_table_present
                && (self.bg_index as u32) < self.global_table_entries
            {
                self.global_color_table[self.bg_index as usize]
            } else {
                self.global_color_table[0]
            };
        }

        loop {
            match self.scan_frame()? {
                ScanState::Working => {}
                ScanState::Complete => return Ok(()),
            }
        }
    }

    /// Work out which frame to show next.
    ///
    /// Steps through the animation timeline, wrapping back to frame 0 at the
    /// end of each playthrough, and fails with [`GifError::AnimationEnd`]
    /// once the loop budget is spent and the final frame is already showing.
    /// The returned redraw area covers the new frame, widened by the
    /// previous frame's rectangle when its disposal repaints that region.
    pub fn frame_prepare(&mut self) -> Result<Prepared, GifError> {
        if self.info.frame_count == 0 {
            return Err(GifError::FrameDisplay);
        }

        let mut next = self.prepared_frame.map_or(0, |f| f + 1);
        if next >= self.info.frame_count {
            if self.info.loop_max != INFINITE
                && self.info.loop_count.saturating_add(1) >= self.info.loop_max
            {
                return Err(GifError::AnimationEnd);
            }
            self.info.loop_count = self.info.loop_count.saturating_add(1);
            next = 0;
        }
        debug_assert!(self.frames[next as usize].display);

        let mut area = self.frames[next as usize].rect;
        if let Some(shown) = self.prepared_frame {
            let shown = &self.frames[shown as usize];
            if shown.forces_restore() {
                area = area.union(&shown.rect);
            }
        }

        self.prepared_frame = Some(next);
        Ok(Prepared {
            area,
            delay_cs: self.frames[next as usize].delay_cs,
            frame: next,
        })
    }

    /// Decode a frame into the canvas and return the client bitmap holding
    /// it.
    ///
    /// Frame-local data errors leave the partially painted pixels in place
    /// and report [`GifError::DataFrame`]; later frames remain decodable.
    pub fn frame_decode(&mut self, frame: u32) -> Result<&mut A::Bitmap, GifError> {
        if frame > self.frame_count_partial || frame as usize >= self.frames.len() {
            return Err(GifError::BadFrame);
        }
        if !self.frames[frame as usize].display {
            return Err(GifError::FrameDisplay);
        }

        if self.decoded_frame != Some(frame) {
            let mut pos = self.frames[frame as usize].offset;
            self.parse_frame_extensions(&mut pos, frame)?;
            self.parse_image_descriptor(&mut pos, frame, false)?;
            self.parse_color_table(&mut pos, frame, true)?;
            self.update_bitmap(pos, frame)?;
        }

        match self.canvas.as_mut() {
            Some(bitmap) => Ok(bitmap),
            None => Err(GifError::OutOfMemory),
        }
    }

    /// Rewind the animation so it can be played again without rescanning
    /// the source.
    pub fn reset(&mut self) {
        self.decoded_frame = None;
        self.prepared_frame = None;
        self.info.loop_count = 0;
    }

    // === pass 1: scanning ===

    fn parse_header(&mut self, pos: &mut usize) -> Result<(), GifError> {
        if *pos + 6 > self.src.len() {
            return Err(GifError::EndOfData);
        }
        if self.src[*pos..*pos + 3] != *b"GIF" {
            return Err(GifError::Data);
        }
        // the version tag ("87a"/"89a") is advisory; unknown ones decode too
        *pos += 6;
        Ok(())
    }

    /// Logical screen descriptor: canvas size, global color table shape,
    /// background index and aspect ratio.
    fn parse_screen_descriptor(&mut self, pos: &mut usize) -> Result<(), GifError> {
        if *pos + 7 > self.src.len() {
            return Err(GifError::EndOfData);
        }
        let data = &self.src[*pos..];

        self.info.width = u16::from_le_bytes([data[0], data[1]]) as u32;
        self.info.height = u16::from_le_bytes([data[2], data[3]]) as u32;
        self.global_table_present = data[4] & COLOR_TABLE_MASK != 0;
        self.global_table_entries = 2u32 << (data[4] & COLOR_TABLE_SIZE_MASK);
        self.bg_index = data[5];
        // data[6] is the pixel aspect ratio, which nothing uses
        self.info.loop_max = 1;

        *pos += 7;
        Ok(())
    }

    /// Scan one frame record at the cursor. Leaves the cursor untouched
    /// unless the frame's image data terminates within the source, so a
    /// truncated frame is re-parsed in full on the next scan.
    fn scan_frame(&mut self) -> Result<ScanState, GifError> {
        let idx = self.info.frame_count;

        if self.pos < self.src.len() && self.src[self.pos] == TRAILER {
            return Ok(ScanState::Complete);
        }
        if idx > MAX_FRAMES {
            return Err(GifError::FrameCount);
        }

        if self.frames.len() <= idx as usize {
            self.frames.push(Frame::new(self.pos));
        }

        let mut pos = self.frames[idx as usize].offset;
        self.parse_frame_extensions(&mut pos, idx)?;
        self.parse_image_descriptor(&mut pos, idx, true)?;
        self.parse_color_table(&mut pos, idx, false)?;
        self.scan_image_data(&mut pos, idx)
    }

    /// Walk the frame's extension chain, decoding graphic control and
    /// application extensions into decoder state and stepping over
    /// everything else (comments, plain text, unknown labels).
    fn parse_frame_extensions(&mut self, pos: &mut usize, idx: u32) -> Result<(), GifError> {
        let len = self.src.len();

        while *pos < len && self.src[*pos] == EXT_INTRODUCER {
            *pos += 1;
            if *pos >= len {
                return Err(GifError::EndOfData);
            }

            match self.src[*pos] {
                EXT_GRAPHIC_CONTROL => {
                    // label, block size, packed fields, two delay bytes,
                    // transparency index
                    if *pos + 6 > len {
                        return Err(GifError::EndOfData);
                    }
                    let data = &self.src[*pos..];
                    let frame = &mut self.frames[idx as usize];
                    frame.delay_cs = u16::from_le_bytes([data[3], data[4]]) as u32;
                    frame.transparency =
                        (data[2] & TRANSPARENCY_MASK != 0).then_some(data[5]);
                    frame.disposal = Disposal::from_packed((data[2] & DISPOSAL_MASK) >> 2);
                    *pos += 2 + data[1] as usize;
                }
                EXT_APPLICATION => {
                    // label, block size, 8-byte identifier, 3-byte
                    // authentication code, then sub-blocks
                    if *pos + 17 > len {
                        return Err(GifError::EndOfData);
                    }
                    let data = &self.src[*pos..];
                    if data[1] == 0x0b
                        && data[2..13] == *b"NETSCAPE2.0"
                        && data[13] == 0x03
                        && data[14] == 0x01
                    {
                        let loops = u16::from_le_bytes([data[15], data[16]]) as u32;
                        self.info.loop_max = if loops == 0 { INFINITE } else { loops };
                        debug!("loop count {loops}");
                    }
                    *pos += 2 + data[1] as usize;
                }
                EXT_COMMENT => {
                    // no size field; the data sub-blocks start right away
                    *pos += 1;
                }
                _ => {
                    // plain text and anything unknown: skip the label, the
                    // size byte and its payload
                    if *pos + 2 > len {
                        return Err(GifError::EndOfData);
                    }
                    *pos += 2 + self.src[*pos + 1] as usize;
                }
            }

            // step over the remaining data sub-blocks
            loop {
                if *pos >= len {
                    return Err(GifError::EndOfData);
                }
                let block = self.src[*pos] as usize;
                *pos += 1;
                if block == 0 {
                    break;
                }
                *pos += block;
            }
        }

        Ok(())
    }

    /// Image descriptor: the frame's placement rectangle and flags. While
    /// no frame has been committed yet, scanning lets the rectangle grow
    /// the canvas.
    fn parse_image_descriptor(
        &mut self,
        pos: &mut usize,
        idx: u32,
        scan: bool,
    ) -> Result<(), GifError> {
        if *pos + 10 > self.src.len() {
            return Err(GifError::EndOfData);
        }
        let data = &self.src[*pos..];
        if data[0] != IMAGE_SEPARATOR {
            return Err(GifError::DataFrame);
        }

        let x = u16::from_le_bytes([data[1], data[2]]) as u32;
        let y = u16::from_le_bytes([data[3], data[4]]) as u32;
        let w = u16::from_le_bytes([data[5], data[6]]) as u32;
        let h = u16::from_le_bytes([data[7], data[8]]) as u32;

        let frame = &mut self.frames[idx as usize];
        frame.flags = data[9];
        frame.rect = Rect {
            x0: x,
            y0: y,
            x1: x + w,
            y1: y + h,
        };

        if scan && self.info.frame_count == 0 {
            self.info.width = self.info.width.max(x + w);
            self.info.height = self.info.height.max(y + h);
        }

        *pos += 10;
        Ok(())
    }

    /// Select the frame's color table, extracting the local one into the
    /// decoder when asked to (the decode pass) and merely stepping over it
    /// otherwise.
    fn parse_color_table(
        &mut self,
        pos: &mut usize,
        idx: u32,
        decode: bool,
    ) -> Result<(), GifError> {
        let flags = self.frames[idx as usize].flags;
        if flags & COLOR_TABLE_MASK == 0 {
            self.color_table = ColorTableRef::Global;
            return Ok(());
        }

        let entries = 2usize << (flags & COLOR_TABLE_SIZE_MASK);
        if *pos + entries * 3 > self.src.len() {
            return Err(GifError::EndOfData);
        }
        if decode {
            extract_color_table(&mut self.local_color_table, &self.src[*pos..], entries);
        }
        *pos += entries * 3;
        self.color_table = ColorTableRef::Local;
        Ok(())
    }

    /// Walk the frame's image data without decoding it. The frame becomes
    /// displayable, and the scan cursor moves, once the sub-block chain
    /// terminates inside the available source.
    fn scan_image_data(&mut self, pos: &mut usize, idx: u32) -> Result<ScanState, GifError> {
        let len = self.src.len();
        self.frame_count_partial = idx + 1;

        let remaining = len - *pos;
        if remaining == 0 {
            return Err(GifError::EndOfData);
        }
        // a trailer here, or right after the minimum code size, is accepted
        // as an end of stream without image data
        if self.src[*pos] == TRAILER {
            return Ok(ScanState::Complete);
        }
        if remaining == 1 {
            return Err(GifError::EndOfData);
        }
        if remaining == 2 && self.src[*pos + 1] == TRAILER {
            return Ok(ScanState::Complete);
        }

        if self.src[*pos] >= MAX_CODE_BITS {
            return Err(GifError::Data);
        }

        let mut p = *pos + 1;
        loop {
            if p >= len {
                return Err(GifError::EndOfData);
            }
            let block = self.src[p] as usize;
            p += 1;
            if block == 0 {
                break;
            }
            if p + block > len {
                return Err(GifError::EndOfData);
            }
            p += block;
        }

        let frame = &mut self.frames[idx as usize];
        frame.display = true;
        self.info.frame_count = idx + 1;
        self.pos = p;
        debug!(
            "frame {idx}: rect {:?}, delay {} cs",
            frame.rect, frame.delay_cs
        );

        if p >= len {
            return Err(GifError::EndOfData);
        }
        if self.src[p] == TRAILER {
            return Ok(ScanState::Complete);
        }
        Ok(ScanState::Working)
    }

    // === pass 2: decoding ===

    /// Transition the canvas to showing frame `idx`: apply the previous
    /// frame's disposal, snapshot for restore-previous if needed, then
    /// paint the decoded image data.
    fn update_bitmap(&mut self, data_pos: usize, idx: u32) -> Result<(), GifError> {
        let minimum_code_size = self.src[data_pos];
        if minimum_code_size >= MAX_CODE_BITS {
            return Err(GifError::Data);
        }

        if self.canvas.is_none() {
            let bitmap = self
                .allocator
                .create(self.info.width, self.info.height)
                .ok_or(GifError::OutOfMemory)?;
            self.canvas = Some(bitmap);
        }

        let shown = self.decoded_frame;
        self.decoded_frame = Some(idx);

        let Self {
            canvas,
            src,
            frames,
            prev_frame,
            lzw,
            global_color_table,
            local_color_table,
            color_table,
            info,
            bg_color,
            ..
        } = self;

        let i = idx as usize;
        let bitmap = match canvas.as_mut() {
            Some(bitmap) => bitmap,
            None => return Err(GifError::OutOfMemory),
        };

        let ret = {
            let buf = bitmap.buffer();

            if idx == 0 || shown.is_none() {
                compositor::restore_bg(buf, info.width, info.height, None, *bg_color);
            } else {
                let prev = &frames[i - 1];
                match prev.disposal {
                    Disposal::RestoreBackground => {
                        compositor::restore_bg(buf, info.width, info.height, Some(prev), *bg_color);
                    }
                    Disposal::RestorePrevious => match prev_frame {
                        Some(snapshot) => {
                            compositor::recover_frame(buf, info.width, info.height, snapshot);
                        }
                        None => {
                            compositor::restore_bg(
                                buf,
                                info.width,
                                info.height,
                                Some(prev),
                                *bg_color,
                            );
                        }
                    },
                    _ => {}
                }
            }

            if frames[i].disposal == Disposal::RestorePrevious {
                compositor::record_frame(prev_frame, buf, info.width, info.height, idx);
            }

            let table = match color_table {
                ColorTableRef::Global => &**global_color_table,
                ColorTableRef::Local => &**local_color_table,
            };
            let rect = frames[i].rect;
            let interlaced = frames[i].flags & INTERLACE_MASK != 0;
            let transparency = frames[i].transparency;

            if !interlaced && rect.width() == info.width && rect.x0 == 0 {
                lzw.init_mapped(data_pos + 1, minimum_code_size, transparency, table);
                compositor::decode_simple(
                    lzw,
                    src,
                    buf,
                    info.width,
                    info.height,
                    rect.y0,
                    rect.height(),
                )
            } else {
                lzw.init(data_pos + 1, minimum_code_size);
                compositor::decode_complex(
                    lzw,
                    src,
                    buf,
                    info.width,
                    info.height,
                    &rect,
                    interlaced,
                    transparency,
                    table,
                )
            }
        };

        if let Err(err) = &ret {
            debug!("frame {idx}: decode stopped early: {err}");
        }

        bitmap.modified();

        if !frames[i].decoded {
            frames[i].opaque = bitmap.test_opaque();
            frames[i].decoded = true;
        }
        bitmap.set_opaque(frames[i].opaque);

        ret
    }
}

/// Unpack `entries` RGB triplets into 32-bit RGBA words with opaque alpha.
fn extract_color_table(table: &mut [u32; MAX_COLORS], data: &[u8], entries: usize) {
    for (entry, rgb) in table.iter_mut().zip(data.chunks_exact(3)).take(entries) {
        *entry = u32::from_le_bytes([rgb[0], rgb[1], rgb[2], 0xff]);
    }
}
