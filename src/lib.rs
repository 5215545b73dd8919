//! Progressive decoder for animated GIF images.
//!
//! Feed raw GIF87a/GIF89a bytes in with [`Decoder::data_scan`], as often as
//! needed while more of the stream arrives, then step through the animation
//! with [`Decoder::frame_prepare`] and [`Decoder::frame_decode`]. Frames are
//! composited into a client-supplied RGBA bitmap, honoring frame disposal,
//! transparency and interlacing; per-frame delays and the animation's loop
//! count are surfaced alongside.
//!
//! ```
//! use gifdec::{Bitmap, BitmapAllocator, Decoder};
//!
//! struct Canvas {
//!     pixels: Vec<u8>,
//! }
//!
//! impl Bitmap for Canvas {
//!     fn buffer(&mut self) -> &mut [u8] {
//!         &mut self.pixels
//!     }
//! }
//!
//! struct Alloc;
//!
//! impl BitmapAllocator for Alloc {
//!     type Bitmap = Canvas;
//!
//!     fn create(&mut self, width: u32, height: u32) -> Option<Canvas> {
//!         Some(Canvas {
//!             pixels: vec![0; (width * height * 4) as usize],
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<(), gifdec::GifError> {
//! // 2x2 image, one frame, black and white palette
//! let data = [
//!     0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x02, 0x00, 0x80, 0x01,
//!     0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x2c, 0x00, 0x00, 0x00, 0x00,
//!     0x02, 0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x0c, 0x10, 0x05, 0x00, 0x3b,
//! ];
//!
//! let mut decoder = Decoder::new(Alloc);
//! decoder.data_scan(&data)?;
//! assert_eq!(decoder.info().frame_count, 1);
//!
//! let prepared = decoder.frame_prepare()?;
//! let _bitmap = decoder.frame_decode(prepared.frame)?;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
mod compositor;
pub mod decoder;
pub mod error;
pub mod frame;
mod lzw;

pub use bitmap::{Bitmap, BitmapAllocator};
pub use decoder::{Decoder, Info, Prepared, INFINITE};
pub use error::GifError;
pub use frame::{Disposal, Rect};
