//! Contract between the decoder and the client's pixel storage.

/// A client-owned pixel buffer the decoder composites frames into.
///
/// The buffer holds `width * height * 4` bytes laid out as R, G, B, A in
/// ascending addresses. An all-zero pixel is treated as transparent; the
/// decoder only ever writes alpha bytes of 0x00 or 0xFF.
pub trait Bitmap {
    /// Mutable access to the raw pixel bytes.
    fn buffer(&mut self) -> &mut [u8];

    /// Told whether the frame now in the buffer can be plotted opaque.
    fn set_opaque(&mut self, _opaque: bool) {}

    /// Asked once per frame, after its first decode, whether every pixel
    /// ended up opaque. The answer is cached by the decoder.
    fn test_opaque(&mut self) -> bool {
        false
    }

    /// Called after the decoder has finished mutating the buffer.
    fn modified(&mut self) {}
}

/// Factory for [`Bitmap`]s, supplied by the client when the decoder is
/// created.
pub trait BitmapAllocator {
    type Bitmap: Bitmap;

    /// Allocate a zero-initialised bitmap of the given size, or `None` when
    /// the allocation cannot be satisfied.
    fn create(&mut self, width: u32, height: u32) -> Option<Self::Bitmap>;
}
