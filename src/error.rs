use thiserror::Error;

/// Result codes for the public decoder operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GifError {
    #[error("Out of memory")]
    OutOfMemory,

    /// The source data is invalid and no frames are recoverable.
    #[error("GIF source data is invalid")]
    Data,

    #[error("Frame number is not valid")]
    BadFrame,

    /// The source data contained an error local to one frame.
    #[error("GIF source data contained an error in a frame")]
    DataFrame,

    #[error("Too many frames")]
    FrameCount,

    /// The source data ended before one complete frame was available. The
    /// caller may append more data and retry.
    #[error("GIF source data ended without one complete frame available")]
    EndOfData,

    #[error("GIF source data ended with an incomplete frame")]
    EndOfFrame,

    #[error("Frame can't be displayed")]
    FrameDisplay,

    /// The animation has played out its loop budget; call
    /// [`Decoder::reset`](crate::Decoder::reset) to replay it.
    #[error("Animation complete")]
    AnimationEnd,
}

/// Errors raised by the LZW stream decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum LzwError {
    /// Ran out of compressed bytes in the middle of a code. Retryable once
    /// more source data has been appended.
    #[error("out of compressed data mid-code")]
    NoData,

    /// The first code after a clear does not fit the dictionary.
    #[error("invalid initial LZW code")]
    BadInitialCode,

    /// Decoding was continued past the end-of-information code.
    #[error("decode continued past end-of-information")]
    UnexpectedEoi,

    /// A code beyond the next assignable dictionary slot.
    #[error("LZW code out of range")]
    BadCode,
}

impl From<LzwError> for GifError {
    fn from(err: LzwError) -> GifError {
        match err {
            LzwError::NoData => GifError::EndOfData,
            LzwError::BadInitialCode | LzwError::UnexpectedEoi | LzwError::BadCode => {
                GifError::DataFrame
            }
        }
    }
}
