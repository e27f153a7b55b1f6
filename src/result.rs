use core::fmt::Debug;

/// Error type
#[derive(Debug)]
pub enum Error<E: Sized + Debug> {
    /// Measurement word failed checksum validation (computed, received)
    CrcMismatch(u8, u8),
    BusError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::BusError(e)
    }
}
