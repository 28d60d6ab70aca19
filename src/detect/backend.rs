use crate::detect::RawMarker;
use crate::extract::PixelBuffer;

/// Marker-detection backend trait.
///
/// The pipeline treats detection as a black box: a backend receives an
/// RGBA buffer and returns marker ids with ordered corner points. Corner
/// ordering is significant and must be preserved by implementations; it
/// determines the orientation sign downstream.
pub trait DetectionBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Optional warm-up hook, run once when the wrapping detector is
    /// initialized.
    fn warm_up(&mut self) {}

    /// Run detection on one frame. Implementations must treat the buffer
    /// as read-only and ephemeral.
    fn detect(&mut self, buffer: &PixelBuffer) -> Vec<RawMarker>;
}
