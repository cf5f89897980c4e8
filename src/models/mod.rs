pub mod frame;
pub mod point;
pub mod result;
pub mod session;

pub use frame::{CHANNELS, Frame, PixelRect, Region};
pub use point::Point;
pub use result::{CandidateGeometry, DecodeCandidate, DecodeResult, ScanEvent, ScanStatus};
pub use session::{ScanSession, ScanState};
