mod episode;
mod source;

pub use episode::{Episode, ExternalChapters, JumpPoint, JumpPointType, Playback};
pub use source::Source;
