pub mod job;
pub mod sticker;
