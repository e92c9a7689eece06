pub mod feed;
pub mod listener;
pub mod pipeline;
pub mod printer;
pub mod reaper;
pub mod reconciler;
pub mod storage;
