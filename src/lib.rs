//! Sticker Print Worker
//!
//! Listens for new rows in the `print_queue` table, turns each referenced
//! customer photo into a 1-bit sticker (contrast-stretched, Floyd–Steinberg
//! dithered, framed and captioned) and sends it to the label printer,
//! recording the outcome back on the job.

pub mod app_state;
pub mod config;
pub mod db;
pub mod imaging;
pub mod models;
pub mod routes;
pub mod services;
