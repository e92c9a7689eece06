//! Render a sticker preview from a local photo without printing it
//!
//! Usage: cargo run --example render_preview -- [PHOTO] [OUTPUT] [NAME] [ORDER_ID]
//!
//! Defaults: `me.jpg`, `dithered_preview.png`, `Rani`, `104`.
//! The preview goes through the same preprocess, dither and overlay steps
//! as the worker, on the default 384x384 canvas.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use sticker_print_worker::imaging::{self, CanvasSize};
use sticker_print_worker::models::job::PrintJob;
use sticker_print_worker::models::sticker::StickerText;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let photo = PathBuf::from(args.next().unwrap_or_else(|| "me.jpg".to_string()));
    let output = PathBuf::from(args.next().unwrap_or_else(|| "dithered_preview.png".to_string()));
    let name = args.next().unwrap_or_else(|| "Rani".to_string());
    let order_id = args.next().unwrap_or_else(|| "104".to_string());

    println!("# Sticker Preview\n");
    println!("Photo: {}", photo.display());

    let bytes = fs::read(&photo)
        .map_err(|e| format!("Failed to read {}: {e}", photo.display()))?;
    println!("Size: {} KB", bytes.len() / 1024);

    let mut job = PrintJob::new_pending(order_id, photo.to_string_lossy());
    job.customer_name = Some(name);
    let text = StickerText::for_job(&job, "Sticker Booth");
    println!("Headline: {}", text.headline);
    println!("Caption: {}", text.caption);

    let canvas = CanvasSize::default();
    let started = Instant::now();
    let sticker = imaging::render_sticker(&bytes, canvas, &text)?;
    imaging::write_png(&sticker, &output)?;

    println!(
        "\n✅ Wrote {}x{} preview to {} ({} ms)",
        sticker.width(),
        sticker.height(),
        output.display(),
        started.elapsed().as_millis()
    );
    Ok(())
}
