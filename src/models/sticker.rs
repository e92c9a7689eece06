use chrono::Local;

use crate::models::job::PrintJob;

/// Number of order-id characters shown on the sticker.
const ORDER_ID_CHARS: usize = 4;

/// The two text lines printed in the sticker's footer band.
#[derive(Debug, Clone, PartialEq)]
pub struct StickerText {
    /// Bold line: order identifier.
    pub headline: String,
    /// Monospaced line: customer name (or booth caption) and order time.
    pub caption: String,
}

impl StickerText {
    pub fn new(headline: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            caption: caption.into(),
        }
    }

    /// Build the footer text for a job. `fallback_caption` is used when the
    /// job carries no customer name.
    pub fn for_job(job: &PrintJob, fallback_caption: &str) -> Self {
        let short_id: String = job.order_id.trim().chars().take(ORDER_ID_CHARS).collect();
        let who = job
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback_caption);
        let time = job.created_at.with_timezone(&Local).format("%H:%M");

        Self {
            headline: format!("Order #{short_id}"),
            caption: format!("{who} • {time}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_truncates_order_id() {
        let job = PrintJob::new_pending("10423377", "selfies/a.jpg");
        let text = StickerText::for_job(&job, "Sticker Booth");
        assert_eq!(text.headline, "Order #1042");
    }

    #[test]
    fn test_short_order_id_kept_whole() {
        let job = PrintJob::new_pending("7", "selfies/a.jpg");
        let text = StickerText::for_job(&job, "Sticker Booth");
        assert_eq!(text.headline, "Order #7");
    }

    #[test]
    fn test_caption_prefers_customer_name() {
        let mut job = PrintJob::new_pending("1042", "selfies/a.jpg");
        job.customer_name = Some("Rani".to_string());
        let text = StickerText::for_job(&job, "Sticker Booth");
        assert!(text.caption.starts_with("Rani • "));

        job.customer_name = Some("   ".to_string());
        let text = StickerText::for_job(&job, "Sticker Booth");
        assert!(text.caption.starts_with("Sticker Booth • "));
    }

    #[test]
    fn test_caption_time_is_hours_and_minutes() {
        let job = PrintJob::new_pending("1042", "selfies/a.jpg");
        let text = StickerText::for_job(&job, "Booth");
        let time = text.caption.rsplit(' ').next().unwrap();
        assert_eq!(time.len(), 5);
        assert_eq!(&time[2..3], ":");
    }
}
