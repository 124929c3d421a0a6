//! Plain-text rendering of filter results and validation reports for the CLI.

use std::fmt::Write;

use chrono::NaiveDate;

use crate::adapters::persistence::OcrCache;
use crate::domain::reports::BorderCheck;
use crate::domain::{Message, ValidationReport, ValidationStatus};

/// Messages grouped under `==== YYYY-MM-DD (Weekday) ====` headers.
///
/// With an OCR cache, media messages get a preview line of their recognised text.
pub fn render_messages(messages: &[Message], channel: &str, ocr: Option<&OcrCache>) -> String {
    let mut out = String::new();
    if messages.is_empty() {
        out.push_str("📭 No messages found\n");
        return out;
    }

    let mut current_date: Option<&str> = None;
    for msg in messages {
        let day = msg.date_msk.split(' ').next().unwrap_or("");
        if current_date != Some(day) {
            current_date = Some(day);
            let weekday = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(|d| d.format("%A").to_string())
                .unwrap_or_default();
            let _ = writeln!(out, "\n==== {} ({}) ====", day, weekday);
        }

        let _ = writeln!(out, "[{}] {}: {}", msg.local_time_str(), msg.sender, msg.text);
        if let Some(views) = msg.views.filter(|v| *v > 0) {
            let _ = writeln!(out, "    👁️ {} views", views);
        }
        if let Some(reply) = msg.reply_to_id {
            let _ = writeln!(out, "    ↪️ Reply to message {}", reply);
        }
        if msg.media_info.is_some() {
            if let Some(text) = ocr.and_then(|c| c.preview(channel, msg.id)) {
                let _ = writeln!(out, "    📝 OCR: {}", text);
            }
        }
    }
    let _ = writeln!(out, "\n📊 Total: {} messages", messages.len());
    out
}

pub fn render_border(check: &BorderCheck) -> String {
    match check {
        BorderCheck::Confirmed { checked } => {
            format!("✅ Border confirmed: {} older messages belong to earlier dates", checked)
        }
        BorderCheck::Failed { issues, checked } => format!(
            "⚠️ Border check failed: {} of {} older messages still on the target date ({:?})",
            issues.len(),
            checked,
            issues
        ),
        BorderCheck::Incomplete { available } => format!(
            "⚠️ Border incomplete: only {} older messages cached, fetch more to confirm",
            available
        ),
        BorderCheck::Skipped => "Border check skipped".to_string(),
    }
}

fn status_label(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Verified => "✅ VERIFIED",
        ValidationStatus::Unverified => "❌ UNVERIFIED",
        ValidationStatus::ExpansionRequired => "🔄 EXPANSION REQUIRED",
        ValidationStatus::Insufficient => "⚠️ INSUFFICIENT DATA",
    }
}

/// One status line, then gaps and discrepancies as bullets.
pub fn render_validation(title: &str, report: &ValidationReport) -> String {
    let mut out = format!(
        "{}: {} (confidence {:.0}%)\n",
        title,
        status_label(report.status),
        report.confidence_score * 100.0
    );
    for gap in &report.gaps {
        let _ = writeln!(
            out,
            "  - gap of {} between {} and {} ({:?})",
            gap.gap_size, gap.start_id, gap.end_id, gap.kind
        );
    }
    for d in &report.discrepancies {
        let _ = writeln!(out, "  - {}", d);
    }
    out
}
