use super::ui;
use crate::core::rate::StoredRate;
use crate::update::{CycleOutcome, CycleReport, SkipReason};
use comfy_table::Cell;

pub fn display_rates(rates: &[StoredRate]) -> String {
    if rates.is_empty() {
        return ui::style_text("No rates stored yet", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Currency"),
        ui::header_cell("Buying"),
        ui::header_cell("Selling"),
        ui::header_cell("Recorded"),
    ]);

    for rate in rates {
        table.add_row(vec![
            Cell::new(rate.id),
            Cell::new(&rate.currency),
            ui::quote_cell(rate.buying),
            ui::quote_cell(rate.selling),
            Cell::new(rate.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }

    table.to_string()
}

pub fn display_report(report: &CycleReport) -> String {
    let status = match &report.outcome {
        CycleOutcome::Completed => ui::style_text("completed", ui::StyleType::Success),
        CycleOutcome::Failed { error } => {
            ui::style_text(&format!("failed: {error}"), ui::StyleType::Error)
        }
        CycleOutcome::Skipped { reason } => {
            let reason = match reason {
                SkipReason::AlreadyRunning => "an update is already running",
                SkipReason::AlreadyUpdatedToday => "already updated today",
            };
            ui::style_text(&format!("skipped: {reason}"), ui::StyleType::Warning)
        }
    };

    let mut output = format!(
        "{}\n\nStatus: {}\n",
        ui::style_text("Rate update", ui::StyleType::Title),
        status
    );

    if let Some(document) = &report.document {
        let modified = document
            .last_modified
            .map_or("unknown".to_string(), |m| m.to_rfc2822());
        output.push_str(&format!(
            "Document: {} ({} bytes, last modified {}{})\n",
            document.path.display(),
            document.bytes_written,
            modified,
            if document.is_new_for_today {
                ", new today"
            } else {
                ""
            }
        ));
    }

    output.push_str(&format!(
        "Extracted: {}  Stored: {}  Persist failures: {}  Malformed: {}",
        report.extracted, report.stored, report.persist_failures, report.malformed
    ));
    output
}

/// A failed cycle is an error for the one-shot `update` command.
pub fn report_result(report: &CycleReport) -> anyhow::Result<()> {
    match &report.outcome {
        CycleOutcome::Failed { error } => anyhow::bail!("Rate update failed: {error}"),
        _ => Ok(()),
    }
}
