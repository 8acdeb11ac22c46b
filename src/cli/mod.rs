//! CLI command definitions and terminal output.
//!
//! Human-readable summaries go to stderr so stdout stays clean for the
//! token script or JSON output a CI job may capture.

pub mod args;

use std::io::Write;

use colored::Colorize;
use glfixture::issuer::IssueReport;
use glfixture::license::{ExpiryStatus, LicenseRecord};

/// Print the outcome of an `issue` run to stderr.
pub fn print_issue_summary(report: &IssueReport) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let record = &report.license;

    let key_note = if report.key_reused { "reused" } else { "generated" };
    let _ = writeln!(
        handle,
        "  {} License issued to {} ({} plan)",
        "✔".green().bold(),
        record.licensee_name().unwrap_or("<unnamed>").bold(),
        record.restrictions.plan,
    );
    let _ = writeln!(handle, "  {}          {}", "ID:".cyan(), record.restrictions.id);
    let _ = writeln!(
        handle,
        "  {}       {} → {}",
        "Valid:".cyan(),
        record.starts_at,
        record.expires_at,
    );
    let _ = writeln!(
        handle,
        "  {} {} ({key_note})",
        "Fingerprint:".cyan(),
        report.fingerprint.dimmed(),
    );
    let _ = writeln!(
        handle,
        "  {} {}",
        "Private key:".cyan(),
        report.paths.private_key.display(),
    );
    for path in &report.paths.public_keys {
        let _ = writeln!(handle, "  {}  {}", "Public key:".cyan(), path.display());
    }
    let _ = writeln!(
        handle,
        "  {}     {}",
        "License:".cyan(),
        report.paths.license.display(),
    );
    let _ = handle.flush();
}

/// Print a verified license and its expiry status to stderr.
pub fn print_verification(record: &LicenseRecord, status: ExpiryStatus) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    for (field, value) in &record.licensee {
        let _ = writeln!(handle, "  {}  {}", format!("{field}:").cyan(), value);
    }
    let _ = writeln!(handle, "  {}     {}", "Plan:".cyan(), record.restrictions.plan);
    let _ = writeln!(handle, "  {}       {}", "ID:".cyan(), record.restrictions.id);
    let _ = writeln!(handle, "  {}   {}", "Issued:".cyan(), record.starts_at);
    let _ = writeln!(handle, "  {}  {}", "Expires:".cyan(), record.expires_at);

    let status_text = match status {
        ExpiryStatus::Valid { days } => format!("valid, {days} day(s) left").green(),
        ExpiryStatus::ExpiringSoon { days } => format!("expires in {days} day(s)").yellow(),
        ExpiryStatus::NotYetValid { days } => format!("starts in {days} day(s)").yellow(),
        ExpiryStatus::Expired => "expired".red(),
    };
    let _ = writeln!(handle, "  {}   {}", "Status:".cyan(), status_text);
    let _ = handle.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use glfixture::issuer::OutputPaths;
    use glfixture::license::build_license_record;

    fn record() -> LicenseRecord {
        build_license_record(NaiveDate::from_ymd_opt(2022, 6, 1).unwrap())
    }

    #[test]
    fn print_issue_summary_does_not_panic() {
        let report = IssueReport {
            paths: OutputPaths::default(),
            key_reused: false,
            fingerprint: "ab".repeat(32),
            license: record(),
        };
        print_issue_summary(&report);
    }

    #[test]
    fn print_verification_handles_every_status() {
        let record = record();
        for status in [
            ExpiryStatus::Valid { days: 2 },
            ExpiryStatus::ExpiringSoon { days: 1 },
            ExpiryStatus::NotYetValid { days: 3 },
            ExpiryStatus::Expired,
        ] {
            print_verification(&record, status);
        }
    }
}
