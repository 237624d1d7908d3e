//! Terminal output: styled messages, summary tables and a progress bar that
//! follows engine events.

use crate::events::{Event, EventBus, SubscriptionId};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;

const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Consistent styling for everything the CLI prints.
pub struct OutputFormatter;

impl OutputFormatter {
    /// ```no_run
    /// use refile::output::OutputFormatter;
    /// OutputFormatter::success("Organized 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Goes to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints per-folder file counts followed by a total row.
    ///
    /// ```no_run
    /// use refile::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let counts = BTreeMap::from([("Images".to_string(), 8), ("Documents".to_string(), 15)]);
    /// OutputFormatter::summary_table("Folder", &counts);
    /// ```
    pub fn summary_table(label: &str, counts: &BTreeMap<String, usize>) {
        Self::header("SUMMARY");

        let width = counts
            .keys()
            .map(String::len)
            .chain([label.len(), "Total".len()])
            .max()
            .unwrap_or(0);
        let rule = "-".repeat(width + 10);

        println!("{:<width$} | {}", label.bold(), "Files".bold(), width = width);
        println!("{}", rule);
        for (name, count) in counts {
            println!(
                "{:<width$} | {} {}",
                name,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }
        println!("{}", rule);

        let total: usize = counts.values().sum();
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            plural(total),
            width = width
        );
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Progress bar driven by `*_progress` events until the matching
/// `*_completed` event arrives.
pub struct ProgressReporter {
    bus: Arc<EventBus>,
    bar: ProgressBar,
    subscription: SubscriptionId,
}

impl ProgressReporter {
    pub fn attach(bus: Arc<EventBus>) -> Self {
        let bar = OutputFormatter::create_progress_bar(0);
        let handle = bar.clone();
        let subscription = bus.subscribe(move |event| match event {
            Event::OrganizationProgress {
                processed,
                total,
                file_name,
                ..
            }
            | Event::UnorganizeProgress {
                processed,
                total,
                file_name,
                ..
            } => {
                handle.set_length(*total as u64);
                handle.set_position(*processed as u64);
                handle.set_message(file_name.clone());
            }
            Event::OrganizationCompleted { .. } | Event::UnorganizeCompleted { .. } => {
                handle.finish_and_clear();
            }
            _ => {}
        });
        Self {
            bus,
            bar,
            subscription,
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn detach(self) {
        self.bus.unsubscribe(self.subscription);
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
