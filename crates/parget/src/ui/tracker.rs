use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use parget_fetch::ProgressSink;

const PB_STYLE: &str = "{prefix:.bold} {spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<ProgressStyle> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
});

/// One progress bar per range, prefixed `Part <i> <p>%`.
pub struct BarSink {
    multi: MultiProgress,
    bars: HashMap<u32, ProgressBar>,
}

impl BarSink {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: HashMap::new(),
        }
    }

    fn bar(&mut self, index: u32) -> &ProgressBar {
        let multi = &self.multi;
        self.bars.entry(index).or_insert_with(|| {
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(PB_TEMPLATE.clone());
            pb.set_prefix(prefix(index, 0, 0));
            pb
        })
    }
}

fn percent(position: u64, length: u64) -> u64 {
    if length == 0 {
        return 100;
    }
    (u128::from(position.min(length)) * 100 / u128::from(length)) as u64
}

fn prefix(index: u32, position: u64, length: u64) -> String {
    format!("Part {index} {}%", percent(position, length))
}

impl ProgressSink for BarSink {
    fn set_total(&mut self, range_index: u32, total_bytes: u64) {
        let pb = self.bar(range_index);
        pb.set_length(total_bytes);
        pb.set_prefix(prefix(range_index, pb.position(), total_bytes));
    }

    fn set_progress(&mut self, range_index: u32, bytes_written: u64) {
        let pb = self.bar(range_index);
        pb.set_position(bytes_written);
        pb.set_prefix(prefix(range_index, bytes_written, pb.length().unwrap_or(0)));
    }

    fn finish(&mut self, range_index: u32) {
        let pb = self.bar(range_index);
        if let Some(length) = pb.length() {
            pb.set_position(length);
        }
        pb.set_prefix(format!("Part {range_index} 100%"));
        pb.finish();
    }

    fn fail(&mut self, range_index: u32) {
        self.bar(range_index).abandon_with_message("failed");
    }
}
