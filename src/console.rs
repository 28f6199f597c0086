use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Colored status output. Lines are routed through the active progress bar, if any,
/// so they are printed above it instead of tearing it.
#[derive(Clone)]
pub struct Console {
    bar: ProgressBar,
}

impl Default for Console {
    fn default() -> Self {
        Console { bar: ProgressBar::hidden() }
    }
}

impl Console {
    pub fn with_bar(bar: ProgressBar) -> Self {
        Console { bar }
    }

    /// Advances the attached bar by one step.
    pub fn tick(&self) {
        self.bar.inc(1);
    }

    fn emit(&self, line: String) {
        self.bar.suspend(|| println!("{}", line));
    }

    pub fn status(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref().truecolor(128, 128, 128).to_string());
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref().green().to_string());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref().yellow().to_string());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.emit(msg.as_ref().red().to_string());
    }
}

pub fn progress_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(label.to_string());
    bar
}

pub fn spinner(label: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(label);
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}
