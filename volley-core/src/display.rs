use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Duration;

use crate::config::ProgressMode;
use crate::executor::ProgressSnapshot;

const BAR_WIDTH: usize = 50;

/// One scenario line of the progress block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressBar {
    pub scenario: String,
    pub max_vus: u64,
    pub progress: ProgressSnapshot,
}

impl ProgressBar {
    pub fn is_complete(&self) -> bool {
        self.progress.percentage >= 100.0
    }

    /// `name [=====     ] 10.0% 2/4 VUs 00m01.0s`, with ` ✓` once complete.
    pub fn render(&self, name_width: usize) -> String {
        let pct = self.progress.percentage.clamp(0.0, 100.0);
        let filled = ((pct / 2.0).floor() as usize).min(BAR_WIDTH);

        let mut line = format!(
            "{:<name_width$} [{}{}] {:>5.1}% {}/{} VUs {}",
            self.scenario,
            "=".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            pct,
            self.progress.current_vus,
            self.max_vus,
            format_elapsed(self.progress.elapsed),
        );
        if self.is_complete() {
            line.push_str(" ✓");
        }
        line
    }
}

/// Header plus one bar per scenario, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    pub elapsed: Duration,
    pub current_vus: u64,
    pub max_vus: u64,
    pub iterations: u64,
    pub bars: Vec<ProgressBar>,
}

impl ProgressFrame {
    pub fn header(&self) -> String {
        format!(
            "running ({}), {}/{} VUs, {} complete iterations",
            format_elapsed(self.elapsed),
            self.current_vus,
            self.max_vus,
            self.iterations
        )
    }

    /// Lines the frame occupies on screen.
    pub fn height(&self) -> usize {
        1 + self.bars.len()
    }

    fn render(&self) -> String {
        let name_width = self
            .bars
            .iter()
            .map(|b| b.scenario.chars().count())
            .max()
            .unwrap_or(0);

        let mut out = self.header();
        out.push('\n');
        for bar in &self.bars {
            let _ = writeln!(out, "{}", bar.render(name_width));
        }
        out
    }
}

/// Line-oriented progress output that redraws itself in place.
#[derive(Debug)]
pub struct ProgressDisplay<W> {
    out: W,
    mode: ProgressMode,
    /// Lines drawn by the last live frame that have not been cleared yet.
    drawn: usize,
}

impl<W: Write> ProgressDisplay<W> {
    pub fn new(out: W, mode: ProgressMode) -> Self {
        Self {
            out,
            mode,
            drawn: 0,
        }
    }

    /// Replaces the previous live frame. No-op unless the mode is [`ProgressMode::Live`].
    pub fn redraw(&mut self, frame: &ProgressFrame) -> io::Result<()> {
        if self.mode != ProgressMode::Live {
            return Ok(());
        }
        self.clear()?;
        self.out.write_all(frame.render().as_bytes())?;
        self.out.flush()?;
        self.drawn = frame.height();
        Ok(())
    }

    /// Erases the live frame, if one is on screen.
    pub fn clear(&mut self) -> io::Result<()> {
        if self.drawn == 0 {
            return Ok(());
        }
        write!(self.out, "\x1b[{}A\x1b[J", self.drawn)?;
        self.out.flush()?;
        self.drawn = 0;
        Ok(())
    }

    /// Prints the terminal state of the run. It stays on screen.
    pub fn print_final(&mut self, frame: &ProgressFrame) -> io::Result<()> {
        self.clear()?;
        self.out.write_all(frame.render().as_bytes())?;
        self.out.flush()
    }

    pub fn write_report(&mut self, report: &str) -> io::Result<()> {
        self.out.write_all(report.as_bytes())?;
        if !report.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `MMmSS.Ss`, e.g. `01m05.3s`.
pub fn format_elapsed(d: Duration) -> String {
    let tenths = d.as_millis() / 100;
    format!(
        "{:02}m{:02}.{}s",
        tenths / 600,
        (tenths / 10) % 60,
        tenths % 10
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(name: &str, pct: f64) -> ProgressBar {
        ProgressBar {
            scenario: name.to_string(),
            max_vus: 4,
            progress: ProgressSnapshot {
                elapsed: Duration::from_millis(1_500),
                completed_iterations: 10,
                percentage: pct,
                current_vus: 2,
            },
        }
    }

    fn frame(bars: Vec<ProgressBar>) -> ProgressFrame {
        ProgressFrame {
            elapsed: Duration::from_millis(65_300),
            current_vus: 2,
            max_vus: 4,
            iterations: 10,
            bars,
        }
    }

    #[test]
    fn elapsed_is_minutes_and_tenths() {
        assert_eq!(format_elapsed(Duration::ZERO), "00m00.0s");
        assert_eq!(format_elapsed(Duration::from_millis(65_300)), "01m05.3s");
        assert_eq!(format_elapsed(Duration::from_millis(59_990)), "00m59.9s");
        assert_eq!(format_elapsed(Duration::from_secs(3_600)), "60m00.0s");
    }

    #[test]
    fn elapsed_never_drops_a_tenth() {
        for tenths in 0..2_000u64 {
            let d = Duration::from_millis(tenths * 100);
            let expected = format!(
                "{:02}m{:02}.{}s",
                tenths / 600,
                (tenths / 10) % 60,
                tenths % 10
            );
            assert_eq!(format_elapsed(d), expected, "at {}ms", tenths * 100);
        }
        assert_eq!(format_elapsed(Duration::from_millis(60_300)), "01m00.3s");
        assert_eq!(format_elapsed(Duration::from_millis(65_399)), "01m05.3s");
    }

    #[test]
    fn bar_is_half_the_percentage() {
        let line = bar("a", 37.0).render(1);
        let fill = line
            .split('[')
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .unwrap_or_else(|| panic!("no bar in {line:?}"));
        assert_eq!(fill.len(), BAR_WIDTH);
        assert_eq!(fill.chars().filter(|c| *c == '=').count(), 18);
        assert!(!line.ends_with('✓'));
    }

    #[test]
    fn complete_bar_is_full_and_marked() {
        let line = bar("steady", 100.0).render(8);
        assert!(line.starts_with("steady   ["));
        assert!(line.contains(&"=".repeat(BAR_WIDTH)));
        assert!(line.contains("100.0%"));
        assert!(line.contains("2/4 VUs"));
        assert!(line.ends_with(" ✓"));
    }

    #[test]
    fn header_summarizes_the_run() {
        assert_eq!(
            frame(vec![]).header(),
            "running (01m05.3s), 2/4 VUs, 10 complete iterations"
        );
    }

    #[test]
    fn redraw_moves_up_over_previous_frame() -> io::Result<()> {
        let mut display = ProgressDisplay::new(Vec::new(), ProgressMode::Live);
        let f = frame(vec![bar("a", 10.0), bar("b", 20.0)]);
        display.redraw(&f)?;
        display.redraw(&f)?;
        display.clear()?;

        let out = String::from_utf8_lossy(&display.into_inner()).into_owned();
        assert_eq!(out.matches("\x1b[3A\x1b[J").count(), 2);
        assert_eq!(out.matches("running (").count(), 2);
        assert!(out.ends_with("\x1b[3A\x1b[J"));
        Ok(())
    }

    #[test]
    fn off_mode_only_prints_final() -> io::Result<()> {
        let mut display = ProgressDisplay::new(Vec::new(), ProgressMode::Off);
        let f = frame(vec![bar("a", 100.0)]);
        display.redraw(&f)?;
        display.clear()?;
        assert!(display.out.is_empty());

        display.print_final(&f)?;
        let out = String::from_utf8_lossy(&display.into_inner()).into_owned();
        assert!(!out.contains('\x1b'));
        assert_eq!(out.lines().count(), 2);
        Ok(())
    }
}
