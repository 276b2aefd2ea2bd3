use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};
use std::time::Duration;

use runlab_monitor::{BlockingOutcome, MonitorEvent, MonitorReport, StopReason, TickReport};
use runlab_pool::{PoolMetrics, TaskResult};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const OK: Color = Color::Green;
    const WARN: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const VALUE: Color = Color::Cyan;
    const DIM: Color = Color::DarkGrey;
}

/// Lag above this is shown as a warning.
const LAG_WARN_MS: f64 = 50.0;
/// Lag above this is shown as an error.
const LAG_ERROR_MS: f64 = 100.0;

fn lag_color(lag_ms: f64) -> Color {
    if lag_ms > LAG_ERROR_MS {
        Colors::ERROR
    } else if lag_ms > LAG_WARN_MS {
        Colors::WARN
    } else {
        Colors::OK
    }
}

/// Milliseconds with two decimals.
pub fn format_ms(d: Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}

/// First `limit` values, with an ellipsis if more were left out.
pub fn preview(values: &[f64], limit: usize) -> String {
    let shown: Vec<String> = values.iter().take(limit).map(|v| format!("{v}")).collect();
    if values.len() > limit {
        format!("[{}, ... ({} total)]", shown.join(", "), values.len())
    } else {
        format!("[{}]", shown.join(", "))
    }
}

/// Writes command output to stdout. Logging goes to tracing, not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print a section header with a dim detail line.
    pub fn print_banner(&self, title: &str, detail: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print(format!("{title}\n")),
            SetForegroundColor(Colors::DIM),
            Print(format!("{detail}\n")),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display one monitor event.
    pub fn display_event(&self, event: &MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::Tick(tick) => self.print_tick(tick),
            MonitorEvent::Stopped(reason) => {
                let label = match reason {
                    StopReason::Timeout => "session reached its time limit",
                    StopReason::Signal => "session stopped",
                };
                self.print_info(label)
            }
        }
    }

    fn print_tick(&self, tick: &TickReport) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("tick {:>4}  ", tick.tick)),
            SetForegroundColor(lag_color(tick.lag_ms)),
            Print(format!("lag {:>8.2}ms", tick.lag_ms)),
            SetForegroundColor(Colors::DIM),
            Print(format!(
                "  avg {:.2}ms  min {:.2}ms  max {:.2}ms  uptime {:.1}s\n",
                tick.avg_lag_ms,
                tick.min_lag_ms,
                tick.max_lag_ms,
                tick.uptime.as_secs_f64()
            )),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_report(&self, report: &MonitorReport) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Lag report\n"),
            ResetColor,
            Print(format!(
                "  stopped by {:?} after {} ticks ({:.2}s), {} samples kept\n",
                report.stop_reason,
                report.ticks,
                report.uptime.as_secs_f64(),
                report.samples.len()
            )),
        )?;
        if let Some(stats) = &report.stats {
            execute!(
                stdout,
                Print("  lag  "),
                SetForegroundColor(lag_color(stats.max_ms)),
                Print(format!(
                    "avg {:.2}ms  min {:.2}ms  max {:.2}ms\n",
                    stats.avg_ms, stats.min_ms, stats.max_ms
                )),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    pub fn print_blocking(&self, outcome: &BlockingOutcome) -> Result<()> {
        let mut stdout = io::stdout();
        let ended = match outcome.interruption {
            Some(reason) => format!(" (interrupted: {reason:?})"),
            None => String::new(),
        };
        execute!(
            stdout,
            SetForegroundColor(Colors::VALUE),
            Print(format!("[{}] ", outcome.mode)),
            ResetColor,
            Print(format!(
                "took {}, result {:.3}, {} iterations{}\n",
                format_ms(outcome.duration),
                outcome.result,
                outcome.iterations,
                ended
            )),
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_task_results(&self, results: &[TaskResult], elapsed: Duration) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{:<6} {:>20} {:>12}\n", "ID", "VALUE", "DURATION")),
            Print(format!("{}\n", "-".repeat(40))),
            ResetColor,
        )?;
        for r in results {
            execute!(
                stdout,
                Print(format!("{:<6} {:>20} {:>12}\n", r.id, r.value, format_ms(r.duration))),
            )?;
        }
        execute!(
            stdout,
            SetForegroundColor(Colors::OK),
            Print(format!("{} tasks in {}\n", results.len(), format_ms(elapsed))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_pool_metrics(&self, metrics: &PoolMetrics) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Pool metrics\n"),
            ResetColor,
            Print(format!(
                "  batches {}  dispatched {}  completed {}  failed {}  peak busy {}\n",
                metrics.batches,
                metrics.tasks_dispatched,
                metrics.total_completed(),
                metrics.tasks_failed,
                metrics.peak_busy_workers
            )),
        )?;
        let mut kinds: Vec<_> = metrics.tasks_completed.iter().collect();
        kinds.sort();
        for (kind, count) in kinds {
            let avg = metrics
                .avg_task_duration
                .get(kind)
                .copied()
                .unwrap_or_default();
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print(format!("  {kind:<16} {count:>6} done, avg {}\n", format_ms(avg))),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Print a labelled value line.
    pub fn print_value(&self, label: &str, value: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print(format!("  {label:<14} ")),
            SetForegroundColor(Colors::VALUE),
            Print(format!("{value}\n")),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_colors() {
        assert_eq!(lag_color(3.0), Colors::OK);
        assert_eq!(lag_color(75.0), Colors::WARN);
        assert_eq!(lag_color(250.0), Colors::ERROR);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(&[1.0, 4.0], 5), "[1, 4]");
        assert_eq!(preview(&[0.0, 1.0, 4.0, 9.0], 2), "[0, 1, ... (4 total)]");
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(Duration::from_micros(1500)), "1.50ms");
    }
}
