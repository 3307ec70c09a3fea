//! Result output for commands
//!
//! Logs go to stderr through tracing; these formatters write the result of
//! a command, either as short human lines or as JSON documents.

use std::time::Duration;

use bucketsync_core::domain::StatsSnapshot;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == Self::Json
    }

    pub fn formatter(self) -> Box<dyn OutputFormatter> {
        match self {
            Self::Human => Box::new(HumanFormatter),
            Self::Json => Box::new(JsonFormatter),
        }
    }
}

/// Writes command results
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);

    /// Final counters of a sync pass; always printed, even after failures
    fn stats(&self, stats: &StatsSnapshot, elapsed: Option<Duration>);
}

/// Plain lines with status marks
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }

    fn info(&self, message: &str) {
        println!("  {message}");
    }

    fn print_json(&self, _value: &serde_json::Value) {}

    fn stats(&self, stats: &StatsSnapshot, elapsed: Option<Duration>) {
        match elapsed {
            Some(elapsed) => println!("{stats} ({})", human_duration(elapsed)),
            None => println!("{stats}"),
        }
    }
}

/// One JSON document per call
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({ "success": true, "message": message }));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({ "success": false, "error": message }));
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({ "level": "warning", "message": message }));
    }

    fn info(&self, _message: &str) {}

    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }

    fn stats(&self, stats: &StatsSnapshot, elapsed: Option<Duration>) {
        let mut value = serde_json::to_value(stats).unwrap_or_default();
        if let (Some(elapsed), Some(map)) = (elapsed, value.as_object_mut()) {
            map.insert("elapsed_ms".into(), (elapsed.as_millis() as u64).into());
        }
        self.print_json(&value);
    }
}

/// `850ms`, `12.3s` or `4m 05s`
pub fn human_duration(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// `""` for one, `"s"` otherwise
pub fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
