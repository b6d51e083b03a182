use anyhow::Result;
use procstats::{MemoryRatios, StatsReport};
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_serialized<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
            return Ok(());
        }

        let rendered = render_value(&serde_json::to_value(value)?, 0);
        println!("{rendered}");
        Ok(())
    }

    pub fn print_report(&self, report: &StatsReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }

        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {}\n",
            self.style("procstats", "36;1"),
            self.style(&report.category_label, "37;1"),
            self.style(&format!("over {}", report.elapsed), "90")
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("memory", "90"),
            self.mem_state_style(&report.mem_state)
        ));
        match &report.memory {
            Some(ratios) => out.push_str(&format!(
                "{} {}\n",
                self.style("pressure", "90"),
                self.render_ratios(ratios)
            )),
            None => out.push_str(&format!("{} no data\n", self.style("pressure", "90"))),
        }

        if report.entries.is_empty() {
            out.push_str(&format!("{}\n", self.style("no processes above threshold", "33")));
        }
        for (idx, ranked) in report.entries.iter().enumerate() {
            let entry = &ranked.entry;
            let kb = if report.use_uss {
                entry.avg_uss_kb
            } else {
                entry.avg_pss_kb
            };
            let time = ranked
                .percent_of_time
                .map(|p| format!("{p:.1}%"))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:>3}. {} {} {} {}\n",
                idx + 1,
                self.style(&entry.name, "37;1"),
                self.style(&format!("{:.1}MB", kb as f64 / 1024.0), "90"),
                self.style(&format!("weight={:.1}%", ranked.percent_of_weight), "32"),
                self.style(&format!("time={time}"), "90"),
            ));
            if let Some(pkg) = &entry.best_target_package {
                if pkg != &entry.name {
                    out.push_str(&format!("     {} {pkg}\n", self.style("app", "90")));
                }
            }
            if !entry.services.is_empty() {
                out.push_str(&format!(
                    "     {} {}\n",
                    self.style("services", "90"),
                    entry.services.join(", ")
                ));
            }
        }

        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    fn render_ratios(&self, ratios: &MemoryRatios) -> String {
        format!(
            "{} {} {}",
            self.style(&format!("critical={:.1}%", ratios.critical * 100.0), "31"),
            self.style(
                &format!("low/moderate={:.1}%", ratios.low_moderate * 100.0),
                "33"
            ),
            self.style(&format!("normal={:.1}%", ratios.normal * 100.0), "32"),
        )
    }

    fn mem_state_style(&self, state: &str) -> String {
        let ansi = match state {
            "critical" => "31;1",
            "low" | "moderate" => "33;1",
            "normal" => "32;1",
            _ => "90",
        };
        self.style(state, ansi)
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}

fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => render_array(items, indent),
        Value::Object(map) => render_object(map, indent),
    }
}

fn render_array(items: &[Value], indent: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for item in items {
        match item {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!("{pad}-\n{}\n", render_value(item, indent + 2)));
            }
            _ => out.push_str(&format!("{pad}- {}\n", render_value(item, indent + 2))),
        }
    }
    out.trim_end().to_string()
}

fn render_object(map: &serde_json::Map<String, Value>, indent: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!(
                    "{pad}{key}:\n{}\n",
                    render_value(value, indent + 2)
                ));
            }
            _ => out.push_str(&format!(
                "{pad}{key}: {}\n",
                render_value(value, indent + 2)
            )),
        }
    }
    out.trim_end().to_string()
}
