use serde_json::Value;
use trellis::{SettingId, SettingsForm};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_form(form: &SettingsForm, color: bool) {
    let palette = ansi::Palette::new(color);
    let version = form.app_version().unwrap_or_else(|| "unknown".to_string());
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Settings (CommCare {version})"), ansi::CYAN)));
    if let Some(warning) = form.warning() {
        println!("  {}", palette.paint(format!("⚠ {warning}"), ansi::YELLOW));
    }

    for section in form.sections() {
        let mut tags = Vec::new();
        if form.section_really_collapse(section) {
            tags.push(palette.dim("collapsed"));
        }
        if form.section_has_error(section) {
            tags.push(palette.paint("has errors", ansi::RED));
        }
        if !form.section_not_empty(section) {
            tags.push(palette.dim("empty"));
        }
        let title = if section.title.is_empty() { &section.id } else { &section.title };
        println!("\n{} {}", palette.paint(format!("━━━ {title} ━━━"), ansi::GRAY), tags.join(" "));

        for id in &section.settings {
            print_setting(form, *id, &palette);
        }
    }

    println!("\n{}", palette.paint("━━━ Save document ━━━", ansi::GRAY));
    let doc = form.serialize();
    for (kind, bucket) in &doc.buckets {
        for (id, value) in bucket {
            println!("  {} = {}", palette.paint(format!("{kind}.{id}"), ansi::BLUE), fmt_value(value));
        }
    }
    for (key, value) in &doc.custom_properties {
        println!("  {} = {}", palette.paint(format!("custom.{key}"), ansi::BLUE), value);
    }
    if form.is_dirty() {
        println!("  {}", palette.paint("unsaved changes", ansi::YELLOW));
    }

    // Counters
    let m = form.metrics();
    println!("\n{}", palette.paint("━━━ Evaluation ━━━", ansi::GRAY));
    println!(
        "  Memo: {} hits / {} misses  │  Writes: {}  │  Cascades: {}  │  Cycles: {}",
        palette.paint(m.memo_hits.to_string(), ansi::GREEN),
        palette.paint(m.memo_misses.to_string(), ansi::CYAN),
        palette.dim(m.writes.to_string()),
        palette.dim(m.cascade_resets.to_string()),
        palette.dim(m.cycles_broken.to_string()),
    );
    println!();
}

fn print_setting(form: &SettingsForm, id: SettingId, palette: &ansi::Palette) {
    let setting = form.setting(id);
    let mark = if form.visible(id) { palette.paint("✓", ansi::GREEN) } else { palette.dim("✗") };
    let raw = match form.value(id) {
        Some(raw) if *raw != form.visible_value(id) => palette.dim(format!("(raw {})", fmt_value(raw))),
        _ => String::new(),
    };
    println!(
        "  {} {} {} {} {}",
        mark,
        palette.paint(setting.key.to_string(), ansi::BLUE),
        palette.dim("│"),
        palette.bold(fmt_value(&form.visible_value(id))),
        raw
    );

    let hidden: Vec<&str> = form.hidden_by(id).iter_names().map(|(name, _)| name).collect();
    if !hidden.is_empty() {
        println!("      {} {}", palette.dim("hidden:"), palette.dim(hidden.join(", ")));
    }
    let message = form.disabled_message(id);
    if !message.is_empty() {
        println!("      {}", palette.paint(message, ansi::YELLOW));
    }
    if form.has_error(id) {
        println!("      {}", palette.paint("value is not allowed here", ansi::RED));
    }
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
