use chatactions::{ActionSuggestion, ActionsSuggestionsResponse, Conversation, RunResult, SourceSet};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
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

pub fn print_run(conversation: &Conversation, result: &RunResult, color: bool) {
    let palette = ansi::Palette::new(color);
    let last = conversation.messages.last().map_or("", |m| m.text.as_str());
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Suggesting for: \"{}\"", last), ansi::CYAN)));
    if conversation.messages.len() > 1 {
        println!("{}", palette.dim(format!("   ({} earlier messages)", conversation.messages.len() - 1)));
    }

    println!("\n{}", palette.paint("━━━ Gate ━━━", ansi::GRAY));
    print_gate(&result.response, result, &palette);

    println!("\n{}", palette.paint("━━━ Suggestions ━━━", ansi::GRAY));
    if result.response.actions.is_empty() {
        println!("{}", palette.dim("  No suggestions"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • The gate stopped the pipeline (see above)");
        println!("  • No annotation mapping, model class or rule matched");
        println!("\n{}", palette.dim("  Tip: Set CHATACTIONS_LOG=debug to see stage decisions"));
    } else {
        for (idx, action) in result.response.actions.iter().enumerate() {
            print_action(idx, action, &palette);
        }
    }

    let m = &result.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Annotations: {}  │  Model: {}  │  Rules: {}  │  Ranking: {}",
        palette.paint(format!("{:?}", m.total), ansi::GREEN),
        palette.dim(format!("{:?}", m.annotations)),
        palette.dim(format!("{:?}", m.model)),
        palette.dim(format!("{:?}", m.rules)),
        palette.dim(format!("{:?}", m.ranking)),
    );
    println!();
}

fn print_gate(response: &ActionsSuggestionsResponse, result: &RunResult, palette: &ansi::Palette) {
    println!("  {} {}", palette.paint("Stage:", ansi::BLUE), palette.bold(result.metrics.stage.as_str()));

    let sources: Vec<&str> = [
        (SourceSet::ANNOTATIONS, "annotations"),
        (SourceSet::MODEL, "model"),
        (SourceSet::RULES, "rules"),
    ]
    .into_iter()
    .filter(|(flag, _)| result.metrics.sources.contains(*flag))
    .map(|(_, name)| name)
    .collect();
    println!(
        "  {} {}  {} {} / {} / {}",
        palette.paint("Sources:", ansi::BLUE),
        if sources.is_empty() { palette.dim("none") } else { sources.join(", ") },
        palette.dim("│ counts:"),
        result.metrics.counts.annotations,
        result.metrics.counts.model,
        result.metrics.counts.rules,
    );

    println!(
        "  {} {}  {} {}",
        palette.paint("Triggering:", ansi::BLUE),
        fmt_score(response.triggering_score, palette),
        palette.paint("Sensitivity:", ansi::BLUE),
        fmt_score(response.sensitivity_score, palette),
    );

    let flags = [
        (response.output_filtered_locale_mismatch, "locale mismatch"),
        (response.output_filtered_low_confidence, "low confidence"),
        (response.output_filtered_min_triggering_score, "below triggering threshold"),
        (response.output_filtered_sensitivity, "sensitive topic"),
    ];
    for (set, label) in flags {
        if set {
            println!("  {} {}", palette.paint("✗", ansi::RED), palette.paint(label, ansi::YELLOW));
        }
    }
}

fn print_action(idx: usize, action: &ActionSuggestion, palette: &ansi::Palette) {
    let text = if action.response_text.is_empty() { String::new() } else { format!(" \"{}\"", action.response_text) };
    println!(
        "  {} {}{} {} {}",
        palette.paint(format!("[{}]", idx), ansi::GRAY),
        palette.bold(palette.paint(&action.action_type, ansi::GREEN)),
        text,
        palette.dim("│"),
        palette.paint(format!("score {:.3}", action.score), ansi::YELLOW),
    );
    for annotation in &action.annotations {
        println!(
            "      {} {} {} {}",
            palette.dim("annotation:"),
            palette.paint(&annotation.name, ansi::BLUE),
            palette.paint(format!("{}..{}", annotation.span.0, annotation.span.1), ansi::YELLOW),
            palette.dim(format!("\"{}\"", annotation.text)),
        );
    }
    if !action.serialized_entity_data.is_empty() {
        println!(
            "      {} {}",
            palette.dim("entity data:"),
            palette.paint(format!("{} bytes", action.serialized_entity_data.len()), ansi::CYAN)
        );
    }
}

fn fmt_score(score: f32, palette: &ansi::Palette) -> String {
    if score < 0.0 { palette.dim("n/a") } else { palette.paint(format!("{score:.3}"), ansi::GREEN) }
}
