//! Display normalization for markdown-shaped replies
//!
//! Models often glue list items onto the preceding sentence ("Tips - Save -
//! Invest") or inline numbered steps. Before rendering, coerce bullets and
//! numbered steps onto their own lines.

use std::sync::OnceLock;

use regex::Regex;

struct Rules {
    bold_heading: Regex,
    heading_then_bullet: Regex,
    bullet_after_punctuation: Regex,
    inline_bullet: Regex,
    numbered_step: Regex,
    blank_runs: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        bold_heading: Regex::new(r"\*\*([^*]+?):\*\*").expect("valid regex"),
        heading_then_bullet: Regex::new(r"(\*\*[^*]+:\*\*\s*)-\s*").expect("valid regex"),
        bullet_after_punctuation: Regex::new(r"([:;\-\n\r])\s*-\s+").expect("valid regex"),
        inline_bullet: Regex::new(r"\s-\s([A-Z0-9])").expect("valid regex"),
        numbered_step: Regex::new(r"\s?(\d+)\.\s+").expect("valid regex"),
        blank_runs: Regex::new(r"\n{3,}").expect("valid regex"),
    })
}

/// Normalize a reply so list markers and numbered steps render on distinct lines
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let rules = rules();
    let t = text.replace('•', "-");
    let t = rules.bold_heading.replace_all(&t, "\n\n**$1:**");
    let t = rules.heading_then_bullet.replace_all(&t, "${1}\n- ");
    let t = rules.bullet_after_punctuation.replace_all(&t, "${1}\n- ");
    let t = rules.inline_bullet.replace_all(&t, "\n- $1");
    let t = rules.numbered_step.replace_all(&t, "\n$1. ");
    let t = rules.blank_runs.replace_all(&t, "\n\n");

    t.trim().to_string()
}
