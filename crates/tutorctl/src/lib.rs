//! Terminal rendering for tutorctl.
//!
//! Every renderer takes a `color` flag so output piped to a file or another
//! program stays free of escape codes.

use owo_colors::OwoColorize;
use tutor_common::memory::MemoryStats;
use tutor_common::{Answer, AnswerStatus, ClarificationRequest, OrchestratorResult, Subject};

pub const SEPARATOR: &str = "------------------------------------------------------------";

#[derive(Clone, Copy)]
enum Style {
    Heading,
    Accent,
    Note,
    Error,
    Dim,
}

fn paint(text: &str, style: Style, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match style {
        Style::Heading => text.bold().to_string(),
        Style::Accent => text.cyan().to_string(),
        Style::Note => text.yellow().to_string(),
        Style::Error => text.bright_red().to_string(),
        Style::Dim => text.dimmed().to_string(),
    }
}

pub fn render_result(result: &OrchestratorResult, color: bool) -> String {
    match result {
        OrchestratorResult::Answer(answer) => render_answer(answer, color),
        OrchestratorResult::ClarificationRequest(request) => render_clarification(request, color),
        OrchestratorResult::Error { message } => {
            format!("{} {}", paint("[ERROR]", Style::Error, color), message)
        }
    }
}

fn render_answer(answer: &Answer, color: bool) -> String {
    let mut out = String::new();

    let subject = answer.subject.map(|s| s.label()).unwrap_or("Tutor");
    let mut title = format!("[{}]", subject);
    if !answer.concept.is_empty() {
        title.push(' ');
        title.push_str(&answer.concept);
    }
    if !answer.topic.is_empty() && answer.topic != answer.concept {
        title.push_str(&format!(" ({})", answer.topic));
    }
    out.push_str(&paint(&title, Style::Heading, color));
    out.push('\n');
    out.push_str(answer.content.trim_end());
    out.push('\n');

    if !answer.examples.is_empty() {
        out.push('\n');
        out.push_str(&paint("Examples:", Style::Accent, color));
        out.push('\n');
        for example in &answer.examples {
            out.push_str(&format!("  * {}\n", example));
        }
    }

    if let Some(diagnostic) = &answer.diagnostic {
        out.push('\n');
        out.push_str(&paint(
            &format!("Confidence: {:.0}%", diagnostic.confidence * 100.0),
            Style::Dim,
            color,
        ));
        out.push('\n');
        if !diagnostic.reasoning_chain.is_empty() {
            out.push_str(&paint("Reasoning:", Style::Accent, color));
            out.push('\n');
            for step in &diagnostic.reasoning_chain {
                out.push_str(&format!("  - {}\n", step));
            }
        }
    }

    match answer.status {
        AnswerStatus::Unrefined => {
            out.push('\n');
            out.push_str(&paint(
                "[NOTE] Language model unavailable, showing the reference text.",
                Style::Note,
                color,
            ));
            out.push('\n');
        }
        AnswerStatus::NoMatch if !answer.suggestions.is_empty() => {
            out.push('\n');
            out.push_str(&paint("Try asking about:", Style::Accent, color));
            out.push('\n');
            for suggestion in &answer.suggestions {
                out.push_str(&format!("  * {}\n", suggestion.replace('_', " ")));
            }
        }
        _ => {}
    }
    out
}

fn render_clarification(request: &ClarificationRequest, color: bool) -> String {
    let mut out = format!("{} {}\n", paint("?", Style::Note, color), request.question);
    for (i, option) in request.options.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, option));
    }
    out
}

pub fn render_topics(subject: Subject, topics: &[String], color: bool) -> String {
    let mut out = paint(
        &format!("{} ({} topics)", subject.label(), topics.len()),
        Style::Heading,
        color,
    );
    out.push('\n');
    for topic in topics {
        out.push_str(&format!("  {}\n", topic));
    }
    out
}

pub fn render_stats(stats: &MemoryStats, color: bool) -> String {
    let mut out = paint("Conversation", Style::Heading, color);
    out.push('\n');
    out.push_str(&format!("  turns:      {}/{}\n", stats.turns, stats.capacity));
    out.push_str(&format!("  clarified:  {}\n", stats.clarified_turns));
    out.push_str(&format!(
        "  open turn:  {}\n",
        if stats.open_turn { "yes" } else { "no" }
    ));
    for (subject, count) in &stats.by_subject {
        out.push_str(&format!("  {:<11} {}\n", format!("{}:", subject), count));
    }
    out
}

/// Accepts the subject names the tutor itself understands.
pub fn parse_subject_arg(arg: &str) -> anyhow::Result<Subject> {
    Subject::parse_choice(arg).ok_or_else(|| {
        let valid: Vec<&str> = Subject::ALL.iter().map(|s| s.as_str()).collect();
        anyhow::anyhow!("unknown subject '{}', expected one of: {}", arg, valid.join(", "))
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Query(String),
    Reset,
    Stats,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_repl_line(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    match trimmed {
        "/reset" => ReplCommand::Reset,
        "/stats" => ReplCommand::Stats,
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        cmd if cmd.starts_with('/') => ReplCommand::Unknown(cmd.to_string()),
        _ => ReplCommand::Query(trimmed.to_string()),
    }
}

pub const REPL_HELP: &str = "Commands: /reset  /stats  /help  /quit";
