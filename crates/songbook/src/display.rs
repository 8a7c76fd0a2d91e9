//! Terminal formatting for recommendations

use colored::*;

use crate::service::{CorpusSummary, Recommendation};

const WRAP_WIDTH: usize = 80;

/// Wrap text to fit within `width` columns, breaking on whitespace
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
  let mut lines = Vec::new();
  let mut current = String::new();

  for word in text.split_whitespace() {
    if current.is_empty() {
      current.push_str(word);
    } else if current.chars().count() + 1 + word.chars().count() <= width {
      current.push(' ');
      current.push_str(word);
    } else {
      lines.push(std::mem::take(&mut current));
      current.push_str(word);
    }
  }

  if !current.is_empty() {
    lines.push(current);
  }
  lines
}

/// Colour a score by how close the match is
pub fn format_score(score: f32) -> ColoredString {
  let text = format!("{score:.3}");
  if score >= 0.5 {
    text.green().bold()
  } else if score >= 0.2 {
    text.yellow()
  } else {
    text.dimmed()
  }
}

/// Render one recommendation as printable lines
pub fn render_recommendation(rank: usize, recommendation: &Recommendation, lyrics: bool) -> Vec<String> {
  let mut lines =
    vec![format!("{:>2}. {}  {}", rank, recommendation.filename.cyan().bold(), format_score(recommendation.score))];

  if lyrics {
    for verse in &recommendation.lyrics {
      for line in wrap_text(verse, WRAP_WIDTH - 4) {
        lines.push(format!("    {line}"));
      }
    }
    lines.push(String::new());
  }

  lines
}

pub fn display_recommendations(recommendations: &[Recommendation], lyrics: bool) {
  if recommendations.is_empty() {
    println!("No recommendations");
    return;
  }

  for (i, recommendation) in recommendations.iter().enumerate() {
    for line in render_recommendation(i + 1, recommendation, lyrics) {
      println!("{line}");
    }
  }
}

/// Render the corpus overview as printable lines
pub fn render_summary(summary: &CorpusSummary) -> Vec<String> {
  vec![
    format!("{} {}", "Songs:".bold(), summary.songs),
    format!("{} {}", "Embeddable:".bold(), summary.embeddable),
    format!("{} {}", "Corpus id:".bold(), summary.corpus_id.dimmed()),
  ]
}

pub fn display_summary(summary: &CorpusSummary) {
  for line in render_summary(summary) {
    println!("{line}");
  }
}
