//! Terminal presentation of a [`Breakdown`]: a stacked bar and a card list.
//!
//! Pure string rendering; nothing here touches the pipeline. With `color`
//! off, each category is drawn with its own glyph instead of an ANSI colour
//! so the bar stays readable in logs and pipes.

use crate::model::{Breakdown, Category};

impl Category {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Category::TreesAndShrubs => "Trees & Shrubs",
            Category::GreenOpenSpace => "Green Open Space",
            Category::PermeableSurfaces => "Permeable Surfaces",
            Category::ImpermeableSurfaces => "Impermeable Surfaces",
            Category::IncidentalPlayArea => "Incidental Play Area",
        }
    }

    /// Display colour as `#rrggbb`.
    pub fn color(self) -> &'static str {
        match self {
            Category::TreesAndShrubs => "#166534",
            Category::GreenOpenSpace => "#4ade80",
            Category::PermeableSurfaces => "#d4a373",
            Category::ImpermeableSurfaces => "#6b7280",
            Category::IncidentalPlayArea => "#f59e0b",
        }
    }

    /// Closest xterm-256 colour index to [`Category::color`].
    pub fn ansi_color(self) -> u8 {
        match self {
            Category::TreesAndShrubs => 22,
            Category::GreenOpenSpace => 77,
            Category::PermeableSurfaces => 180,
            Category::ImpermeableSurfaces => 244,
            Category::IncidentalPlayArea => 214,
        }
    }

    /// Bar glyph used when colour is off.
    pub fn glyph(self) -> char {
        match self {
            Category::TreesAndShrubs => '#',
            Category::GreenOpenSpace => '"',
            Category::PermeableSurfaces => ':',
            Category::ImpermeableSurfaces => '=',
            Category::IncidentalPlayArea => '*',
        }
    }
}

fn paint(s: &str, category: Category, color: bool) -> String {
    if color {
        format!("\x1b[38;5;{}m{s}\x1b[0m", category.ansi_color())
    } else {
        s.to_string()
    }
}

/// Character widths of each bar segment, in entry order.
///
/// Widths are proportional to each entry's share of the positive total and
/// use largest-remainder rounding, so they add up to exactly `width` whenever
/// any share is positive. Negative shares get no width.
pub fn segment_widths(breakdown: &Breakdown, width: usize) -> Vec<usize> {
    let shares: Vec<f64> = breakdown.entries.iter().map(|e| e.percentage.max(0.0)).collect();
    let total: f64 = shares.iter().sum();
    if total <= 0.0 || width == 0 {
        return vec![0; shares.len()];
    }

    let exact: Vec<f64> = shares.iter().map(|s| s / total * width as f64).collect();
    let mut widths: Vec<usize> = exact.iter().map(|x| x.floor() as usize).collect();
    let mut remaining = width.saturating_sub(widths.iter().sum());

    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
    for i in by_remainder {
        if remaining == 0 {
            break;
        }
        if shares[i] > 0.0 {
            widths[i] += 1;
            remaining -= 1;
        }
    }
    widths
}

/// Render the stacked bar, `width` characters wide.
pub fn render_bar(breakdown: &Breakdown, width: usize, color: bool) -> String {
    let widths = segment_widths(breakdown, width);
    if widths.iter().all(|&w| w == 0) {
        return "░".repeat(width);
    }

    breakdown
        .entries
        .iter()
        .zip(widths)
        .filter(|(_, w)| *w > 0)
        .map(|(entry, w)| {
            let fill = if color {
                "█".repeat(w)
            } else {
                entry.category.glyph().to_string().repeat(w)
            };
            paint(&fill, entry.category, color)
        })
        .collect()
}

/// Render one card per entry followed by the total line.
pub fn render_cards(breakdown: &Breakdown, width: usize, color: bool) -> String {
    let mut out = String::new();
    let label_width = width.saturating_sub(10).max(20);

    for entry in &breakdown.entries {
        let marker = if color { "■".to_string() } else { entry.category.glyph().to_string() };
        out.push_str(&format!(
            "{} {:<label_width$}{:>7.1}%\n",
            paint(&marker, entry.category, color),
            entry.category.label(),
            entry.percentage,
        ));
        for line in wrap(&entry.description, width.saturating_sub(4).max(20)) {
            out.push_str("    ");
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "  {:<label_width$}{:>7.1}%\n",
        "Total",
        breakdown.total_percentage
    ));
    out
}

/// Bar, blank line, cards.
pub fn render_breakdown(breakdown: &Breakdown, width: usize, color: bool) -> String {
    format!(
        "{}\n\n{}",
        render_bar(breakdown, width, color),
        render_cards(breakdown, width, color)
    )
}

/// Greedy word wrap; words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
