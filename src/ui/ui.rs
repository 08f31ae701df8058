use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use tui_logger::TuiLoggerWidget;

use crate::model::{AlertEvent, PositionSide};
use crate::monitor::{MarketState, Totals};

pub struct UIState {
    pub show_logs: bool,
}

impl UIState {
    pub fn new(show_logs: bool) -> Self {
        Self { show_logs }
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
    }
}

/// Display formatting for prices. The precision steps by magnitude so large
/// caps stay readable and sub-cent assets keep their significant digits.
pub fn format_price(price: f64) -> String {
    if price >= 1000.0 {
        group_thousands(&format!("{price:.2}"))
    } else if price >= 1.0 {
        format!("{price:.4}")
    } else {
        format!("{price:.8}")
    }
}

fn group_thousands(formatted: &str) -> String {
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted, ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if frac_part.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac_part}")
    }
}

pub fn format_change(change: f64) -> String {
    if change == 0.0 {
        "0.00%".to_string()
    } else {
        format!("{change:+.2}%")
    }
}

pub fn format_profit(profit: f64, percent: f64) -> String {
    format!("{profit:+.2}U ({percent:+.2}%)")
}

fn sign_color(value: f64) -> Color {
    if value > 0.0 {
        Color::Green
    } else if value < 0.0 {
        Color::Red
    } else {
        Color::White
    }
}

fn change_cell(change: f64) -> Cell<'static> {
    Cell::from(format_change(change)).style(Style::default().fg(sign_color(change)))
}

fn profit_cell(profit: f64, percent: f64) -> Cell<'static> {
    Cell::from(format_profit(profit, percent)).style(Style::default().fg(sign_color(profit)))
}

fn price_cell(price: f64, change_24h: f64) -> Cell<'static> {
    if price == 0.0 {
        Cell::from("awaiting data...").style(Style::default().fg(Color::DarkGray))
    } else {
        Cell::from(format_price(price)).style(Style::default().fg(sign_color(change_24h)))
    }
}

fn local_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

pub fn draw(f: &mut Frame, ui_state: &UIState, state: &MarketState, alerts: &[AlertEvent]) {
    let spot_height = state.spot_configs.len() as u16 + 4;
    let futures_height = if state.futures_configs.is_empty() {
        0
    } else {
        state.futures_configs.len() as u16 + 4
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(spot_height),
            Constraint::Length(futures_height),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(f.size());

    draw_spot_table(f, chunks[0], state);
    if futures_height > 0 {
        draw_futures_table(f, chunks[1], state);
    }
    draw_summary(f, chunks[2], state);

    if ui_state.show_logs {
        draw_logs(f, chunks[3]);
    } else {
        draw_alerts(f, chunks[3], alerts);
    }
}

fn draw_spot_table(f: &mut Frame, area: Rect, state: &MarketState) {
    let header = Row::new(vec![
        "Rank", "Asset", "Price", "24h", "5m", "1m", "Position P&L",
    ])
    .style(Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD));

    let mut rows: Vec<Row> = state
        .ranked_spot()
        .iter()
        .enumerate()
        .map(|(i, (cfg, entry))| {
            Row::new(vec![
                Cell::from(format!("#{}", i + 1)).style(Style::default().fg(Color::Blue)),
                Cell::from(format!("{} ({})", cfg.display_name, cfg.symbol))
                    .style(Style::default().fg(Color::Cyan)),
                price_cell(entry.price, entry.change_24h),
                change_cell(entry.change_24h),
                change_cell(entry.change_5m),
                change_cell(entry.change_1m),
                profit_cell(entry.profit, entry.profit_percent),
            ])
        })
        .collect();

    let totals = state.spot_totals;
    rows.push(Row::new(vec![
        Cell::from(""),
        Cell::from("Total").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        profit_cell(totals.profit, totals.profit_percent),
    ]));

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(20),
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(24),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(format!(
                "Spot (updated {})",
                local_time(state.last_spot_update)
            )),
    );

    f.render_widget(table, area);
}

fn draw_futures_table(f: &mut Frame, area: Rect, state: &MarketState) {
    let header = Row::new(vec![
        "Rank", "Pair", "Entry", "Price", "24h", "Lev", "Side", "Liq.", "Position P&L",
    ])
    .style(Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD));

    let mut rows: Vec<Row> = Vec::new();
    for (i, (cfg, entry)) in state.ranked_futures().iter().enumerate() {
        // Futures rows without an open position carry no information.
        if !cfg.has_position() {
            continue;
        }
        let side_style = match cfg.side {
            PositionSide::Long => Style::default().fg(Color::Green),
            PositionSide::Short => Style::default().fg(Color::Red),
        };
        rows.push(Row::new(vec![
            Cell::from(format!("#{}", i + 1)).style(Style::default().fg(Color::Blue)),
            Cell::from(cfg.symbol.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(format_price(cfg.cost_price)),
            price_cell(entry.price, entry.change_24h),
            change_cell(entry.change_24h),
            Cell::from(format!("{}x", cfg.leverage)),
            Cell::from(cfg.side.as_str()).style(side_style),
            Cell::from(format_price(entry.liquidation_price)).style(Style::default().fg(Color::Red)),
            profit_cell(entry.profit, entry.profit_percent),
        ]));
    }

    let totals = state.futures_totals;
    rows.push(Row::new(vec![
        Cell::from(""),
        Cell::from("Total").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        Cell::from(""),
        profit_cell(totals.profit, totals.profit_percent),
    ]));

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(13),
            Constraint::Length(13),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Length(13),
            Constraint::Length(24),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(format!(
                "Futures (updated {})",
                local_time(state.last_futures_update)
            )),
    );

    f.render_widget(table, area);
}

fn summary_spans(label: &str, totals: Totals) -> Vec<Span<'static>> {
    vec![
        Span::styled(
            format!("{label}: invested {:.2}U ", totals.investment),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format_profit(totals.profit, totals.profit_percent),
            Style::default().fg(sign_color(totals.profit)),
        ),
    ]
}

fn draw_summary(f: &mut Frame, area: Rect, state: &MarketState) {
    let mut spans = summary_spans("spot", state.spot_totals);
    if !state.futures_configs.is_empty() {
        spans.push(Span::raw("  |  "));
        spans.extend(summary_spans("futures", state.futures_totals));
    }
    spans.push(Span::styled(
        "   [q] quit  [l] logs",
        Style::default().fg(Color::DarkGray),
    ));

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Portfolio"));
    f.render_widget(paragraph, area);
}

fn draw_alerts(f: &mut Frame, area: Rect, alerts: &[AlertEvent]) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = alerts
        .iter()
        .rev()
        .take(visible.max(1))
        .map(|event| {
            Line::from(vec![
                Span::styled(
                    event
                        .timestamp
                        .with_timezone(&Local)
                        .format("%H:%M:%S ")
                        .to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(event.title.clone(), Style::default().fg(Color::Yellow)),
                Span::raw(format!(
                    "  {} (target {})",
                    format_price(event.price),
                    format_price(event.threshold)
                )),
            ])
        })
        .collect();

    let body = if lines.is_empty() {
        Paragraph::new(Line::from(Span::styled(
            "no alerts yet",
            Style::default().fg(Color::DarkGray),
        )))
    } else {
        Paragraph::new(lines)
    };

    f.render_widget(
        body.block(Block::default().borders(Borders::ALL).title("Alerts")),
        area,
    );
}

fn draw_logs(f: &mut Frame, area: Rect) {
    let logs = TuiLoggerWidget::default()
        .style_error(Style::default().fg(Color::Red))
        .style_warn(Style::default().fg(Color::Yellow))
        .style_info(Style::default().fg(Color::White))
        .style_debug(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL).title("Logs"));
    f.render_widget(logs, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_formatting_steps_by_magnitude() {
        assert_eq!(format_price(1234.5), "1,234.50");
        assert_eq!(format_price(12.3456789), "12.3457");
        assert_eq!(format_price(0.000012345), "0.00001235");
    }

    #[test]
    fn grouping_handles_larger_magnitudes() {
        assert_eq!(format_price(1_000_000.0), "1,000,000.00");
        assert_eq!(format_price(999.9999), "999.9999");
    }

    #[test]
    fn change_formatting_is_sign_explicit() {
        assert_eq!(format_change(2.1), "+2.10%");
        assert_eq!(format_change(-1.3), "-1.30%");
        assert_eq!(format_change(0.0), "0.00%");
    }

    #[test]
    fn profit_formatting_shows_both_figures() {
        assert_eq!(format_profit(500.0, 50.0), "+500.00U (+50.00%)");
        assert_eq!(format_profit(-12.5, -1.25), "-12.50U (-1.25%)");
    }

    #[test]
    fn sign_colors() {
        assert_eq!(sign_color(1.0), Color::Green);
        assert_eq!(sign_color(-1.0), Color::Red);
        assert_eq!(sign_color(0.0), Color::White);
    }
}
