use legalmate_core::{Answer, AnswerMetadata, Message, SendMode};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{mask_secret, App, Confirm, Focus, KeyField, Screen};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };

        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        let bold = &after[..end];
        if bold.is_empty() {
            spans.push(Span::raw("****"));
        } else {
            spans.push(Span::styled(
                bold.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn metadata_summary(metadata: &AnswerMetadata) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(query_type) = &metadata.query_type {
        parts.push(query_type.replace('_', " "));
    }
    if let Some(complexity) = &metadata.complexity {
        parts.push(complexity.clone());
    }
    if metadata.has_legal_sections == Some(true) {
        parts.push("cites sections".to_string());
    }
    if let Some(words) = metadata.word_count {
        parts.push(format!("{} words", words));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Credentials => render_credentials_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if let Some(confirm) = &app.confirm {
        render_confirm(confirm, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mode = match app.config.send_mode {
        SendMode::Adaptive => "adaptive",
        SendMode::Simple => "simple",
    };

    let health = match &app.health {
        None => Span::styled(" checking backend ", Style::default().fg(Color::DarkGray)),
        Some(Ok(status)) if status.is_healthy() => {
            Span::styled(" backend ok ", Style::default().fg(Color::Green))
        }
        Some(Ok(status)) => Span::styled(
            format!(" backend {} ", status.status),
            Style::default().fg(Color::Yellow),
        ),
        Some(Err(_)) => Span::styled(" backend unreachable ", Style::default().fg(Color::Red)),
    };

    let title = Line::from(vec![
        Span::styled(" LegalMate ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("[{}] ", mode), Style::default().fg(Color::DarkGray)),
        Span::styled(app.api.base_url().to_string(), Style::default().fg(Color::DarkGray)),
        health,
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut spans: Vec<Span> = Vec::new();
    match (app.screen, app.focus) {
        (Screen::Credentials, _) => {
            spans.extend(hint("Tab", "next field"));
            spans.extend(hint("Enter", "save"));
            spans.extend(hint("Esc", "quit"));
        }
        (Screen::Chat, Focus::Sessions) => {
            spans.extend(hint("j/k", "nav"));
            spans.extend(hint("Enter", "open"));
            spans.extend(hint("n", "new"));
            spans.extend(hint("d", "delete"));
            spans.extend(hint("D", "delete all"));
            spans.extend(hint("c", "clear"));
            spans.extend(hint("K", "reset keys"));
            spans.extend(hint("q", "quit"));
        }
        (Screen::Chat, Focus::Messages) => {
            spans.extend(hint("j/k", "scroll"));
            spans.extend(hint("g/G", "top/bottom"));
            spans.extend(hint("Tab", "focus"));
        }
        (Screen::Chat, Focus::Input) => {
            spans.extend(hint("Enter", "send"));
            spans.extend(hint("Tab", "focus"));
            if app.loading() {
                spans.extend(hint("Esc", "cancel"));
            }
        }
    }

    if let Some(status) = &app.status {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_credentials_screen(app: &App, frame: &mut Frame, area: Rect) {
    let form_width = 64.min(area.width.saturating_sub(4));
    let form_height = 15.min(area.height);
    let form_area = Rect::new(
        area.x + (area.width.saturating_sub(form_width)) / 2,
        area.y + (area.height.saturating_sub(form_height)) / 2,
        form_width,
        form_height,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter your API keys ");
    let inner = block.inner(form_area);
    frame.render_widget(block, form_area);

    let instructions = Paragraph::new("Keys are stored locally and sent with each question.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    for (i, field) in KeyField::ALL.iter().enumerate() {
        let y = inner.y + 2 + (i as u16) * 3;
        if y + 1 >= inner.y + inner.height {
            break;
        }

        let focused = app.key_form.field == *field;
        let label_style = if focused {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::White)
        };
        frame.render_widget(
            Paragraph::new(field.label()).style(label_style),
            Rect::new(inner.x, y, inner.width, 1),
        );

        let value = mask_secret(app.key_form.value(*field));
        let input_area = Rect::new(inner.x, y + 1, inner.width, 1);
        frame.render_widget(
            Paragraph::new(format!("> {}", value)).style(Style::default().fg(Color::Cyan)),
            input_area,
        );

        if focused {
            let cursor_x = (value.chars().count() as u16 + 2).min(input_area.width);
            frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
        }
    }

    if let Some(error) = &app.key_form.error {
        let error_y = inner.y + inner.height.saturating_sub(1);
        frame.render_widget(
            Paragraph::new(error.as_str())
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: true }),
            Rect::new(inner.x, error_y, inner.width, 1),
        );
    }
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [sessions_area, main_area] =
        Layout::horizontal([Constraint::Length(32), Constraint::Min(0)]).areas(area);
    let [messages_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(main_area);

    render_sessions(app, frame, sessions_area);
    render_messages(app, frame, messages_area);
    render_input(app, frame, input_area);
}

fn border_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

fn render_sessions(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == Focus::Sessions)))
        .title(" Chats ");

    let Some(conversation) = app.conversation.as_ref() else {
        frame.render_widget(block, area);
        return;
    };

    let active = conversation.active_session();
    let items: Vec<ListItem> = conversation
        .known_sessions()
        .iter()
        .map(|record| {
            let style = if &record.id == active {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(record.title.clone(), style))
        })
        .collect();

    if items.is_empty() {
        let empty = Paragraph::new("No chats yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sessions_state);
}

fn message_lines(messages: &[Message], loading: bool, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for message in messages {
        match message {
            Message::User(text) => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in text.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Message::Assistant(answer) => {
                lines.push(Line::from(Span::styled(
                    "LegalMate:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in answer.text().lines() {
                    lines.push(parse_markdown_line(line));
                }
                if let Answer::Structured { metadata, .. } = answer {
                    if let Some(summary) = metadata_summary(metadata) {
                        lines.push(Line::from(Span::styled(
                            summary,
                            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                        )));
                    }
                }
            }
            Message::Error(text) => {
                lines.push(Line::from(Span::styled(
                    "Error:",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(Span::styled(
                    text.clone(),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        lines.push(Line::default());
    }

    if loading {
        lines.push(Line::from(Span::styled(
            "LegalMate:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == Focus::Messages)))
        .title(" Conversation ");

    let text = match app.conversation.as_ref() {
        Some(conversation) if conversation.messages().is_empty() && !conversation.loading() => {
            Text::from(Span::styled(
                "Ask a question about Indian law...",
                Style::default().fg(Color::DarkGray),
            ))
        }
        Some(conversation) => Text::from(message_lines(
            conversation.messages(),
            conversation.loading(),
            app.animation_frame,
        )),
        None => Text::default(),
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.message_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Input;
    let border = if focused { Color::Yellow } else { Color::DarkGray };
    let title = if app.loading() {
        " Waiting for reply (Esc to cancel) "
    } else {
        " Ask "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.input_cursor < inner_width {
        0
    } else {
        app.input_cursor - inner_width + 1
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if focused {
        let cursor_x = (app.input_cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_confirm(confirm: &Confirm, frame: &mut Frame, area: Rect) {
    let prompt = match confirm {
        Confirm::DeleteSession { title, .. } => format!("Delete \"{}\"?", title),
        Confirm::DeleteAll => "Delete all chats? This cannot be undone.".to_string(),
    };

    let popup_width = 56.min(area.width.saturating_sub(4));
    let popup_height = 5;
    let popup_area = Rect::new(
        (area.width.saturating_sub(popup_width)) / 2,
        (area.height.saturating_sub(popup_height)) / 2,
        popup_width,
        popup_height,
    );

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Confirm ");

    let text = Text::from(vec![
        Line::from(prompt),
        Line::default(),
        Line::from(Span::styled(
            "y / Enter to confirm, n / Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        popup_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markdown_becomes_styled_span() {
        let line = parse_markdown_line("See **Section 420** of the IPC");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "Section 420");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "a **b");
    }

    #[test]
    fn metadata_summary_lists_known_fields() {
        let metadata = AnswerMetadata {
            query_type: Some("legal_specific".into()),
            complexity: Some("simple".into()),
            has_legal_sections: Some(true),
            word_count: Some(120),
            ..Default::default()
        };
        assert_eq!(
            metadata_summary(&metadata).as_deref(),
            Some("legal specific · simple · cites sections · 120 words")
        );
        assert_eq!(metadata_summary(&AnswerMetadata::default()), None);
    }

    #[test]
    fn pending_reply_shows_thinking_indicator() {
        let messages = vec![Message::User("Hi".into())];
        let lines = message_lines(&messages, true, 2);
        let last = lines.last().unwrap();
        assert_eq!(last.spans[0].content, "Thinking...");
    }
}
