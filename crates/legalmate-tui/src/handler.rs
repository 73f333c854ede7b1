use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use legalmate_core::{Answer, ApiError, HardReset, PendingTurn, SendOutcome, SessionId};
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::app::{App, Confirm, Focus, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::HardReset(reset) => handle_hard_reset(app, reset),
    }

    poll_tasks(app).await;
    Ok(())
}

pub fn handle_hard_reset(app: &mut App, reset: HardReset) {
    warn!(reason = %reset.reason, "API keys rejected, asking for new ones");
    app.reset_after_rejected_keys(Some(
        ApiError::AuthenticationFailure {
            detail: reset.reason,
        }
        .to_string(),
    ));
}

/// Starts the chat if keys are stored, otherwise leaves the key form up.
pub async fn start(app: &mut App) -> Result<()> {
    let api = app.api.clone();
    app.health_task = Some(tokio::spawn(async move { api.health().await }));

    if app.has_credentials() {
        enter_chat(app).await?;
    }
    Ok(())
}

async fn enter_chat(app: &mut App) -> Result<()> {
    app.open_chat()?;

    if let Some(conversation) = app.conversation.as_mut() {
        // Logged by the conversation; an empty sidebar is enough here
        let _ = conversation.refresh_sessions().await;
    }
    app.sync_session_selection();
    load_active_history(app);
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work on every screen
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.screen {
        Screen::Credentials => handle_credentials_key(app, key).await?,
        Screen::Chat => {
            if app.confirm.is_some() {
                handle_confirm_key(app, key).await;
            } else {
                handle_chat_key(app, key).await;
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────
// Credentials form
// ─────────────────────────────────────────────────────────────────────────

async fn handle_credentials_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Tab | KeyCode::Down => app.key_form.field = app.key_form.field.next(),
        KeyCode::BackTab | KeyCode::Up => app.key_form.field = app.key_form.field.prev(),
        KeyCode::Backspace => {
            app.key_form.value_mut().pop();
        }
        KeyCode::Char(c) => app.key_form.value_mut().push(c),
        KeyCode::Enter => submit_credentials(app).await?,
        KeyCode::Esc => app.should_quit = true,
        _ => {}
    }
    Ok(())
}

async fn submit_credentials(app: &mut App) -> Result<()> {
    let candidate = match app.key_form.credentials().validate() {
        Ok(candidate) => candidate,
        Err(err) => {
            app.key_form.error = Some(err.to_string());
            return Ok(());
        }
    };

    if let Err(err) = app.credentials().save(&candidate) {
        app.key_form.error = Some(err.to_string());
        return Ok(());
    }

    info!("API keys saved");
    enter_chat(app).await
}

// ─────────────────────────────────────────────────────────────────────────
// Chat screen
// ─────────────────────────────────────────────────────────────────────────

async fn handle_chat_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Tab => {
            app.focus = app.focus.next();
            return;
        }
        KeyCode::Esc => {
            let cancelled = app
                .conversation
                .as_ref()
                .map(|c| c.cancel_send())
                .unwrap_or(false);
            if cancelled {
                app.status = Some("Cancelling request...".to_string());
            } else if app.focus == Focus::Input {
                app.focus = Focus::Sessions;
            }
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Sessions => handle_sessions_key(app, key).await,
        Focus::Messages => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
            KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),
            KeyCode::Char('g') | KeyCode::Home => app.message_scroll = 0,
            _ => {}
        },
        Focus::Input => handle_input_key(app, key),
    }
}

async fn handle_sessions_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.sessions_down(),
        KeyCode::Char('k') | KeyCode::Up => app.sessions_up(),
        KeyCode::Enter => {
            if let Some((id, _)) = app.selected_session() {
                select_session(app, id);
            }
        }
        KeyCode::Char('n') => {
            if let Some(conversation) = app.conversation.as_mut() {
                let id = conversation.new_session();
                info!(session_id = %id, "New chat");
            }
            abort_history(app);
            app.message_scroll = 0;
            app.sync_session_selection();
            app.focus = Focus::Input;
        }
        KeyCode::Char('d') => {
            if let Some((id, title)) = app.selected_session() {
                app.confirm = Some(Confirm::DeleteSession { id, title });
            }
        }
        KeyCode::Char('D') => app.confirm = Some(Confirm::DeleteAll),
        KeyCode::Char('c') => clear_current_history(app).await,
        KeyCode::Char('K') => {
            info!("Resetting API keys");
            app.credentials().clear();
            app.require_credentials(None);
        }
        KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => submit_input(app),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if app.input_cursor < app.input.chars().count() {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => app.input_cursor = app.input_cursor.saturating_sub(1),
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => app.input_cursor = 0,
        KeyCode::End => app.input_cursor = app.input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

async fn handle_confirm_key(app: &mut App, key: KeyEvent) {
    let Some(confirm) = app.confirm.take() else {
        return;
    };

    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => match confirm {
            Confirm::DeleteSession { id, .. } => delete_session(app, id).await,
            Confirm::DeleteAll => delete_all_sessions(app).await,
        },
        KeyCode::Char('n') | KeyCode::Esc => {}
        _ => app.confirm = Some(confirm),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Conversation actions
// ─────────────────────────────────────────────────────────────────────────

fn submit_input(app: &mut App) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    let Some(turn) = conversation.begin_send(&app.input) else {
        return;
    };

    let api = conversation.api().clone();
    let pending = turn.clone();
    app.send_tasks
        .push((turn, tokio::spawn(async move { pending.dispatch(&api).await })));

    app.input.clear();
    app.input_cursor = 0;
    app.status = None;
    app.sync_session_selection();
    app.scroll_to_bottom();
}

fn select_session(app: &mut App, id: SessionId) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    let request = conversation.begin_select(id);
    let api = conversation.api().clone();
    let pending = request.clone();
    abort_history(app);
    app.history_task = Some((request, tokio::spawn(async move { pending.dispatch(&api).await })));
    app.message_scroll = 0;
}

fn load_active_history(app: &mut App) {
    if let Some(id) = app.conversation.as_ref().map(|c| c.active_session().clone()) {
        select_session(app, id);
    }
}

fn abort_history(app: &mut App) {
    if let Some((_, handle)) = app.history_task.take() {
        handle.abort();
    }
}

async fn delete_session(app: &mut App, id: SessionId) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    let was_active = conversation.active_session() == &id;
    match conversation.delete_session(&id).await {
        Ok(()) => {
            app.status = Some("Chat deleted.".to_string());
            if was_active {
                abort_history(app);
                app.message_scroll = 0;
            }
        }
        Err(err) => app.status = Some(format!("Could not delete chat: {}", err)),
    }
    app.sync_session_selection();
}

async fn delete_all_sessions(app: &mut App) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    match conversation.delete_all_sessions().await {
        Ok(()) => {
            abort_history(app);
            app.message_scroll = 0;
            app.status = Some("All chats deleted.".to_string());
        }
        Err(err) => app.status = Some(format!("Could not delete chats: {}", err)),
    }
    app.sync_session_selection();
}

async fn clear_current_history(app: &mut App) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    match conversation.clear_current_history().await {
        Ok(()) => {
            app.message_scroll = 0;
            app.status = Some("Chat history cleared.".to_string());
        }
        Err(err) => app.status = Some(format!("Could not clear history: {}", err)),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Background task polling
// ─────────────────────────────────────────────────────────────────────────

fn join_failure(err: JoinError) -> ApiError {
    ApiError::TransportFailure(format!("Request task failed: {}", err))
}

/// Folds finished background requests back into the conversation.
pub async fn poll_tasks(app: &mut App) {
    // Sends started in other sessions may still be running alongside
    let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut app.send_tasks)
        .into_iter()
        .partition(|(_, h)| h.is_finished());
    app.send_tasks = running;
    for (turn, handle) in finished {
        let result = handle.await.unwrap_or_else(|err| Err(join_failure(err)));
        complete_send(app, turn, result);
    }

    if app.history_task.as_ref().is_some_and(|(_, h)| h.is_finished()) {
        if let Some((request, handle)) = app.history_task.take() {
            let result = handle.await.unwrap_or_else(|err| Err(join_failure(err)));
            if let Some(conversation) = app.conversation.as_mut() {
                if let Err(err) = conversation.complete_select(request, result) {
                    warn!(error = %err, "Failed to load chat history");
                }
            }
            app.sync_session_selection();
            app.scroll_to_bottom();
        }
    }

    if app.health_task.as_ref().is_some_and(|h| h.is_finished()) {
        if let Some(handle) = app.health_task.take() {
            let health = handle.await.unwrap_or_else(|err| Err(join_failure(err)));
            match &health {
                Ok(status) if status.is_healthy() => {}
                Ok(status) => warn!(status = %status.status, "Backend reports degraded health"),
                Err(err) => warn!(error = %err, "Backend health check failed"),
            }
            app.health = Some(health);
        }
    }
}

fn complete_send(app: &mut App, turn: PendingTurn, result: Result<Answer, ApiError>) {
    let Some(conversation) = app.conversation.as_mut() else {
        return;
    };

    match conversation.complete_send(turn, result) {
        SendOutcome::HardReset => {
            let reason = conversation.messages().last().map(|m| m.text().to_string());
            app.reset_after_rejected_keys(reason);
        }
        SendOutcome::Discarded => {
            app.status = Some("A reply for another chat was dropped.".to_string());
        }
        SendOutcome::Answered | SendOutcome::Failed(_) => {
            app.status = None;
            app.scroll_to_bottom();
        }
    }
}
