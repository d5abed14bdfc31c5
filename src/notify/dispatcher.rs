//! Notification pass: remind owners of every due task exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::messages;
use crate::channels::{ChatChannel, EmailSender};
use crate::error::{ChannelError, Result};
use crate::settings::{SettingsResolver, UserSettings};
use crate::store::Database;
use crate::tasks::{Task, TaskQueries};
use crate::timezone;

/// Which channel a reminder went out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Chat,
    Email,
    /// Both channels disabled or unavailable; the task is still finished.
    Suppressed,
}

/// What happened to one due task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Claimed and a send was attempted (or deliberately suppressed).
    Notified {
        delivery: Delivery,
        send_ok: bool,
    },
    /// Another pass finished the task first.
    AlreadyFinished,
}

/// Summary of one notification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Due tasks found at the start of the pass.
    pub due: usize,
    /// Tasks marked finished by this pass.
    pub notified: usize,
    pub via_chat: usize,
    pub via_email: usize,
    pub suppressed: usize,
    /// Sends that were attempted but failed.
    pub send_errors: usize,
    /// Tasks skipped because settings or formatting failed. They stay due.
    pub failed: usize,
}

/// Sends reminders for due tasks.
pub struct NotificationDispatcher {
    db: Arc<dyn Database>,
    queries: TaskQueries,
    settings: Arc<SettingsResolver>,
    chat: Arc<dyn ChatChannel>,
    email: Arc<dyn EmailSender>,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        settings: Arc<SettingsResolver>,
        chat: Arc<dyn ChatChannel>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            queries: TaskQueries::new(Arc::clone(&db)),
            db,
            settings,
            chat,
            email,
        }
    }

    /// Remind the owner of every task due at `now` and mark each finished.
    ///
    /// The due list is materialized up front, so stopping between tasks is
    /// safe. A failure on one task never stops the others.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let due = self.queries.tasks_due(now).await?;
        let mut report = PassReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            debug!("No due tasks");
            return Ok(report);
        }

        for task in &due {
            match self.process(task).await {
                Ok(TaskOutcome::Notified { delivery, send_ok }) => {
                    report.notified += 1;
                    match delivery {
                        Delivery::Chat => report.via_chat += 1,
                        Delivery::Email => report.via_email += 1,
                        Delivery::Suppressed => report.suppressed += 1,
                    }
                    if !send_ok {
                        report.send_errors += 1;
                    }
                }
                Ok(TaskOutcome::AlreadyFinished) => {
                    debug!(task_id = %task.id, "Task already finished by another pass");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(task_id = %task.id, owner = %task.owner, error = %e, "Failed to process due task");
                }
            }
        }

        info!(
            due = report.due,
            notified = report.notified,
            via_chat = report.via_chat,
            via_email = report.via_email,
            send_errors = report.send_errors,
            failed = report.failed,
            "Notification pass complete"
        );
        Ok(report)
    }

    /// Handle a single due task.
    pub async fn process(&self, task: &Task) -> Result<TaskOutcome> {
        let settings = self.settings.get_by_owner(&task.owner).await?;
        let due_text = timezone::format(task.due_on, &settings.timezone)?;

        // Claim before sending: only one pass can win the transition.
        if !self.db.mark_task_finished(task.id).await? {
            return Ok(TaskOutcome::AlreadyFinished);
        }

        let delivery = self.choose_delivery(&settings).await;
        let sent = match delivery {
            Delivery::Chat => {
                let text = messages::chat_text(&task.description, &due_text);
                self.chat.send_message(&settings.chat_address, &text).await
            }
            Delivery::Email => {
                let body = messages::email_body(&task.description, &due_text);
                self.email
                    .send_email(
                        self.email.from_address(),
                        &settings.email,
                        messages::EMAIL_SUBJECT,
                        &body,
                    )
                    .await
            }
            Delivery::Suppressed => {
                info!(task_id = %task.id, owner = %task.owner, "Reminder suppressed: no delivery channel enabled");
                Ok(())
            }
        };

        let send_ok = match sent {
            Ok(()) => {
                debug!(task_id = %task.id, delivery = ?delivery, "Reminder sent");
                true
            }
            Err(e) => {
                log_send_failure(task, delivery, &e);
                false
            }
        };

        Ok(TaskOutcome::Notified { delivery, send_ok })
    }

    /// Chat only reaches addresses the owner has verified with `/verify`.
    async fn choose_delivery(&self, settings: &UserSettings) -> Delivery {
        if settings.chat_enabled && settings.verified {
            match self.chat.is_present(&settings.chat_address).await {
                Ok(true) => return Delivery::Chat,
                Ok(false) => {}
                Err(e) => {
                    warn!(owner = %settings.owner, error = %e, "Presence lookup failed, falling back to email");
                }
            }
        }
        if settings.email_enabled {
            Delivery::Email
        } else {
            Delivery::Suppressed
        }
    }
}

fn log_send_failure(task: &Task, delivery: Delivery, err: &ChannelError) {
    warn!(
        task_id = %task.id,
        owner = %task.owner,
        delivery = ?delivery,
        error = %err,
        "Reminder send failed; task stays finished"
    );
}

/// Spawn a background task that runs a notification pass every `interval`.
pub fn spawn_notification_ticker(
    dispatcher: Arc<NotificationDispatcher>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Passes must not pile up behind a slow one.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = dispatcher.run_pass(Utc::now()).await {
                error!(error = %e, "Notification pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::{RecordingChat, RecordingEmail};
    use crate::identity::Identity;
    use crate::settings::{ResolverConfig, SettingsUpdate};
    use crate::store::LibSqlBackend;
    use crate::tasks::TaskDraft;

    struct Fixture {
        dispatcher: NotificationDispatcher,
        db: Arc<dyn Database>,
        settings: Arc<SettingsResolver>,
        chat: Arc<RecordingChat>,
        email: Arc<RecordingEmail>,
    }

    async fn fixture_with(chat: RecordingChat, email: RecordingEmail) -> Fixture {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let settings = Arc::new(SettingsResolver::new(
            Arc::clone(&db),
            ResolverConfig::default(),
        ));
        let chat = Arc::new(chat);
        let email = Arc::new(email);
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&db),
            Arc::clone(&settings),
            chat.clone(),
            email.clone(),
        );
        Fixture {
            dispatcher,
            db,
            settings,
            chat,
            email,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingChat::default(), RecordingEmail::default()).await
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn identity(name: &str) -> Identity {
        Identity::new(name, format!("{name}@example.com"))
    }

    async fn add_task(f: &Fixture, owner: &str, description: &str, due: &str) -> Task {
        f.settings.get_or_create(&identity(owner)).await.unwrap();
        let mut task = Task::new(
            owner,
            TaskDraft::from_input(description, "2000-01-01 - 00:00:00", "UTC").unwrap(),
        );
        task.due_on = utc(due);
        f.db.insert_task(&task).await.unwrap();
        task
    }

    async fn verify(f: &Fixture, owner: &str) {
        let settings = f.settings.get_or_create(&identity(owner)).await.unwrap();
        assert!(f.settings.verify(owner, &settings.api_key).await.unwrap());
    }

    #[tokio::test]
    async fn due_tasks_are_notified_once_and_finished() {
        let f = fixture().await;
        let a = add_task(&f, "alice", "Pay rent", "2024-01-01T12:00:00Z").await;
        let b = add_task(&f, "bob", "Feed cat", "2024-01-01T11:00:00Z").await;
        let later = add_task(&f, "alice", "Later", "2024-01-02T00:00:00Z").await;

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.notified, 2);
        assert_eq!(report.via_email, 2);
        assert_eq!(f.email.sent().len(), 2);

        assert!(f.db.get_task(a.id).await.unwrap().unwrap().finished);
        assert!(f.db.get_task(b.id).await.unwrap().unwrap().finished);
        assert!(!f.db.get_task(later.id).await.unwrap().unwrap().finished);
    }

    #[tokio::test]
    async fn second_pass_sends_nothing() {
        let f = fixture().await;
        add_task(&f, "alice", "Pay rent", "2024-01-01T12:00:00Z").await;
        let now = utc("2024-01-01T12:00:00Z");

        assert_eq!(f.dispatcher.run_pass(now).await.unwrap().notified, 1);
        let second = f.dispatcher.run_pass(now).await.unwrap();
        assert_eq!(second, PassReport::default());
        assert_eq!(f.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn present_users_get_chat() {
        let f = fixture_with(
            RecordingChat::with_online(&["alice@example.com"]),
            RecordingEmail::default(),
        )
        .await;
        add_task(&f, "alice", "Pay rent", "2024-01-01T12:00:00Z").await;
        add_task(&f, "bob", "Feed cat", "2024-01-01T12:00:00Z").await;
        verify(&f, "alice").await;

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.via_chat, 1);
        assert_eq!(report.via_email, 1);

        let chats = f.chat.sent();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].to, "alice@example.com");
        assert!(chats[0].text.contains("Pay rent"));

        let emails = f.email.sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, "bob@example.com");
        assert_eq!(emails[0].from, "agenda@example.com");
        assert_eq!(emails[0].subject, "Task due");
    }

    #[tokio::test]
    async fn unverified_chat_address_gets_email() {
        let f = fixture_with(
            RecordingChat::with_online(&["alice@example.com"]),
            RecordingEmail::default(),
        )
        .await;
        // Mallory claims alice's chat address but cannot verify it.
        add_task(&f, "mallory", "Private note", "2024-01-01T12:00:00Z").await;
        f.settings
            .update(
                &identity("mallory"),
                &SettingsUpdate {
                    chat_address: Some("alice@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.via_chat, 0);
        assert_eq!(report.via_email, 1);
        assert!(f.chat.sent().is_empty());
        assert_eq!(f.email.sent()[0].to, "mallory@example.com");
    }

    #[tokio::test]
    async fn message_uses_owner_timezone() {
        let f = fixture().await;
        add_task(&f, "alice", "Pay rent", "2024-01-01T12:00:00Z").await;
        f.settings
            .update(
                &identity("alice"),
                &SettingsUpdate {
                    timezone: Some("America/Sao_Paulo".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        let emails = f.email.sent();
        assert!(emails[0].body.contains("(2024-01-01 - 09:00:00 - -03)"));
    }

    #[tokio::test]
    async fn send_failures_do_not_abort_pass() {
        let f = fixture_with(
            RecordingChat::default(),
            RecordingEmail {
                fail_sends: true,
                ..Default::default()
            },
        )
        .await;
        let a = add_task(&f, "alice", "One", "2024-01-01T10:00:00Z").await;
        let b = add_task(&f, "bob", "Two", "2024-01-01T11:00:00Z").await;

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.notified, 2);
        assert_eq!(report.send_errors, 2);
        assert_eq!(f.email.sent().len(), 2, "one attempt per task");
        assert!(f.db.get_task(a.id).await.unwrap().unwrap().finished);
        assert!(f.db.get_task(b.id).await.unwrap().unwrap().finished);
    }

    #[tokio::test]
    async fn missing_settings_skip_only_that_task() {
        let f = fixture().await;
        let ok = add_task(&f, "alice", "Fine", "2024-01-01T10:00:00Z").await;
        let orphan = Task::new(
            "ghost",
            TaskDraft::from_input("Orphan", "2024-01-01 - 09:00:00", "UTC").unwrap(),
        );
        f.db.insert_task(&orphan).await.unwrap();

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.notified, 1);
        assert_eq!(report.failed, 1);
        assert!(f.db.get_task(ok.id).await.unwrap().unwrap().finished);
        assert!(!f.db.get_task(orphan.id).await.unwrap().unwrap().finished);
    }

    #[tokio::test]
    async fn disabled_channels_are_respected() {
        let f = fixture_with(
            RecordingChat::with_online(&["alice@example.com"]),
            RecordingEmail::default(),
        )
        .await;
        let task = add_task(&f, "alice", "Quiet", "2024-01-01T10:00:00Z").await;
        f.settings
            .update(
                &identity("alice"),
                &SettingsUpdate {
                    chat_enabled: Some(false),
                    email_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.suppressed, 1);
        assert!(f.chat.sent().is_empty());
        assert!(f.email.sent().is_empty());
        assert!(f.db.get_task(task.id).await.unwrap().unwrap().finished);
    }

    #[tokio::test]
    async fn chat_disabled_falls_back_to_email_even_when_present() {
        let f = fixture_with(
            RecordingChat::with_online(&["alice@example.com"]),
            RecordingEmail::default(),
        )
        .await;
        add_task(&f, "alice", "Mail me", "2024-01-01T10:00:00Z").await;
        verify(&f, "alice").await;
        f.settings
            .update(
                &identity("alice"),
                &SettingsUpdate {
                    chat_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = f.dispatcher.run_pass(utc("2024-01-01T12:00:00Z")).await.unwrap();
        assert_eq!(report.via_email, 1);
        assert!(f.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn overlapping_passes_do_not_double_notify() {
        let f = fixture().await;
        for i in 0..5 {
            add_task(&f, "alice", &format!("Task {i}"), "2024-01-01T10:00:00Z").await;
        }
        let now = utc("2024-01-01T12:00:00Z");

        let (r1, r2) = tokio::join!(f.dispatcher.run_pass(now), f.dispatcher.run_pass(now));
        let total = r1.unwrap().notified + r2.unwrap().notified;
        assert_eq!(total, 5);
        assert_eq!(f.email.sent().len(), 5);
    }

    #[tokio::test]
    async fn ticker_runs_passes() {
        let f = fixture().await;
        let past = Utc::now() - chrono::Duration::minutes(1);
        add_task(&f, "alice", "Tick", &past.to_rfc3339()).await;

        let dispatcher = Arc::new(f.dispatcher);
        let handle = spawn_notification_ticker(Arc::clone(&dispatcher), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(f.email.sent().len(), 1);
    }
}
