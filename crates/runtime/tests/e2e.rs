//! End-to-end tests: a `Runtime` driven with a scripted model and a
//! recording chat transport.

use apexclaw_agent::ProgressState;
use apexclaw_config::AppConfig;
use apexclaw_core::error::{ChannelError, ProviderError};
use apexclaw_core::message::{Message, Role};
use apexclaw_core::messaging::MessagingOps;
use apexclaw_core::provider::LlmClient;
use apexclaw_core::run_context::RunContext;
use apexclaw_runtime::{DispatchOutcome, InboundMessage, Runtime};
use apexclaw_workflow::{ScheduledTask, TaskRunner, format_time};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const OWNER: &str = "42";
const CHAT: i64 = 1001;

/// Replies from a queue, then repeats `fallback` if set. Records every
/// history it was sent.
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn repeating(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_history(&self) -> Vec<Message> {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        _ctx: &RunContext,
        _model_id: &str,
        history: &[Message],
    ) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(history.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Delivered {
        chat: i64,
        reply_to: Option<i64>,
        text: String,
    },
    Status {
        chat: i64,
        text: String,
    },
    Edited {
        message_id: i64,
    },
    Deleted {
        message_id: i64,
    },
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Sent>>,
}

impl Outbox {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn deliveries(&self) -> Vec<(i64, Option<i64>, String)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Delivered {
                    chat,
                    reply_to,
                    text,
                } => Some((chat, reply_to, text)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingOps for Outbox {
    async fn deliver(
        &self,
        telegram_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Delivered {
            chat: telegram_id,
            reply_to,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_message(&self, telegram_id: i64, text: &str) -> Result<i64, ChannelError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent::Status {
            chat: telegram_id,
            text: text.to_string(),
        });
        Ok(500 + sent.len() as i64)
    }

    async fn edit_message(
        &self,
        _telegram_id: i64,
        message_id: i64,
        _text: &str,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Edited { message_id });
        Ok(())
    }

    async fn delete_message(&self, _telegram_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Deleted { message_id });
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    runtime: Arc<Runtime>,
    client: Arc<ScriptedClient>,
    outbox: Arc<Outbox>,
}

fn harness(client: Arc<ScriptedClient>) -> Harness {
    harness_with(client, |_| {})
}

fn harness_with(client: Arc<ScriptedClient>, tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.owner_id = OWNER.into();
    config.heartbeat.path = Some(dir.path().join("heartbeat.json"));
    tweak(&mut config);

    let outbox = Arc::new(Outbox::default());
    let runtime = Runtime::new(&config, client.clone(), outbox.clone());
    Harness {
        _dir: dir,
        runtime,
        client,
        outbox,
    }
}

fn message(text: &str) -> InboundMessage {
    InboundMessage::new(OWNER, CHAT, text).with_message_id(7)
}

/// Fire every task due at `now` and wait for the workers.
async fn fire_due(h: &Harness, now: chrono::DateTime<Utc>) -> usize {
    let runner: Arc<dyn TaskRunner> = h.runtime.clone();
    let messaging: Arc<dyn MessagingOps> = h.outbox.clone();
    let handles = h.runtime.scheduler().run_due(now, &runner, &messaging);
    let fired = handles.len();
    for handle in handles {
        handle.await.unwrap();
    }
    fired
}

fn due_task(label: &str, owner: &str, now: chrono::DateTime<Utc>) -> ScheduledTask {
    ScheduledTask::new(label, format!("run {label}"), now + TimeDelta::seconds(2))
        .with_owner(owner)
        .with_chat(555, 9)
}

#[tokio::test]
async fn no_tool_turn() {
    let h = harness(ScriptedClient::new(&["hi there"]));

    let outcome = h.runtime.dispatch(message("hello")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reply("hi there".into()));

    let session = h.runtime.sessions().get(OWNER).unwrap();
    let history = session.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, Role::System);
    assert!(history[1].content.ends_with("\nhello"));
    assert_eq!(history[2].content, "hi there");

    assert_eq!(
        h.outbox.deliveries(),
        vec![(CHAT, Some(7), "hi there".to_string())]
    );
}

#[tokio::test]
async fn single_tool_turn() {
    let h = harness(ScriptedClient::new(&[
        "<tool_call>datetime /></tool_call>",
        "It's 22:39 IST.",
    ]));

    let outcome = h.runtime.dispatch(message("what time is it?")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reply("It's 22:39 IST.".into()));

    let history = h.runtime.sessions().get(OWNER).unwrap().history();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert!(history[3].content.starts_with("[Tool result: datetime]"));
    assert!(history[3].content.ends_with("Please continue."));

    // Tool markers never reach the chat.
    assert_eq!(h.outbox.deliveries().len(), 1);
    assert_eq!(h.outbox.deliveries()[0].2, "It's 22:39 IST.");
}

#[tokio::test]
async fn unknown_tool_continues_loop() {
    let h = harness(ScriptedClient::new(&[
        r#"<tool_call>no_such arg="x" /></tool_call>"#,
        "Sorry, I can't do that.",
    ]));

    let outcome = h.runtime.dispatch(message("do something odd")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reply("Sorry, I can't do that.".into()));

    let seen = h.client.last_history();
    let tool_result = &seen.last().unwrap().content;
    assert!(tool_result.contains(r#"unknown tool "no_such""#));
    assert!(tool_result.contains("Try a different method"));
    assert!(tool_result.contains("schedule_task"));
}

#[tokio::test]
async fn secure_tool_denied_for_non_owner() {
    let h = harness(ScriptedClient::new(&[
        r#"<tool_call>shell command="touch /tmp/apexclaw-should-not-exist" /></tool_call>"#,
        "ok",
    ]));

    let stranger = InboundMessage::new("99", CHAT, "run it");
    h.runtime.dispatch(stranger).await.unwrap();

    let tool_result = h.client.last_history().last().unwrap().content.clone();
    assert!(tool_result.contains(
        "Access denied: tool \"shell\" is restricted to the bot owner."
    ));
}

#[tokio::test]
async fn budget_exhaustion() {
    let h = harness_with(
        ScriptedClient::repeating("<tool_call>datetime /></tool_call>"),
        |c| c.agent.max_iterations = 3,
    );

    let outcome = h.runtime.dispatch(message("loop forever")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::BudgetExhausted);
    assert_eq!(h.client.calls(), 3);

    let delivered = &h.outbox.deliveries()[0].2;
    assert!(delivered.contains("ran out of steps"));
    assert!(!delivered.contains("[MAX_ITERATIONS]"));
}

#[tokio::test]
async fn deep_work_raises_budget_for_the_run() {
    let mut script = vec![r#"<tool_call>deep_work max_steps="6" plan="check twice" /></tool_call>"#];
    script.extend(std::iter::repeat_n("<tool_call>datetime /></tool_call>", 4));
    script.push("done");
    let h = harness_with(ScriptedClient::new(&script), |c| c.agent.max_iterations = 3);

    let outcome = h.runtime.dispatch(message("big job")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reply("done".into()));
    assert_eq!(h.client.calls(), 6);

    // The raised budget ends with the run.
    let session = h.runtime.sessions().get(OWNER).unwrap();
    assert_eq!(session.iteration_budget(), 3);
}

#[tokio::test]
async fn schedule_via_tool_then_fire() {
    let h = harness(ScriptedClient::new(&[
        r#"<tool_call>schedule_task label="ping" prompt="say pong" in_minutes="1" /></tool_call>"#,
        "Done, I'll ping you.",
        "pong",
    ]));

    h.runtime.dispatch(message("ping me in a minute")).await.unwrap();

    let task = h.runtime.scheduler().get("ping").unwrap();
    assert_eq!(task.telegram_id, CHAT);
    assert_eq!(task.message_id, 7);
    assert_eq!(task.owner_id, OWNER);

    let runner: Arc<dyn TaskRunner> = h.runtime.clone();
    let messaging: Arc<dyn MessagingOps> = h.outbox.clone();
    let handles = h.runtime.scheduler().run_due(
        Utc::now() + TimeDelta::minutes(2),
        &runner,
        &messaging,
    );
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(h.runtime.scheduler().get("ping").is_none());
    let deliveries = h.outbox.deliveries();
    assert_eq!(deliveries.last().unwrap(), &(CHAT, Some(7), "pong".to_string()));

    // The heartbeat ran in a fresh session: system + prompt only.
    let seen = h.client.last_history();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].content.ends_with("\nsay pong"));
}

#[tokio::test]
async fn recurring_task_advances_past_now() {
    let h = harness(ScriptedClient::repeating("tick"));
    let now = Utc::now();
    let old_run_at = now - TimeDelta::seconds(90);
    let task = ScheduledTask::new("hourly-check", "check the feed", old_run_at)
        .with_repeat("hourly")
        .with_owner(OWNER)
        .with_chat(CHAT, 0);
    h.runtime.scheduler().schedule_at(task, now).unwrap();

    let runner: Arc<dyn TaskRunner> = h.runtime.clone();
    let messaging: Arc<dyn MessagingOps> = h.outbox.clone();
    let handles = h.runtime.scheduler().run_due(now, &runner, &messaging);
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }

    let rescheduled = h.runtime.scheduler().get("hourly-check").unwrap();
    assert_eq!(rescheduled.run_at, format_time(old_run_at + TimeDelta::hours(1)));
    assert_eq!(h.outbox.deliveries(), vec![(CHAT, None, "tick".to_string())]);

    // Not due again on the same tick.
    assert!(h.runtime.scheduler().run_due(now, &runner, &messaging).is_empty());
}

#[tokio::test]
async fn progress_is_shown_then_cleared() {
    let h = harness(ScriptedClient::new(&[
        r#"<tool_call>report_progress percent="40" message="Reading files" /></tool_call>"#,
        r#"<tool_call>report_progress percent="80" message="Writing summary" /></tool_call>"#,
        "All done.",
    ]));

    h.runtime.dispatch(message("summarize")).await.unwrap();

    let sent = h.outbox.sent();
    let status_id = match &sent[0] {
        Sent::Status { chat, text } => {
            assert_eq!(*chat, CHAT);
            assert!(text.contains("Reading files"));
            501
        }
        other => panic!("expected status message first, got {other:?}"),
    };
    assert_eq!(sent[1], Sent::Edited { message_id: status_id });
    assert!(matches!(&sent[2], Sent::Delivered { text, .. } if text == "All done."));
    assert_eq!(sent[3], Sent::Deleted { message_id: status_id });

    let ctx = h.runtime.contexts().get(OWNER).unwrap();
    assert_eq!(ctx.progress_message_id, None);
}

#[tokio::test]
async fn model_error_is_propagated_and_not_delivered() {
    let h = harness(ScriptedClient::new(&[]));

    let err = h.runtime.dispatch(message("hello")).await.unwrap_err();
    assert!(err.to_string().starts_with("model: "));
    assert!(h.outbox.deliveries().is_empty());
}

#[tokio::test]
async fn reset_and_delete_sessions() {
    let h = harness(ScriptedClient::repeating("hi"));
    h.runtime.dispatch(message("one")).await.unwrap();
    h.runtime.dispatch(message("two")).await.unwrap();

    let session = h.runtime.sessions().get(OWNER).unwrap();
    assert_eq!(session.history_len(), 5);

    assert!(h.runtime.reset_session(OWNER));
    assert_eq!(session.history_len(), 1);

    assert!(h.runtime.delete_session(OWNER));
    assert!(h.runtime.sessions().get(OWNER).is_none());
    assert!(h.runtime.contexts().get(OWNER).is_none());
    assert!(!h.runtime.reset_session(OWNER));
}

#[tokio::test]
async fn heartbeat_disabled_does_not_start() {
    let h = harness_with(ScriptedClient::new(&[]), |c| c.heartbeat.enabled = false);
    let shutdown = tokio_util::sync::CancellationToken::new();
    assert!(h.runtime.start_scheduler(shutdown).is_none());
}

#[tokio::test]
async fn scheduled_progress_is_cleared_after_delivery() {
    let h = harness(ScriptedClient::new(&[
        "hi",
        r#"<tool_call>report_progress percent="10" message="Checking" /></tool_call>"#,
        "done",
    ]));
    h.runtime.dispatch(message("hello")).await.unwrap();

    let now = Utc::now();
    h.runtime.scheduler().schedule_at(due_task("check", OWNER, now), now).unwrap();
    assert_eq!(fire_due(&h, now + TimeDelta::minutes(1)).await, 1);

    let sent = h.outbox.sent();
    assert_eq!(sent.len(), 4);
    assert!(matches!(&sent[1], Sent::Status { chat: 555, text } if text.contains("Checking")));
    assert_eq!(
        sent[2],
        Sent::Delivered {
            chat: 555,
            reply_to: Some(9),
            text: "done".into()
        }
    );
    assert_eq!(sent[3], Sent::Deleted { message_id: 502 });

    // Nothing from the scheduled run is left behind.
    assert_eq!(h.runtime.progress().state(OWNER), ProgressState::Idle);
    assert_eq!(h.runtime.sessions().len(), 1);
}

#[tokio::test]
async fn scheduled_run_leaves_interactive_state_alone() {
    let h = harness(ScriptedClient::new(&[
        "hi",
        r#"<tool_call>deep_work max_steps="20" plan="dig in" /></tool_call>"#,
        "done",
    ]));
    h.runtime.dispatch(message("hello")).await.unwrap();
    let interactive = h.runtime.sessions().get(OWNER).unwrap();
    let default_budget = interactive.iteration_budget();

    let now = Utc::now();
    h.runtime.scheduler().schedule_at(due_task("dig", OWNER, now), now).unwrap();
    fire_due(&h, now + TimeDelta::minutes(1)).await;

    // The deep_work call landed on the scheduled run's own session.
    let seen = h.client.last_history();
    let result = &seen.last().unwrap().content;
    assert!(result.starts_with("[Tool result: deep_work]\nDeep work mode active"), "{result}");
    assert_eq!(interactive.iteration_budget(), default_budget);

    let ctx = h.runtime.contexts().get(OWNER).unwrap();
    assert_eq!((ctx.telegram_id, ctx.message_id), (CHAT, 7));
    assert_eq!(ctx.chat_type, "private");
    assert_eq!(h.runtime.sessions().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn scheduled_secure_tools_follow_the_task_owner() {
    let shell = r#"<tool_call>shell command="echo hi" /></tool_call>"#;
    let h = harness(ScriptedClient::new(&[shell, "ok", shell, "ok"]));
    let now = Utc::now();
    h.runtime.scheduler().schedule_at(due_task("mine", OWNER, now), now).unwrap();
    fire_due(&h, now + TimeDelta::minutes(1)).await;
    let owner_result = h.client.last_history().last().unwrap().content.clone();
    assert!(owner_result.starts_with("[Tool result: shell]\nhi"), "{owner_result}");

    h.runtime.scheduler().schedule_at(due_task("theirs", "77", now), now).unwrap();
    fire_due(&h, now + TimeDelta::minutes(1)).await;
    let other_result = h.client.last_history().last().unwrap().content.clone();
    assert!(other_result.contains("Access denied"), "{other_result}");
}

#[tokio::test]
async fn task_tools_are_scoped_to_the_caller() {
    let h = harness(ScriptedClient::new(&[
        r#"<tool_call>list_tasks /></tool_call>"#,
        "listed",
        r#"<tool_call>cancel_task label="owners" /></tool_call>"#,
        "tried",
        r#"<tool_call>list_tasks /></tool_call>"#,
        "listed",
    ]));
    let now = Utc::now();
    let later = now + TimeDelta::hours(1);
    h.runtime.scheduler().schedule_at(due_task("owners", OWNER, later), now).unwrap();
    h.runtime.scheduler().schedule_at(due_task("guests", "77", later), now).unwrap();

    let guest = || InboundMessage::new("77", 2002, "tasks?");
    h.runtime.dispatch(guest()).await.unwrap();
    let listing = h.client.last_history().last().unwrap().content.clone();
    assert!(listing.contains("guests") && !listing.contains("owners"), "{listing}");

    h.runtime.dispatch(guest()).await.unwrap();
    assert!(h.runtime.scheduler().get("owners").is_some());

    h.runtime.dispatch(message("tasks?")).await.unwrap();
    let listing = h.client.last_history().last().unwrap().content.clone();
    assert!(listing.contains("guests") && listing.contains("owners"), "{listing}");
}
