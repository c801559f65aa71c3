//! Prompt-to-action pipeline: oracle, normalizer, dispatcher.

pub mod date_context;
pub mod dispatch;
pub mod intent;
pub mod interpreter;
pub mod normalize;
pub mod oracle;
pub mod prompts;

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::google::RemoteClients;
use date_context::DateContext;
use dispatch::ActionResult;
use intent::Domain;
use oracle::{Oracle, OracleError, OracleGateway};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Shared, stateless request handler. Every call resolves a fresh `DateContext`.
#[derive(Clone)]
pub struct Agent {
    oracle: Arc<dyn Oracle>,
    offset: FixedOffset,
    tz_name: String,
    clock: Clock,
}

impl Agent {
    pub fn new(oracle: Arc<dyn Oracle>, config: &Config) -> Self {
        Self {
            oracle,
            offset: config.tz_offset,
            tz_name: config.tz_name.clone(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to pin "now" in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn date_context(&self) -> DateContext {
        DateContext::resolve((self.clock)().with_timezone(&self.offset))
    }

    pub fn tz_name(&self) -> &str {
        &self.tz_name
    }

    /// Interpret one prompt for `domain` and carry it out.
    pub async fn handle(&self, domain: Domain, prompt: &str, clients: &RemoteClients) -> ActionResult {
        let start = Instant::now();
        let ctx = self.date_context();

        let raw = match OracleGateway::new(self.oracle.as_ref())
            .interpret(domain, prompt, &ctx)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                let result = ActionResult::from(&e);
                warn!(%domain, error = %e, "Oracle gave no usable reply");
                return result;
            }
        };

        let intent = match normalize::normalize(raw.as_str(), domain, &ctx) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(%domain, kind = %e.kind, detail = %e.detail, raw = %e.raw, "Could not normalize oracle reply");
                return ActionResult::from(&e);
            }
        };
        debug!(%domain, intent = ?intent, "Normalized intent");

        let result = dispatch::dispatch(&intent, clients, &ctx, &self.tz_name).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %domain,
            action = intent.action(),
            success = result.success,
            elapsed_ms,
            "Prompt handled"
        );
        result
    }

    pub async fn summarize(&self, agent: Option<&str>, payload: &Value) -> Result<String, OracleError> {
        interpreter::summarize(self.oracle.as_ref(), agent, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::google::tests::{FakeCalendar, FakeMail, FakeTasks, clients, task};
    use oracle::tests::ScriptedOracle;

    fn pinned(oracle: ScriptedOracle) -> (Agent, Arc<ScriptedOracle>) {
        let oracle = Arc::new(oracle);
        let agent = Agent::new(oracle.clone(), &Config::default()).with_clock(|| {
            DateTime::parse_from_rfc3339("2024-06-10T04:30:00Z")
                .unwrap()
                .with_timezone(&Utc)
        });
        (agent, oracle)
    }

    #[test]
    fn date_context_uses_configured_offset() {
        let (agent, _) = pinned(ScriptedOracle::replying(&[]));
        let ctx = agent.date_context();
        assert_eq!(ctx.now.to_rfc3339(), "2024-06-10T10:00:00+05:30");
        assert_eq!(ctx.tomorrow_date.to_string(), "2024-06-11");
    }

    #[tokio::test]
    async fn schedules_team_sync_end_to_end() {
        let (agent, oracle) = pinned(ScriptedOracle::replying(&[
            r#"{"action":"add_event","title":"team sync","date":"2024-06-11","time":"15:00","duration_minutes":30}"#,
        ]));
        let calendar = Arc::new(FakeCalendar::default());
        let remote = clients(calendar.clone(), Arc::default(), Arc::default());

        let result = agent
            .handle(
                Domain::Calendar,
                "Schedule team sync tomorrow at 3pm for 30 minutes",
                &remote,
            )
            .await;

        assert!(result.success, "{:?}", result);
        assert_eq!(oracle.calls(), 1);
        let stored = calendar.events.lock().unwrap()[0].clone();
        assert_eq!(stored.summary.as_deref(), Some("team sync"));
        let start = stored.start.unwrap();
        assert_eq!(
            start.date_time.unwrap().to_rfc3339(),
            "2024-06-11T15:00:00+05:30"
        );
        assert_eq!(start.time_zone.as_deref(), Some("Asia/Kolkata"));
    }

    #[tokio::test]
    async fn malformed_reply_makes_no_remote_call() {
        let (agent, _) = pinned(ScriptedOracle::replying(&["not json"]));
        let calendar = Arc::new(FakeCalendar::default());
        let remote = clients(calendar.clone(), Arc::default(), Arc::default());

        let result = agent.handle(Domain::Calendar, "whatever", &remote).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::MalformedOutput));
        assert_eq!(result.diagnostic.as_deref().map(|d| d.contains("not json")), Some(true));
        assert!(calendar.windows.lock().unwrap().is_empty());
        assert!(calendar.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oracle_outage_is_reported_not_raised() {
        let (agent, _) = pinned(ScriptedOracle::failing(OracleError::Auth("no key".into())));
        let remote = clients(Arc::default(), Arc::default(), Arc::default());

        let result = agent.handle(Domain::Email, "read my mail", &remote).await;
        assert_eq!(result.error_kind, Some(ErrorKind::RemoteUnavailable));
    }

    #[tokio::test]
    async fn deletes_named_task_with_one_call() {
        let (agent, _) = pinned(ScriptedOracle::replying(&[
            r#"{"action":"delete","tasklistId":"@default","title":"DBMS assignment"}"#,
        ]));
        let tasks = Arc::new(FakeTasks::with_tasks(
            "@default",
            vec![task("t7", "DBMS assignment")],
        ));
        let remote = clients(Arc::default(), Arc::new(FakeMail::default()), tasks.clone());

        let result = agent
            .handle(Domain::Tasks, "Delete the DBMS assignment task", &remote)
            .await;

        assert!(result.success);
        assert_eq!(tasks.deleted.lock().unwrap().len(), 1);
        assert_eq!(tasks.deleted.lock().unwrap()[0].1, "t7");
    }
}
