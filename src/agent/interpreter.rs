use serde_json::Value;

use super::oracle::{Oracle, OracleError, OracleRequest};
use super::prompts;

/// Normalize the caller's agent tag to one the summary prompt knows.
pub fn agent_label(agent: Option<&str>) -> &'static str {
    match agent.map(|a| a.trim().to_ascii_lowercase()).as_deref() {
        Some("calendar") => "calendar",
        Some("tasks") | Some("task") => "tasks",
        Some("gmail") | Some("email") => "gmail",
        _ => "generic",
    }
}

/// Turn a result payload into prose. One oracle call; the reply is returned as-is.
pub async fn summarize(
    oracle: &dyn Oracle,
    agent: Option<&str>,
    payload: &Value,
) -> Result<String, OracleError> {
    let label = agent_label(agent);
    let pretty = serde_json::to_string_pretty(payload)
        .map_err(|e| OracleError::InvalidFormat(format!("payload is not serializable: {}", e)))?;

    let request = OracleRequest {
        system: prompts::summary_prompt().to_string(),
        user: format!("Agent type: {}\nJSON:\n{}", label, pretty),
        json: false,
    };
    oracle.complete(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::oracle::tests::ScriptedOracle;
    use serde_json::json;

    #[test]
    fn unknown_agents_are_generic() {
        assert_eq!(agent_label(Some("Calendar")), "calendar");
        assert_eq!(agent_label(Some("email")), "gmail");
        assert_eq!(agent_label(Some("weather")), "generic");
        assert_eq!(agent_label(None), "generic");
    }

    #[tokio::test]
    async fn reply_is_returned_verbatim() {
        let oracle = ScriptedOracle::replying(&["You have one meeting tomorrow at 3 PM.\n"]);
        let payload = json!({ "events": [{ "summary": "team sync" }] });

        let text = summarize(&oracle, Some("calendar"), &payload).await.unwrap();
        assert_eq!(text, "You have one meeting tomorrow at 3 PM.\n");

        let request = oracle.requests.lock().unwrap()[0].clone();
        assert!(!request.json);
        assert!(request.user.starts_with("Agent type: calendar\nJSON:\n"));
        assert!(request.user.contains("team sync"));
    }
}
