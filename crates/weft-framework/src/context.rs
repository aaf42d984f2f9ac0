//! Per-event context handed to every handler.

use std::sync::Arc;

use weft_core::{Client, Event, TransportResult};

use crate::command::{CommandMatch, Matches, PassiveMatch};

/// An event together with the account session it arrived on and whatever the
/// composite matched.
///
/// Cloning is cheap; every handler in a chain receives its own clone.
#[derive(Debug, Clone)]
pub struct EventContext {
    event: Arc<Event>,
    client: Client,
    matches: Arc<Matches>,
}

impl EventContext {
    pub fn new(event: Arc<Event>, client: Client, matches: Matches) -> Self {
        Self {
            event,
            client,
            matches: Arc::new(matches),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_arc(&self) -> Arc<Event> {
        Arc::clone(&self.event)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The active command this event matched, if any.
    pub fn command(&self) -> Option<&CommandMatch> {
        self.matches.command.as_ref()
    }

    /// Shorthand for an argument of the matched active command.
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.command().and_then(|cmd| cmd.argument(key))
    }

    /// All passive matches, in composite order.
    pub fn passive_matches(&self) -> &[PassiveMatch] {
        &self.matches.passive
    }

    /// The matches of one passive command.
    pub fn passive(&self, name: &str) -> Option<&PassiveMatch> {
        self.matches.passive.iter().find(|m| m.name == name)
    }

    /// Replies to the event with an `m.notice`.
    pub async fn reply(&self, body: &str) -> TransportResult<String> {
        self.client.reply(&self.event, body).await
    }

    /// Sends an `m.notice` into the event's room.
    pub async fn respond(&self, body: &str) -> TransportResult<String> {
        self.client.respond(&self.event, body).await
    }

    /// Sends an `m.text` message into the event's room.
    pub async fn send_text(&self, body: &str) -> TransportResult<String> {
        self.client.send_text(&self.event.room_id, body).await
    }

    pub async fn mark_read(&self) -> TransportResult<()> {
        self.client.mark_read(&self.event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, message};
    use std::collections::BTreeMap;

    #[test]
    fn test_accessors_and_outbound() {
        let transport = Arc::new(MockTransport::default());
        let client = Client::new("@bot:hs", transport.clone());
        let matches = Matches {
            command: Some(CommandMatch {
                command: "echo $text".into(),
                arguments: BTreeMap::from([("$text".to_string(), "hi".to_string())]),
            }),
            passive: vec![PassiveMatch {
                name: "word".into(),
                captures: vec![vec!["echo".into()], vec!["hi".into()]],
            }],
        };
        let ctx = EventContext::new(Arc::new(message("echo hi")), client, matches);

        assert_eq!(ctx.argument("$text"), Some("hi"));
        assert_eq!(ctx.passive("word").map(|m| m.captures.len()), Some(2));
        assert!(ctx.passive("other").is_none());

        tokio_test::block_on(async {
            ctx.send_text("one").await.unwrap();
            ctx.respond("two").await.unwrap();
            ctx.mark_read().await.unwrap();
        });

        let sent = transport.sent.lock();
        assert_eq!(sent[0].2["msgtype"], "m.text");
        assert_eq!(sent[1].2["msgtype"], "m.notice");
        assert!(sent[1].2.get("m.relates_to").is_none());
    }
}
