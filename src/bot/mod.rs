//! The long-running bot: sync loop, event dispatch, and checkpointing.
//!
//! This is a personal bot - it runs on the owner's own account and only
//! reacts to that account's events. Reacting to an image with a collect
//! keyword pulls it into the collection; sending a `!sticker` message runs
//! the command router and edits the result into the original message.

mod collect;
mod commands;

pub use collect::Collector;
pub use commands::CommandRouter;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::matrix::{extract_image_data, server_name_of_user, InboundEvent, Transport};
use crate::publish::Publisher;
use crate::storage::{CollectionStore, PackStore};
use crate::vision::Captioner;

/// Reaction keys that trigger collection of the reacted-to image.
const COLLECT_KEYWORDS: [&str; 3] = ["!yoink", "!nom", "!grab"];

const SYNC_TIMEOUT_MS: u64 = 30_000;
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(3600);

pub struct Bot {
    transport: Arc<dyn Transport>,
    router: CommandRouter,
    collector: Collector,
    user_id: String,
    config: Config,
    config_dir: PathBuf,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn Transport>,
        captioner: Arc<dyn Captioner>,
        config: Config,
        config_dir: PathBuf,
    ) -> Self {
        let data_dir = config.data_dir(&config_dir);
        let collection = CollectionStore::new(&data_dir);
        let packs = PackStore::new(&data_dir);
        let user_id = config.matrix.user_id.clone();

        let publisher = Publisher::new(transport.clone(), collection.clone(), packs.clone());
        let router = CommandRouter::new(collection.clone(), packs, publisher, user_id.clone());
        let collector = Collector::new(
            transport.clone(),
            captioner,
            collection,
            server_name_of_user(&user_id),
        );

        Self {
            transport,
            router,
            collector,
            user_id,
            config,
            config_dir,
        }
    }

    /// Sync until ctrl-c. The checkpoint is saved hourly and once more on
    /// shutdown, so a restart resumes without replaying old events.
    pub async fn run(&mut self) -> Result<()> {
        let mut checkpoint = self.config.matrix.next_batch.clone();
        tracing::info!(
            user = %self.user_id,
            resuming = checkpoint.is_some(),
            "Starting sync loop"
        );

        let mut save_timer = tokio::time::interval(CHECKPOINT_INTERVAL);
        save_timer.tick().await; // the first tick fires immediately

        loop {
            // The sync future owns its captures so the select arms below can
            // borrow `self` freely.
            let transport = self.transport.clone();
            let since = checkpoint.clone();
            let next =
                async move { transport.sync(since.as_deref(), SYNC_TIMEOUT_MS).await };

            tokio::select! {
                batch = next => {
                    match batch {
                        Ok(batch) => {
                            checkpoint = Some(batch.next_batch);
                            for event in batch.events {
                                self.handle_event(event).await;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Sync failed, retrying");
                            tokio::time::sleep(SYNC_RETRY_DELAY).await;
                        }
                    }
                }
                _ = save_timer.tick() => {
                    self.save_checkpoint(checkpoint.clone());
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        self.save_checkpoint(checkpoint);
        Ok(())
    }

    async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text {
                room_id,
                event_id,
                sender,
                body,
                is_edit,
            } => {
                if sender != self.user_id || is_edit || !CommandRouter::matches(&body) {
                    return;
                }
                let reply = self.router.execute(&body).await;
                // Edit the command message in place instead of replying, so
                // the room is not littered with bot output.
                let edited = format!("{body}\n\n{reply}");
                if let Err(err) = self
                    .transport
                    .edit_message(&room_id, &event_id, &edited)
                    .await
                {
                    // Some servers reject edits (e.g. after the retention
                    // window); deliver the reply as a fresh message instead.
                    tracing::warn!(room = %room_id, error = %err, "Failed to edit command message, replying instead");
                    if let Err(err) = self.transport.send_message(&room_id, &reply).await {
                        tracing::warn!(room = %room_id, error = %err, "Failed to send command reply");
                    }
                }
            }
            InboundEvent::Reaction {
                room_id,
                event_id,
                sender,
                target_event_id,
                key,
            } => {
                if sender != self.user_id || !COLLECT_KEYWORDS.contains(&key.as_str()) {
                    return;
                }
                self.collect_reaction(&room_id, &event_id, &target_event_id)
                    .await;
            }
            _ => {}
        }
    }

    async fn collect_reaction(&self, room_id: &str, reaction_id: &str, target_id: &str) {
        let target = match self.transport.get_event(room_id, target_id).await {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(room = %room_id, event = target_id, error = %err, "Failed to fetch reacted-to event");
                return;
            }
        };
        let (mxc_uri, body) = match extract_image_data(&target) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(room = %room_id, event = target_id, error = %err, "Reacted-to event carries no image");
                return;
            }
        };

        match self.collector.collect(room_id, target_id, &mxc_uri, &body).await {
            Ok(sticker) => {
                tracing::info!(id = %sticker.id, name = %sticker.name, "Collected sticker");
                // Tidy up the reaction; the sticker is already saved, so a
                // failure here only leaves the reaction visible.
                if let Err(err) = self.transport.redact(room_id, reaction_id).await {
                    tracing::warn!(room = %room_id, error = %err, "Failed to redact collect reaction");
                }
            }
            Err(err) => {
                tracing::warn!(room = %room_id, event = target_id, error = %err, "Collection failed");
            }
        }
    }

    fn save_checkpoint(&mut self, checkpoint: Option<String>) {
        if checkpoint.is_none() {
            return;
        }
        self.config.matrix.next_batch = checkpoint;
        match self.config.save(&self.config_dir) {
            Ok(()) => tracing::debug!("Saved sync checkpoint"),
            Err(err) => tracing::warn!(error = %err, "Failed to save sync checkpoint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    use crate::matrix::{MxcUri, SyncBatch};

    const TINY_PNG: [u8; 33] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89,
    ];

    #[derive(Default)]
    struct ScriptedTransport {
        events: Mutex<std::collections::HashMap<String, Value>>,
        redactions: Mutex<Vec<String>>,
        edits: Mutex<Vec<(String, String)>>,
        sends: Mutex<Vec<(String, String)>>,
        fail_edits: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn download(&self, _uri: &MxcUri) -> crate::error::Result<(Vec<u8>, Option<String>)> {
            Ok((TINY_PNG.to_vec(), Some("image/png".to_string())))
        }

        async fn upload(&self, _data: &[u8], _mime: &str) -> crate::error::Result<MxcUri> {
            MxcUri::parse("mxc://own.example/rehosted")
        }

        async fn get_event(&self, _room: &str, event_id: &str) -> crate::error::Result<Value> {
            self.events
                .lock()
                .unwrap()
                .get(event_id)
                .cloned()
                .ok_or_else(|| crate::error::StickerbookError::external("get_event", "not found"))
        }

        async fn send_message(&self, room_id: &str, body: &str) -> crate::error::Result<String> {
            self.sends
                .lock()
                .unwrap()
                .push((room_id.to_string(), body.to_string()));
            Ok("$sent".to_string())
        }

        async fn edit_message(
            &self,
            _room: &str,
            event_id: &str,
            new_body: &str,
        ) -> crate::error::Result<String> {
            if self.fail_edits {
                return Err(crate::error::StickerbookError::external(
                    "message edit",
                    "edit rejected",
                ));
            }
            self.edits
                .lock()
                .unwrap()
                .push((event_id.to_string(), new_body.to_string()));
            Ok("$edited".to_string())
        }

        async fn redact(&self, _room: &str, event_id: &str) -> crate::error::Result<()> {
            self.redactions.lock().unwrap().push(event_id.to_string());
            Ok(())
        }

        async fn send_state(
            &self,
            _room: &str,
            _event_type: &str,
            _state_key: &str,
            _content: Value,
        ) -> crate::error::Result<()> {
            Ok(())
        }

        async fn sync(&self, _since: Option<&str>, _timeout: u64) -> crate::error::Result<SyncBatch> {
            Ok(SyncBatch::default())
        }
    }

    struct FixedCaptioner;

    #[async_trait]
    impl Captioner for FixedCaptioner {
        async fn describe(&self, _data: &[u8], _mime: &str) -> crate::error::Result<String> {
            Ok("A tiny test image".to_string())
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<ScriptedTransport>, Bot) {
        fixture_with(ScriptedTransport::default())
    }

    fn fixture_with(transport: ScriptedTransport) -> (tempfile::TempDir, Arc<ScriptedTransport>, Bot) {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(transport);
        let mut config = Config::default();
        config.matrix.user_id = "@me:own.example".to_string();
        let bot = Bot::new(
            transport.clone(),
            Arc::new(FixedCaptioner),
            config,
            dir.path().to_path_buf(),
        );
        (dir, transport, bot)
    }

    fn text_event(sender: &str, body: &str, is_edit: bool) -> InboundEvent {
        InboundEvent::Text {
            room_id: "!room:own.example".to_string(),
            event_id: "$cmd".to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            is_edit,
        }
    }

    #[tokio::test]
    async fn test_command_reply_edits_original_message() {
        let (_dir, transport, bot) = fixture();

        bot.handle_event(text_event("@me:own.example", "!sticker pack list", false))
            .await;

        let edits = transport.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, "$cmd");
        assert!(edits[0].1.starts_with("!sticker pack list\n\n"));
        assert!(edits[0].1.contains("unsorted (0)"));
    }

    #[tokio::test]
    async fn test_edit_failure_falls_back_to_send() {
        let (_dir, transport, bot) = fixture_with(ScriptedTransport {
            fail_edits: true,
            ..Default::default()
        });

        bot.handle_event(text_event("@me:own.example", "!sticker pack list", false))
            .await;

        assert!(transport.edits.lock().unwrap().is_empty());
        let sends = transport.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "!room:own.example");
        assert!(sends[0].1.contains("unsorted (0)"));
    }

    #[tokio::test]
    async fn test_other_senders_and_edits_are_ignored() {
        let (_dir, transport, bot) = fixture();

        bot.handle_event(text_event("@someone:else.example", "!sticker pack list", false))
            .await;
        bot.handle_event(text_event("@me:own.example", "!sticker pack list", true))
            .await;
        bot.handle_event(text_event("@me:own.example", "just chatting", false))
            .await;

        assert!(transport.edits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collect_reaction_saves_and_redacts() {
        let (_dir, transport, bot) = fixture();
        transport.events.lock().unwrap().insert(
            "$img".to_string(),
            json!({
                "type": "m.sticker",
                "content": {
                    "url": "mxc://other.example/media123",
                    "body": "cat pic",
                },
            }),
        );

        bot.handle_event(InboundEvent::Reaction {
            room_id: "!room:own.example".to_string(),
            event_id: "$react".to_string(),
            sender: "@me:own.example".to_string(),
            target_event_id: "$img".to_string(),
            key: "!yoink".to_string(),
        })
        .await;

        assert_eq!(*transport.redactions.lock().unwrap(), vec!["$react"]);
    }

    #[tokio::test]
    async fn test_ordinary_reactions_do_nothing() {
        let (_dir, transport, bot) = fixture();

        bot.handle_event(InboundEvent::Reaction {
            room_id: "!room:own.example".to_string(),
            event_id: "$react".to_string(),
            sender: "@me:own.example".to_string(),
            target_event_id: "$img".to_string(),
            key: "👍".to_string(),
        })
        .await;

        assert!(transport.redactions.lock().unwrap().is_empty());
    }
}
