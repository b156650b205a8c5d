//! The `!sticker` command router: a stateless parser over a fixed grammar,
//! dispatching to the stores and the publisher and rendering results as
//! user-facing text. Missing arguments produce usage strings; store errors
//! propagate into failure messages.

use crate::publish::Publisher;
use crate::storage::{
    format_usage, normalize_pack_name, parse_usage, resolve_usage, validate_shortcode,
    CollectionStore, PackStore, Sticker, UNSORTED,
};

const COMMAND_PREFIX: &str = "!sticker";

pub struct CommandRouter {
    collection: CollectionStore,
    packs: PackStore,
    publisher: Publisher,
    /// Recorded as attribution on newly created packs.
    bot_user_id: String,
}

impl CommandRouter {
    pub fn new(
        collection: CollectionStore,
        packs: PackStore,
        publisher: Publisher,
        bot_user_id: String,
    ) -> Self {
        Self {
            collection,
            packs,
            publisher,
            bot_user_id,
        }
    }

    /// Whether a message body is addressed to the router at all.
    pub fn matches(body: &str) -> bool {
        body.trim_start().starts_with(COMMAND_PREFIX)
    }

    /// Parse and execute one command, returning the reply text.
    pub async fn execute(&self, body: &str) -> String {
        let body = body.trim();
        let Some(rest) = body.strip_prefix(COMMAND_PREFIX) else {
            return help_text();
        };

        let args: Vec<&str> = rest.split_whitespace().collect();
        let Some((&verb, tail)) = args.split_first() else {
            return help_text();
        };

        match verb {
            "pack" => self.pack_command(tail).await,
            "list" => self.list_command(tail).await,
            "show" => match tail.first() {
                Some(id) => self.sticker_show(id).await,
                None => usage("!sticker show <sticker-id>"),
            },
            "delete" | "remove" => match tail.first() {
                Some(id) => self.sticker_delete(id).await,
                None => usage("!sticker delete <sticker-id>"),
            },
            "usage" => match tail {
                [id, token, ..] => self.sticker_usage(id, token).await,
                _ => usage(
                    "!sticker usage <sticker-id> <sticker|emoticon|emoji|both|reset>\n\n\
                     Sets how this sticker can be used. Use 'reset' to clear override and inherit from pack.",
                ),
            },
            "name" => match tail {
                [id, name, ..] => self.sticker_name(id, name).await,
                _ => usage(
                    "!sticker name <sticker-id> <shortcode>\n\n\
                     Sets the emoji shortcode name (e.g., 'happy_cat' becomes :happy_cat:). Defaults to the content hash.",
                ),
            },
            other => format!("❌ Unknown command: {other}\n\n{}", help_text()),
        }
    }

    async fn pack_command(&self, args: &[&str]) -> String {
        let Some((&verb, tail)) = args.split_first() else {
            return "❌ No pack subcommand specified. Try: pack list, pack create, pack add, \
                    pack remove, pack show, pack avatar, pack usage, pack publish"
                .to_string();
        };

        match verb {
            "list" => self.pack_list().await,
            "create" => {
                if tail.is_empty() {
                    return usage("!sticker pack create <name>");
                }
                self.pack_create(&tail.join(" ")).await
            }
            "add" => match tail {
                [pack, id, ..] => self.pack_add(pack, id).await,
                _ => usage(
                    "!sticker pack add <pack-name> <sticker-id>\n\n\
                     Use `!sticker pack list` to see available packs, or create one with `!sticker pack create <name>`",
                ),
            },
            "remove" => match tail {
                [pack, id, ..] => self.pack_remove(pack, id).await,
                _ => usage("!sticker pack remove <pack-name> <sticker-id>"),
            },
            "show" => match tail.first() {
                Some(pack) => self.pack_show(pack).await,
                None => usage("!sticker pack show <pack>"),
            },
            "avatar" => match tail {
                [pack, uri, ..] => self.pack_avatar(pack, uri).await,
                _ => usage("!sticker pack avatar <pack-name> <mxc-uri>"),
            },
            "usage" => match tail {
                [pack, token, ..] => self.pack_usage(pack, token).await,
                _ => usage(
                    "!sticker pack usage <pack-name> <sticker|emoticon|emoji|both|reset>\n\n\
                     Sets default usage for all stickers in this pack. Individual stickers can override this.",
                ),
            },
            "publish" => match tail {
                [pack, room, ..] => self.pack_publish(pack, Some(*room)).await,
                [pack] => self.pack_publish(pack, None).await,
                _ => usage(
                    "!sticker pack publish <pack-name> [room-id]\n\n\
                     Publish to a specific room: !sticker pack publish favourites !roomid:matrix.org\n\
                     Re-publish to all saved rooms: !sticker pack publish favourites",
                ),
            },
            other => format!("❌ Unknown pack subcommand: {other}"),
        }
    }

    async fn list_command(&self, args: &[&str]) -> String {
        match args.first() {
            Some(&"unsorted") => self.list_unsorted().await,
            Some(other) => format!("❌ Unknown list subcommand: {other}"),
            None => "❌ No list subcommand specified. Try: list unsorted".to_string(),
        }
    }

    async fn pack_list(&self) -> String {
        let packs = match self.packs.list().await {
            Ok(packs) => packs,
            Err(err) => return format!("❌ Error loading packs: {err}"),
        };
        let stickers = match self.collection.list().await {
            Ok(stickers) => stickers,
            Err(err) => return format!("❌ Error loading collection: {err}"),
        };

        let unsorted_count = stickers.iter().filter(|s| s.in_packs.is_empty()).count();

        // The virtual "unsorted" entry is always present, even at zero.
        let mut out = format!("- {UNSORTED} ({unsorted_count})\n");
        for pack in &packs {
            out.push_str(&format!("- {} ({})\n", pack.name, pack.sticker_ids.len()));
        }

        if packs.is_empty() {
            out.push_str("\nCreate a pack with: !sticker pack create <name>");
        }
        out
    }

    async fn pack_create(&self, name: &str) -> String {
        match self.packs.create(name, name, &self.bot_user_id).await {
            Ok(_) => format!("✅ Created pack: {name}"),
            Err(err) => format!("❌ Error creating pack: {err}"),
        }
    }

    async fn pack_add(&self, pack_name: &str, sticker_id: &str) -> String {
        let pack_name = normalize_pack_name(pack_name);
        match self
            .packs
            .add_members(&pack_name, &[sticker_id.to_string()])
            .await
        {
            Ok(()) => format!("✅ Added sticker to pack: {pack_name}"),
            Err(err) => format!("❌ Error adding to pack: {err}"),
        }
    }

    async fn pack_remove(&self, pack_name: &str, sticker_id: &str) -> String {
        let pack_name = normalize_pack_name(pack_name);
        match self
            .packs
            .remove_members(&pack_name, &[sticker_id.to_string()])
            .await
        {
            Ok(()) => format!("✅ Removed sticker from pack: {pack_name}"),
            Err(err) => format!("❌ Error removing from pack: {err}"),
        }
    }

    async fn pack_show(&self, pack_name: &str) -> String {
        let pack = match self.packs.get(&normalize_pack_name(pack_name)).await {
            Ok(pack) => pack,
            Err(err) => return format!("❌ Error loading pack: {err}"),
        };

        if pack.sticker_ids.is_empty() {
            return "Pack is empty".to_string();
        }

        let stickers = match self.collection.list().await {
            Ok(stickers) => stickers,
            Err(err) => return format!("❌ Error loading collection: {err}"),
        };

        let mut out = String::new();
        for (i, id) in pack.sticker_ids.iter().enumerate() {
            match stickers.iter().find(|s| &s.id == id) {
                Some(sticker) => {
                    let alt_text = if sticker.generated_alt_text.is_empty() {
                        "(no alt-text)"
                    } else {
                        sticker.generated_alt_text.as_str()
                    };
                    let usage = format_usage(&resolve_usage(sticker, &pack));
                    out.push_str(&format!(
                        "{}. `{id}` (:{}:) - {alt_text} [{usage}]\n",
                        i + 1,
                        sticker.name
                    ));
                }
                None => {
                    out.push_str(&format!("{}. `{id}` (missing from collection)\n", i + 1));
                }
            }
        }
        out
    }

    async fn pack_avatar(&self, pack_name: &str, avatar_url: &str) -> String {
        if !avatar_url.starts_with("mxc://") {
            return "❌ Invalid MXC URI - must start with mxc://\n\nExample: mxc://matrix.org/abc123..."
                .to_string();
        }

        let pack_name = normalize_pack_name(pack_name);
        match self.packs.set_avatar(&pack_name, avatar_url).await {
            Ok(()) => format!("✅ Set avatar for pack: {pack_name}"),
            Err(err) => format!("❌ Error setting pack avatar: {err}"),
        }
    }

    async fn pack_usage(&self, pack_name: &str, token: &str) -> String {
        let usage = match parse_usage(token) {
            Ok(usage) => usage,
            Err(err) => return format!("❌ {err}"),
        };

        let pack_name = normalize_pack_name(pack_name);
        match self.packs.set_default_usage(&pack_name, usage.clone()).await {
            Ok(()) => match usage {
                None => format!("✅ Reset usage for pack {pack_name} (will use default: both)"),
                Some(usage) => format!(
                    "✅ Set pack {pack_name} default usage to: {}",
                    format_usage(&usage)
                ),
            },
            Err(err) => format!("❌ Error setting pack usage: {err}"),
        }
    }

    async fn pack_publish(&self, pack_name: &str, room_id: Option<&str>) -> String {
        let pack_name = normalize_pack_name(pack_name);

        let Some(room_id) = room_id else {
            // No room given: republish to every room in the ledger.
            let pack = match self.packs.get(&pack_name).await {
                Ok(pack) => pack,
                Err(err) => return format!("❌ Error loading pack: {err}"),
            };
            if pack.published_rooms.is_empty() {
                return "❌ Pack has not been published to any rooms yet\n\n\
                        Use: !sticker pack publish <pack> <room-id> to publish to a specific room"
                    .to_string();
            }

            return match self.publisher.republish_all(&pack_name).await {
                Ok(report) if report.errors.is_empty() => format!(
                    "✅ Published pack '{pack_name}' to {} room(s)",
                    report.succeeded
                ),
                Ok(report) => {
                    let errors: Vec<String> = report
                        .errors
                        .iter()
                        .map(|(room, err)| format!("{room}: {err}"))
                        .collect();
                    format!(
                        "⚠️ Published to {}/{} rooms\n\nErrors:\n{}",
                        report.succeeded,
                        report.total,
                        errors.join("\n")
                    )
                }
                Err(err) => format!("❌ Error publishing pack: {err}"),
            };
        };

        if !room_id.starts_with('!') {
            return "❌ Invalid room ID - must start with !\n\nExample: !roomid:matrix.org"
                .to_string();
        }

        match self.publisher.publish(&pack_name, room_id).await {
            Ok(()) => format!("✅ Published pack '{pack_name}' to room {room_id}"),
            Err(err) => format!("❌ Error publishing pack: {err}"),
        }
    }

    async fn sticker_show(&self, id: &str) -> String {
        let sticker = match self.collection.get(id).await {
            Ok(sticker) => sticker,
            Err(err) => return format!("❌ {err}"),
        };

        let alt_text = display_alt_text(&sticker);
        let packs = if sticker.in_packs.is_empty() {
            "(unsorted)".to_string()
        } else {
            sticker.in_packs.join(", ")
        };

        format!(
            "- **ID:** `{}`\n\
             - **Name:** `:{}:`\n\
             - **Alt-text:** {}\n\
             - **Size:** {}x{}, {}\n\
             - **Usage:** {}\n\
             - **Packs:** {}\n\
             \n\
             ![{}]({})",
            sticker.id,
            sticker.name,
            alt_text,
            sticker.width,
            sticker.height,
            sticker.mime_type,
            format_usage(&sticker.usage),
            packs,
            alt_text,
            sticker.local_mxc,
        )
    }

    async fn sticker_delete(&self, id: &str) -> String {
        let pack_names = match self.collection.delete(id).await {
            Ok(names) => names,
            Err(err) => return format!("❌ Error deleting sticker: {err}"),
        };

        // The primary delete already succeeded; pack-side cleanup is
        // best-effort from here.
        for pack_name in pack_names {
            if let Err(err) = self
                .packs
                .remove_members(&pack_name, &[id.to_string()])
                .await
            {
                tracing::warn!(pack = %pack_name, sticker = id, error = %err, "Failed to remove deleted sticker from pack");
            }
        }

        format!("✅ Deleted sticker: {id}")
    }

    async fn sticker_usage(&self, id: &str, token: &str) -> String {
        let usage = match parse_usage(token) {
            Ok(usage) => usage,
            Err(err) => return format!("❌ {err}"),
        };

        match self.collection.set_usage(id, usage.clone()).await {
            Ok(()) => match usage {
                None => format!("✅ Reset usage for sticker {id} (will inherit from pack)"),
                Some(usage) => {
                    format!("✅ Set sticker {id} usage to: {}", format_usage(&usage))
                }
            },
            Err(err) => format!("❌ Error setting sticker usage: {err}"),
        }
    }

    async fn sticker_name(&self, id: &str, name: &str) -> String {
        if let Err(err) = validate_shortcode(name) {
            return format!("❌ {err}");
        }

        match self.collection.set_name(id, name).await {
            Ok(()) => format!("✅ Set sticker shortcode to: :{name}:"),
            Err(err) => format!("❌ Error setting sticker name: {err}"),
        }
    }

    async fn list_unsorted(&self) -> String {
        let stickers = match self.collection.list().await {
            Ok(stickers) => stickers,
            Err(err) => return format!("❌ Error loading collection: {err}"),
        };

        let unsorted: Vec<&Sticker> =
            stickers.iter().filter(|s| s.in_packs.is_empty()).collect();
        if unsorted.is_empty() {
            return "All stickers are organized into packs!".to_string();
        }

        let mut out = String::new();
        for (i, sticker) in unsorted.iter().enumerate() {
            let alt_text = if sticker.generated_alt_text.is_empty() {
                "(no alt-text)"
            } else {
                sticker.generated_alt_text.as_str()
            };
            out.push_str(&format!(
                "{}. `{}` (:{}:) - {alt_text}\n",
                i + 1,
                sticker.id,
                sticker.name
            ));
        }
        out
    }
}

fn display_alt_text(sticker: &Sticker) -> &str {
    if !sticker.generated_alt_text.is_empty() {
        &sticker.generated_alt_text
    } else if !sticker.original_body.is_empty() {
        &sticker.original_body
    } else {
        "Sticker"
    }
}

fn usage(text: &str) -> String {
    format!("❌ Usage: {text}")
}

fn help_text() -> String {
    "Pack Management:\n\n\
     - !sticker pack list - List all packs with sticker counts\n\
     - !sticker pack create <name> - Create a new pack\n\
     - !sticker pack show <pack> - Show stickers in a pack\n\
     - !sticker pack add <pack> <sticker-id> - Add sticker to pack\n\
     - !sticker pack remove <pack> <sticker-id> - Remove sticker from pack\n\
     - !sticker pack avatar <pack> <mxc-uri> - Set pack icon\n\
     - !sticker pack usage <pack> <type> - Set default usage (sticker/emoticon/both/reset)\n\
     - !sticker pack publish <pack> [room-id] - Publish to room (or all saved)\n\n\
     Listing:\n\n\
     - !sticker list unsorted - Show stickers not in any pack\n\
     - !sticker show <sticker-id> - Show sticker with metadata and image\n\n\
     Management:\n\n\
     - !sticker name <sticker-id> <shortcode> - Set emoji shortcode (e.g., happy_cat)\n\
     - !sticker usage <sticker-id> <type> - Set usage (sticker/emoticon/both/reset)\n\
     - !sticker delete <sticker-id> - Delete sticker from collection\n\n\
     **React to any sticker with `!yoink`, `!nom`, or `!grab` to collect it!**"
        .to_string()
}
