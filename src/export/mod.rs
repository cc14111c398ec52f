//! Export orchestration.
//!
//! Walks messages, characters and campaigns (with their roleplays and
//! discussions) in that order. Every family goes through the same pipeline:
//! list, fetch detail, merge sub-resources, derive name and date, persist.
//! A failure on one item is logged and the traversal moves on to its siblings.

mod family;

use std::ops::AddAssign;

use serde_json::Value;
use thiserror::Error;

pub use family::*;

use crate::client::{ClientError, TavernClient};
use crate::config::Config;
use crate::document::{Document, DocumentError};
use crate::storage::{sanitize_dir, ExportTarget, Storage, StorageError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no data returned for {0}")]
    NoData(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Parts of an export run, always executed in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Section {
    Messages,
    Characters,
    Campaigns,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Messages, Section::Characters, Section::Campaigns];
}

/// Files written and entities skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub written: usize,
    pub skipped: usize,
}

impl AddAssign for ExportStats {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.skipped += other.skipped;
    }
}

pub struct Exporter {
    config: Config,
    client: TavernClient,
    storage: Storage,
}

impl Exporter {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let client = TavernClient::new(&config)?;
        let storage = Storage::new(config.export_dir.clone());
        Ok(Self {
            config,
            client,
            storage,
        })
    }

    /// Check that the session cookie belongs to a logged-in user.
    /// Returns the user's display name.
    pub async fn verify_login(&self) -> Result<String, ExportError> {
        let user = self
            .client
            .get_current_user()
            .await
            .ok_or(ExportError::NotLoggedIn)?;
        if !user.contains_key("account") {
            return Err(ExportError::NotLoggedIn);
        }
        Ok(user.name().unwrap_or(self.config.user_id.as_str()).to_string())
    }

    /// Run the selected sections in their fixed order.
    pub async fn export(&self, sections: &[Section]) -> ExportStats {
        let mut stats = ExportStats::default();
        for section in Section::ALL {
            if !sections.contains(&section) {
                continue;
            }
            stats += match section {
                Section::Messages => self.export_messages().await,
                Section::Characters => self.export_characters().await,
                Section::Campaigns => self.export_campaigns().await,
            };
        }
        tracing::info!(
            written = stats.written,
            skipped = stats.skipped,
            "Export completed"
        );
        stats
    }

    pub async fn export_all(&self) -> ExportStats {
        self.export(&Section::ALL).await
    }

    pub async fn export_messages(&self) -> ExportStats {
        self.export_family(&Family::Messages).await
    }

    pub async fn export_characters(&self) -> ExportStats {
        self.export_family(&Family::user_characters()).await
    }

    pub async fn export_campaigns(&self) -> ExportStats {
        let Some(mut listing) = self.client.get_campaigns().await else {
            tracing::warn!("Campaign listing unavailable, nothing to export");
            return ExportStats::default();
        };
        let campaigns = match listing.take_documents("campaigns") {
            Ok(campaigns) => campaigns,
            Err(e) => {
                tracing::warn!("Campaign listing unusable: {}", e);
                return ExportStats::default();
            }
        };

        let mut stats = ExportStats::default();
        for campaign in campaigns {
            match self.export_campaign(campaign).await {
                Ok(campaign_stats) => stats += campaign_stats,
                Err(e) => {
                    tracing::warn!("Skipping campaign: {}", e);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    async fn export_campaign(&self, campaign: Document) -> Result<ExportStats, ExportError> {
        let id = campaign.id()?;
        if self.config.is_done(&id) {
            tracing::info!(campaign_id = %id, "Skipping completed campaign");
            return Ok(ExportStats::default());
        }

        let name = campaign.name()?.to_string();
        tracing::info!(campaign_id = %id, "++ {}", name);
        let dir = format!("campaigns/{}", sanitize_dir(&name));

        let mut stats = ExportStats::default();
        match campaign.epoch_millis("created_at") {
            Ok(timestamp) => {
                match self
                    .storage
                    .write(&ExportTarget::json(campaign, &dir, &name, timestamp))
                {
                    Ok(_) => stats.written += 1,
                    Err(e) => {
                        tracing::warn!("Campaign summary not written: {}", e);
                        stats.skipped += 1;
                    }
                }
            }
            Err(e) => tracing::debug!("Campaign summary has no usable date: {}", e),
        }

        stats += self.export_family(&Family::roleplays(&id, &dir)).await;
        stats += self.export_family(&Family::discussions(&id, &dir)).await;
        if self.config.campaign_characters {
            stats += self
                .export_family(&Family::campaign_characters(&id, &dir))
                .await;
        }
        Ok(stats)
    }

    /// List a family's items and export each one.
    pub async fn export_family(&self, family: &Family) -> ExportStats {
        let Some(mut listing) = self.list(family).await else {
            tracing::warn!(family = family.label(), "Listing unavailable, nothing to export");
            return ExportStats::default();
        };
        let items = match listing.take_documents(family.list_key()) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(family = family.label(), "Listing unusable: {}", e);
                return ExportStats::default();
            }
        };

        let mut stats = ExportStats::default();
        for summary in items {
            match self.export_item(family, summary).await {
                Ok(written) => stats.written += written,
                Err(e) => {
                    tracing::warn!(family = family.label(), "Skipping: {}", e);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    async fn list(&self, family: &Family) -> Option<Document> {
        match family {
            Family::Messages => self.client.get_messages().await,
            Family::Characters {
                scope: CharacterScope::User,
                ..
            } => {
                let active = self.client.get_characters(false).await;
                let archived = self.client.get_characters(true).await;
                match (active, archived) {
                    (Some(mut active), Some(archived)) => {
                        active.merge(archived);
                        Some(active)
                    }
                    (active, archived) => active.or(archived),
                }
            }
            Family::Characters {
                scope: CharacterScope::Campaign(campaign_id),
                ..
            } => self.client.get_campaign_characters(campaign_id).await,
            Family::Roleplays { campaign_id, .. } => {
                self.client.get_campaign_roleplays(campaign_id).await
            }
            Family::Discussions { campaign_id, .. } => {
                self.client.get_campaign_discussions(campaign_id).await
            }
        }
    }

    /// Export one listed item. Returns the number of files written.
    async fn export_item(&self, family: &Family, summary: Document) -> Result<usize, ExportError> {
        let id = summary.id()?;
        let name = summary.name()?.to_string();
        tracing::info!(family = family.label(), %id, "+++ {}", name);

        let document = self.assemble(family, &id, summary).await?;
        let timestamp = family.date_source().resolve(&document)?;
        let portrait = family
            .has_portrait()
            .then(|| document.optional_str("image_url").map(String::from))
            .flatten();

        self.storage.write(&ExportTarget::json(
            document,
            family.directory(),
            &name,
            timestamp,
        ))?;
        let mut written = 1;

        if let Some(url) = portrait {
            if let Some(bytes) = self.client.download(&url).await {
                // The JSON is already on disk, so a failed image write only
                // costs the portrait.
                match self.storage.write(&ExportTarget::image(
                    bytes,
                    family.directory(),
                    &name,
                    timestamp,
                )) {
                    Ok(_) => written += 1,
                    Err(e) => tracing::warn!("Portrait not written: {}", e),
                }
            }
        } else if family.has_portrait() {
            tracing::debug!(%id, "No portrait");
        }

        Ok(written)
    }

    /// Fetch the full document for one item and fold its sub-resources in.
    async fn assemble(
        &self,
        family: &Family,
        id: &str,
        summary: Document,
    ) -> Result<Document, ExportError> {
        match family {
            Family::Messages => {
                let mut message = self
                    .client
                    .get_message(id)
                    .await
                    .ok_or_else(|| ExportError::NoData(format!("message {}", id)))?;
                if let Some(comments) = self.client.get_message_comments(id).await {
                    message.merge(comments);
                }
                Ok(message)
            }
            Family::Characters { .. } => self
                .client
                .get_character(id)
                .await
                .ok_or_else(|| ExportError::NoData(format!("character {}", id))),
            Family::Roleplays { .. } => {
                let mut roleplay = self
                    .client
                    .get_roleplay(id)
                    .await
                    .ok_or_else(|| ExportError::NoData(format!("roleplay {}", id)))?;
                if let Some(messages) = self.client.get_roleplay_messages(id).await {
                    roleplay.merge(messages);
                }
                self.attach_message_comments(id, &mut roleplay).await;
                Ok(roleplay)
            }
            Family::Discussions { campaign_id, .. } => {
                let mut discussion = summary;
                match self.client.get_discussion(campaign_id, id).await {
                    Some(mut head) => {
                        head.remove("campaign");
                        discussion.merge(head);
                    }
                    None => tracing::warn!(%id, "Discussion head unavailable, keeping summary"),
                }
                if let Some(comments) = self.client.get_discussion_comments(campaign_id, id).await
                {
                    discussion.merge(comments);
                }
                Ok(discussion)
            }
        }
    }

    /// Fetch comments for every roleplay message that has (or may have) some.
    ///
    /// A message without a `comment_count` is treated as commented.
    async fn attach_message_comments(&self, roleplay_id: &str, roleplay: &mut Document) {
        let mut messages = match roleplay.take_documents("messages") {
            Ok(messages) => messages,
            Err(e) => {
                tracing::debug!(%roleplay_id, "No messages: {}", e);
                return;
            }
        };

        for message in &mut messages {
            if !message.u64_field("comment_count").map_or(true, |n| n > 0) {
                continue;
            }
            let message_id = match message.id() {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(%roleplay_id, "Message without id: {}", e);
                    continue;
                }
            };
            if let Some(comments) = self
                .client
                .get_roleplay_message_comments(roleplay_id, &message_id)
                .await
            {
                message.merge(comments);
            }
        }

        let messages = messages
            .into_iter()
            .map(|message| Value::Object(message.into_inner()))
            .collect();
        roleplay.insert("messages", Value::Array(messages));
    }
}
