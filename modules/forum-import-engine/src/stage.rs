use std::fmt;

use forum_import_common::{ConcurrencyConfig, EntityType};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Site owner, deleted-user placeholder, then every profile.
    Accounts,
    Containers,
    Threads,
    Posts,
    Messages,
    Attachments,
    Relationships,
    /// Irreversible. Runs at most once per origin.
    Finalization,
}

/// Coarse progress through [`Stage::ORDER`]. Each value means every stage up
/// to and including the named one has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Pending,
    AccountsReady,
    ContainersImported,
    ThreadsImported,
    PostsImported,
    MessagesImported,
    AttachmentsImported,
    RelationshipsImported,
    Finalized,
}

impl Stage {
    pub const ORDER: [Stage; 8] = [
        Stage::Accounts,
        Stage::Containers,
        Stage::Threads,
        Stage::Posts,
        Stage::Messages,
        Stage::Attachments,
        Stage::Relationships,
        Stage::Finalization,
    ];

    /// Entity type whose records the stage imports.
    pub fn entity(self) -> EntityType {
        match self {
            Stage::Accounts => EntityType::Profile,
            Stage::Containers => EntityType::Forum,
            Stage::Threads => EntityType::Conversation,
            Stage::Posts => EntityType::Comment,
            Stage::Messages => EntityType::Huddle,
            Stage::Attachments => EntityType::Attachment,
            Stage::Relationships => EntityType::Follow,
            Stage::Finalization => EntityType::Role,
        }
    }

    /// Whether re-running the stage after success is harmless. Only
    /// finalization is not.
    pub fn is_repeatable(self) -> bool {
        self != Stage::Finalization
    }

    pub fn default_concurrency(self) -> usize {
        match self {
            Stage::Accounts
            | Stage::Containers
            | Stage::Threads
            | Stage::Relationships => 50,
            Stage::Posts | Stage::Messages => 25,
            Stage::Attachments => 100,
            Stage::Finalization => 1,
        }
    }

    /// Worker count for this stage, honoring overrides. Never zero.
    pub fn concurrency(self, config: &ConcurrencyConfig) -> usize {
        let configured = match self {
            Stage::Accounts => config.accounts,
            Stage::Containers => config.containers,
            Stage::Threads => config.threads,
            Stage::Posts => config.posts,
            Stage::Messages => config.messages,
            Stage::Attachments => config.attachments,
            Stage::Relationships => config.relationships,
            Stage::Finalization => config.finalization,
        };
        configured.unwrap_or_else(|| self.default_concurrency()).max(1)
    }

    /// State reached once this stage has completed.
    pub fn completed_state(self) -> PipelineState {
        match self {
            Stage::Accounts => PipelineState::AccountsReady,
            Stage::Containers => PipelineState::ContainersImported,
            Stage::Threads => PipelineState::ThreadsImported,
            Stage::Posts => PipelineState::PostsImported,
            Stage::Messages => PipelineState::MessagesImported,
            Stage::Attachments => PipelineState::AttachmentsImported,
            Stage::Relationships => PipelineState::RelationshipsImported,
            Stage::Finalization => PipelineState::Finalized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Accounts => "accounts",
            Stage::Containers => "containers",
            Stage::Threads => "threads",
            Stage::Posts => "posts",
            Stage::Messages => "messages",
            Stage::Attachments => "attachments",
            Stage::Relationships => "relationships",
            Stage::Finalization => "finalization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_states() {
        let mut previous = PipelineState::Pending;
        for stage in Stage::ORDER {
            assert!(stage.completed_state() > previous, "{stage} out of order");
            previous = stage.completed_state();
        }
        assert_eq!(previous, PipelineState::Finalized);
    }

    #[test]
    fn every_entity_type_has_a_stage() {
        for entity in EntityType::ALL {
            assert_eq!(
                Stage::ORDER.iter().filter(|s| s.entity() == entity).count(),
                1,
                "{entity}"
            );
        }
    }

    #[test]
    fn overrides_and_zero_clamp() {
        let config = ConcurrencyConfig {
            posts: Some(8),
            attachments: Some(0),
            ..Default::default()
        };
        assert_eq!(Stage::Posts.concurrency(&config), 8);
        assert_eq!(Stage::Attachments.concurrency(&config), 1);
        assert_eq!(Stage::Containers.concurrency(&config), 50);
        assert_eq!(Stage::Finalization.concurrency(&config), 1);
    }

    #[test]
    fn only_finalization_is_not_repeatable() {
        assert!(!Stage::Finalization.is_repeatable());
        assert!(Stage::ORDER[..7].iter().all(|s| s.is_repeatable()));
    }
}
