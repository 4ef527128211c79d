use serde::Serialize;

use crate::store::shard_path;

/// One status update read from a shard.
///
/// Records are built per query and never mutated or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Author of the shard the record came from.
    pub user: String,
    /// Era of the shard the record came from (not derived from `when`).
    pub era: i64,
    /// Epoch seconds.
    pub when: i64,
    /// Room (`#name`) or free-form origin label.
    pub channel: String,
    /// Remaining free text of the line.
    pub message: String,
}

impl Record {
    /// Whether the channel names a room rather than an origin label.
    #[must_use]
    pub fn is_room(&self) -> bool {
        self.channel.starts_with('#')
    }

    /// Room name without the leading `#`, if the channel is a room.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.channel.strip_prefix('#')
    }

    /// Link to the shard holding this record, under `base`.
    #[must_use]
    pub fn shard_link(&self, base: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            shard_path(&self.user, self.era)
        )
    }
}
