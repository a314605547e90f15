use {
    alloy_primitives::{Address, B256, Bytes},
    model::events::EventIndex,
};

/// A raw chain log together with its block and transaction coordinates, as
/// delivered by the log retriever.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Timestamps of the blocks at each side of a synced range. Fetching both
/// ends once lets us estimate the timestamp of every block within the range
/// without issuing a block lookup per log.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockRange {
    pub from_block: u64,
    pub from_timestamp: u64,
    pub to_block: u64,
    pub to_timestamp: u64,
}

impl BlockRange {
    fn timestamp_of(&self, block: u64) -> u64 {
        if self.to_block <= self.from_block || block <= self.from_block {
            return self.from_timestamp;
        }
        let span = self.to_timestamp.saturating_sub(self.from_timestamp);
        let offset = span * (block.min(self.to_block) - self.from_block)
            / (self.to_block - self.from_block);
        self.from_timestamp + offset
    }
}

/// Base coordinates of the canonical events derived from a log. The batch
/// index starts at 1; handlers that fan one log out into several events bump
/// it per emitted event.
pub fn base_event_params(log: &RawLog, range: &BlockRange) -> EventIndex {
    EventIndex {
        block: log.block_number,
        block_hash: log.block_hash,
        tx_hash: log.tx_hash,
        log_index: log.log_index,
        batch_index: 1,
        timestamp: range.timestamp_of(log.block_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_timestamps_linearly() {
        let range = BlockRange {
            from_block: 100,
            from_timestamp: 1_000,
            to_block: 110,
            to_timestamp: 1_120,
        };
        assert_eq!(range.timestamp_of(100), 1_000);
        assert_eq!(range.timestamp_of(105), 1_060);
        assert_eq!(range.timestamp_of(110), 1_120);
        // Out-of-range blocks clamp instead of extrapolating.
        assert_eq!(range.timestamp_of(99), 1_000);
        assert_eq!(range.timestamp_of(111), 1_120);
    }

    #[test]
    fn single_block_range_uses_the_start_timestamp() {
        let range = BlockRange {
            from_block: 100,
            from_timestamp: 1_000,
            to_block: 100,
            to_timestamp: 1_000,
        };
        assert_eq!(range.timestamp_of(100), 1_000);
    }
}
