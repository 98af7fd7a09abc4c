use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::{CommandKind, ComponentId, HostId};

/// Builds command identifiers unique within the process.
///
/// Format: `<prefix>_<host>_<component>_<unix millis>_<sequence>`. The sequence keeps ids
/// distinct when several commands for the same pair are issued within one millisecond.
#[derive(Debug, Default)]
pub struct CommandIdGenerator {
    sequence: AtomicU64,
}

impl CommandIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, kind: CommandKind, host_id: HostId, component_id: ComponentId) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{host_id}_{component_id}_{}_{sequence}",
            kind.id_prefix(),
            Utc::now().timestamp_millis()
        )
    }
}
