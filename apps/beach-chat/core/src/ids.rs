use crate::message::MessageId;
use time::OffsetDateTime;

/// Hands out message ids for one view.
///
/// Ids are millisecond timestamps, bumped past the previous id whenever the
/// clock has not moved, so a single generator never repeats itself. Ids from
/// different generators (another view, the server backlog) can still
/// collide; timelines tolerate that.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: MessageId,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> MessageId {
        self.next_at(now_millis())
    }

    fn next_at(&mut self, now: MessageId) -> MessageId {
        let id = now.max(self.last.saturating_add(1));
        self.last = id;
        id
    }
}

fn now_millis() -> MessageId {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    MessageId::try_from(millis).unwrap_or_default()
}
