use std::cell::RefCell;
use std::collections::HashMap;

/// Counters for logical replies produced by a builder
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SendStats {
    pub count: u64,
    pub total_bytes: u64,
}

/// Per-thread reply counters.
///
/// Every worker thread owns its own copy, so no synchronization is involved.
/// Use [`ReplyStats::merge`] to aggregate snapshots collected from several threads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplyStats {
    pub send_stats: SendStats,

    /// Physical writes issued to sinks
    pub io_write_cnt: u64,
    pub io_write_bytes: u64,

    /// Error replies sent, keyed by error kind
    pub err_count: HashMap<String, u64>,
}

impl ReplyStats {
    pub fn merge(&mut self, other: &ReplyStats) {
        self.send_stats.count += other.send_stats.count;
        self.send_stats.total_bytes += other.send_stats.total_bytes;
        self.io_write_cnt += other.io_write_cnt;
        self.io_write_bytes += other.io_write_bytes;
        for (kind, count) in &other.err_count {
            *self.err_count.entry(kind.clone()).or_insert(0) += count;
        }
    }
}

thread_local! {
    static TL_REPLY_STATS: RefCell<ReplyStats> = RefCell::new(ReplyStats::default());
}

/// Snapshot of the calling thread's counters
pub fn thread_local_stats() -> ReplyStats {
    TL_REPLY_STATS.with(|s| s.borrow().clone())
}

pub fn reset_thread_local_stats() {
    TL_REPLY_STATS.with(|s| *s.borrow_mut() = ReplyStats::default());
}

#[inline]
pub(crate) fn record_send(bytes: usize) {
    TL_REPLY_STATS.with(|s| {
        let mut s = s.borrow_mut();
        s.send_stats.count += 1;
        s.send_stats.total_bytes += bytes as u64;
    });
}

#[inline]
pub(crate) fn record_io_write(bytes: usize) {
    TL_REPLY_STATS.with(|s| {
        let mut s = s.borrow_mut();
        s.io_write_cnt += 1;
        s.io_write_bytes += bytes as u64;
    });
}

pub(crate) fn record_error(kind: &str) {
    TL_REPLY_STATS.with(|s| {
        let mut s = s.borrow_mut();
        match s.err_count.get_mut(kind) {
            Some(count) => *count += 1,
            None => {
                s.err_count.insert(kind.to_string(), 1);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_thread_local() {
        reset_thread_local_stats();
        record_send(10);
        record_error("syntax_error");

        let other = std::thread::spawn(|| {
            record_send(5);
            thread_local_stats()
        })
        .join()
        .unwrap();

        let mine = thread_local_stats();
        assert_eq!(mine.send_stats.count, 1);
        assert_eq!(mine.send_stats.total_bytes, 10);
        assert_eq!(mine.err_count.get("syntax_error"), Some(&1));
        assert_eq!(other.send_stats.count, 1);
        assert!(other.err_count.is_empty());
    }

    #[test]
    fn test_merge() {
        let mut a = ReplyStats::default();
        a.io_write_cnt = 2;
        a.err_count.insert("wrong_type".into(), 1);

        let mut b = ReplyStats::default();
        b.io_write_cnt = 3;
        b.io_write_bytes = 40;
        b.err_count.insert("wrong_type".into(), 2);

        a.merge(&b);
        assert_eq!(a.io_write_cnt, 5);
        assert_eq!(a.io_write_bytes, 40);
        assert_eq!(a.err_count["wrong_type"], 3);
    }
}
