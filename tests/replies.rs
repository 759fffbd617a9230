use feox_reply::io::MemSink;
use feox_reply::protocol::{RespFrame, RespReader};
use feox_reply::reply::{CollectionType, GetResp, Recorded, ReplyMode, SinkReplyBuilder2};
use feox_reply::{
    stats, McReplyBuilder, MGetResponse, RedisReplyBuilder, ReplyAggregator, ReplyBuilder,
    ReplyConfig,
};
use bytes::Bytes;
use std::io;

fn redis(resp3: bool) -> (RedisReplyBuilder, MemSink) {
    let sink = MemSink::new();
    let mut rb = RedisReplyBuilder::new(sink.clone());
    rb.set_resp3(resp3);
    (rb, sink)
}

fn sample_response() -> MGetResponse {
    let mut resp = MGetResponse::new(3);
    resp.insert(0, "k1", b"v1");
    resp.insert(2, "k3", b"v2");
    resp
}

fn bulk(data: &'static [u8]) -> RespFrame {
    RespFrame::BulkString(Some(Bytes::from_static(data)))
}

#[test]
fn aggregation_scope_produces_one_write() {
    let (mut rb, sink) = redis(false);
    {
        let mut agg = ReplyAggregator::new(&mut rb);
        agg.start_array(3);
        agg.send_long(1);
        {
            // A nested command aggregating on its own, as inside MULTI/EXEC
            let mut inner = ReplyAggregator::new(&mut *agg);
            inner.send_simple_string("OK");
        }
        agg.send_bulk_string("end");
        assert_eq!(sink.write_count(), 0);
    }
    assert_eq!(
        sink.writes(),
        vec![b"*3\r\n:1\r\n+OK\r\n$3\r\nend\r\n".to_vec()]
    );
}

#[test]
fn aggregation_works_through_trait_objects() {
    let sink = MemSink::new();
    let mut rb: Box<dyn ReplyBuilder> = Box::new(McReplyBuilder::new(sink.clone()));
    {
        let mut agg = ReplyAggregator::new(rb.as_mut());
        agg.send_stored();
        agg.send_long(5);
    }
    assert_eq!(sink.writes(), vec![b"STORED\r\n5\r\n".to_vec()]);
}

#[test]
fn batch_mode_off_flushes_all_replies_in_order() {
    let (mut rb, sink) = redis(false);
    rb.set_batch_mode(true).unwrap();
    for i in 0..10 {
        rb.send_long(i);
    }
    assert_eq!(sink.write_count(), 0);
    rb.set_batch_mode(false).unwrap();

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    let frames = RespReader::parse_all(&writes[0]).unwrap();
    let expected: Vec<_> = (0..10).map(RespFrame::Integer).collect();
    assert_eq!(frames, expected);
}

#[test]
fn redis_mget_keeps_misses_in_place() {
    let (mut rb, sink) = redis(false);
    rb.send_mget_response(sample_response());
    assert_eq!(
        sink.writes(),
        vec![b"*3\r\n$2\r\nv1\r\n$-1\r\n$2\r\nv2\r\n".to_vec()]
    );

    let (mut rb, sink) = redis(true);
    rb.send_mget_response(sample_response());
    let frames = RespReader::parse_all(&sink.contents()).unwrap();
    assert_eq!(
        frames,
        vec![RespFrame::Array(Some(vec![
            bulk(b"v1"),
            RespFrame::Null,
            bulk(b"v2")
        ]))]
    );
}

#[test]
fn memcache_mget_omits_misses() {
    let sink = MemSink::new();
    let mut rb = McReplyBuilder::new(sink.clone());
    rb.send_mget_response(sample_response());
    assert_eq!(
        sink.contents(),
        b"VALUE k1 0 2\r\nv1\r\nVALUE k3 0 2\r\nv2\r\nEND\r\n"
    );
}

#[test]
fn moved_response_keeps_its_arena() {
    let mut a = sample_response();
    let b = std::mem::take(&mut a);
    drop(a);

    let (mut rb, sink) = redis(false);
    rb.send_mget_response(b);
    assert_eq!(
        sink.contents(),
        b"*3\r\n$2\r\nv1\r\n$-1\r\n$2\r\nv2\r\n"
    );
}

#[test]
fn values_from_another_response_are_never_sent() {
    let mut other = MGetResponse::new(1);
    other.alloc_storage(16);
    let block = other.alloc_storage(16);
    let foreign = other.store(block, b"other").unwrap();

    let mut resp = MGetResponse::new(2);
    resp.insert(0, "k1", b"v1");
    assert!(resp.set(1, GetResp::new("k2", foreign)).is_none());

    let (mut rb, sink) = redis(false);
    rb.send_mget_response(resp);
    assert_eq!(sink.contents(), b"*2\r\n$2\r\nv1\r\n$-1\r\n");
}

#[test]
fn doubles_round_trip() {
    let (mut rb, sink) = redis(true);
    rb.send_double(1.0);
    rb.send_double(f64::INFINITY);
    rb.send_double(f64::NEG_INFINITY);
    rb.send_double(f64::NAN);
    rb.send_double(-0.125);

    assert_eq!(
        sink.contents(),
        b",1\r\n,inf\r\n,-inf\r\n,nan\r\n,-0.125\r\n"
    );

    let frames = RespReader::parse_all(&sink.contents()).unwrap();
    assert_eq!(frames[0], RespFrame::Double(1.0));
    assert_eq!(frames[1], RespFrame::Double(f64::INFINITY));
    assert_eq!(frames[2], RespFrame::Double(f64::NEG_INFINITY));
    assert!(matches!(frames[3], RespFrame::Double(v) if v.is_nan()));
    assert_eq!(frames[4], RespFrame::Double(-0.125));
}

#[test]
fn map_framing_depends_on_protocol() {
    let (mut rb, sink) = redis(true);
    rb.send_string_arr(["a", "1", "b", "2"], CollectionType::Map);
    let frames = RespReader::parse_all(&sink.contents()).unwrap();
    assert_eq!(
        frames,
        vec![RespFrame::Map(vec![
            (bulk(b"a"), bulk(b"1")),
            (bulk(b"b"), bulk(b"2"))
        ])]
    );

    let (mut rb, sink) = redis(false);
    rb.send_string_arr(["a", "1", "b", "2"], CollectionType::Map);
    let frames = RespReader::parse_all(&sink.contents()).unwrap();
    assert_eq!(
        frames,
        vec![RespFrame::Array(Some(vec![
            bulk(b"a"),
            bulk(b"1"),
            bulk(b"b"),
            bulk(b"2")
        ]))]
    );
}

#[test]
fn nothing_reaches_the_sink_after_a_failure() {
    let (mut rb, sink) = redis(false);
    rb.set_batch_mode(true).unwrap();
    rb.send_simple_string("first");

    sink.fail_with(io::ErrorKind::BrokenPipe);
    assert!(rb.flush_batch().is_err());
    sink.recover();

    rb.send_bulk_string("partial");
    {
        let mut agg = ReplyAggregator::new(&mut rb);
        agg.start_array(1);
        agg.send_long(1);
    }
    assert!(rb.set_batch_mode(false).is_err());
    assert!(rb.flush_batch().is_err());
    assert_eq!(rb.get_error(), Some(io::ErrorKind::BrokenPipe));
    assert!(sink.contents().is_empty());
}

#[test]
fn noreply_keeps_stats_consistent() {
    stats::reset_thread_local_stats();

    let quiet = MemSink::new();
    let mut rb = McReplyBuilder::new(quiet.clone());
    rb.set_noreply(true);
    rb.expect_reply();
    rb.send_stored();
    let suppressed = stats::thread_local_stats();
    assert!(rb.has_replied());
    assert!(quiet.contents().is_empty());

    stats::reset_thread_local_stats();
    let loud = MemSink::new();
    let mut rb = McReplyBuilder::new(loud.clone());
    rb.expect_reply();
    rb.send_stored();
    let sent = stats::thread_local_stats();
    assert!(rb.has_replied());
    assert_eq!(loud.contents(), b"STORED\r\n");

    assert_eq!(suppressed.send_stats, sent.send_stats);
    assert_eq!(suppressed.io_write_cnt, 0);
    assert_eq!(sent.io_write_cnt, 1);
}

#[test]
fn error_counts_are_tracked_per_kind() {
    stats::reset_thread_local_stats();
    let (mut rb, _sink) = redis(false);
    rb.send_error("syntax error", "");
    rb.send_error("syntax error", "");
    rb.send_protocol_error("bad");
    let s = stats::thread_local_stats();
    assert_eq!(s.err_count.get("syntax_error"), Some(&2));
    assert_eq!(s.err_count.get("protocol_error"), Some(&1));
}

#[test]
fn only_err_mode_records_errors() {
    let sink = MemSink::new();
    let config = ReplyConfig {
        reply_mode: ReplyMode::OnlyErr,
        ..Default::default()
    };
    let mut rb = RedisReplyBuilder::with_config(sink.clone(), &config);
    rb.send_ok();
    rb.send_error("value is not an integer or out of range", "");
    assert_eq!(
        rb.core().recorded(),
        vec![Recorded::Error(
            "value is not an integer or out of range".into()
        )]
    );
    assert_eq!(
        sink.contents(),
        b"+OK\r\n-ERR value is not an integer or out of range\r\n".as_slice()
    );
}

#[test]
fn vectored_scope_references_values() {
    let sink = MemSink::new();
    let mut rb = SinkReplyBuilder2::new(sink.clone());
    let values: Vec<Vec<u8>> = vec![vec![b'a'; 1000], vec![b'b'; 3]];
    {
        let mut scope = rb.reply_scope();
        scope.write(b"*2\r\n");
        for value in &values {
            scope.write_bulk_string(value);
        }
    }

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    let frames = RespReader::parse_all(&writes[0]).unwrap();
    assert_eq!(
        frames,
        vec![RespFrame::Array(Some(vec![
            RespFrame::BulkString(Some(Bytes::from(values[0].clone()))),
            bulk(b"bbb"),
        ]))]
    );
}
