//! Conversation feed integration tests
//!
//! Ordering, replay, resubscribe after channel loss, and session end, run
//! against a temp-file SQLite database.

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use caseai_common::{Error, Message, SessionId};
use caseai_server::db::{self, NewMessage};
use caseai_server::ingest::SubmitMessage;
use caseai_server::responder::ScriptedResponder;
use futures::{Stream, StreamExt};
use helpers::TestServer;

const WAIT: Duration = Duration::from_secs(5);

async fn next_message<S>(stream: &mut S) -> Message
where
    S: Stream<Item = caseai_common::Result<Message>> + Unpin,
{
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("feed stalled")
        .expect("feed ended")
        .expect("feed error")
}

async fn submit(server: &TestServer, session: SessionId, content: &str, is_human: bool, awaiting: bool) -> Message {
    server
        .ctx
        .ingest
        .submit(SubmitMessage {
            started_case_id: session.to_string(),
            content: content.to_string(),
            is_human,
            awaiting_user_input: awaiting,
            ..Default::default()
        })
        .await
        .expect("submit")
}

/// S1: `[m1 human, m2 ai, m3 ai awaiting]`
async fn seed_s1(server: &TestServer, session: SessionId) -> (Message, Message, Message) {
    let m1 = submit(server, session, "hello", true, false).await;
    let m2 = submit(server, session, "hi there", false, false).await;
    let m3 = submit(server, session, "how can I help", false, true).await;
    (m1, m2, m3)
}

#[tokio::test]
async fn test_replay_after_last_seen() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let (m1, m2, m3) = seed_s1(&server, session).await;

    let cursor = server
        .ctx
        .feed
        .resolve_cursor(session, Some(m1.message_id))
        .await
        .unwrap();
    let mut feed = Box::pin(server.ctx.feed.subscribe(session, cursor));

    let first = next_message(&mut feed).await;
    let second = next_message(&mut feed).await;
    assert_eq!(first.message_id, m2.message_id);
    assert_eq!(second.message_id, m3.message_id);
    assert!(second.awaiting_user_input);
}

#[tokio::test]
async fn test_stream_matches_query_order() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    for i in 0..10 {
        submit(&server, session, &format!("message {}", i), i % 3 == 0, false).await;
    }

    let stored = db::messages::query_messages(&server.ctx.db_pool, session, None)
        .await
        .unwrap();
    for pair in stored.windows(2) {
        assert!(pair[0].order_key() < pair[1].order_key());
    }

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    let mut streamed = Vec::new();
    for _ in 0..stored.len() {
        streamed.push(next_message(&mut feed).await.message_id);
    }
    let expected: Vec<i64> = stored.iter().map(|m| m.message_id).collect();
    assert_eq!(streamed, expected);
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let (m1, _, _) = seed_s1(&server, session).await;

    let cursor = server
        .ctx
        .feed
        .resolve_cursor(session, Some(m1.message_id))
        .await
        .unwrap();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut feed = Box::pin(server.ctx.feed.subscribe(session, cursor));
        let ids = vec![
            next_message(&mut feed).await.message_id,
            next_message(&mut feed).await.message_id,
        ];
        runs.push(ids);
    }
    assert_eq!(runs[0], runs[1]);

    let pulled: Vec<i64> = server
        .ctx
        .feed
        .fetch_after(session, cursor)
        .await
        .unwrap()
        .iter()
        .map(|m| m.message_id)
        .collect();
    assert_eq!(pulled, runs[0]);
}

#[tokio::test]
async fn test_live_delivery_after_replay() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let m1 = submit(&server, session, "hello", true, false).await;

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    assert_eq!(next_message(&mut feed).await.message_id, m1.message_id);

    let m2 = submit(&server, session, "live one", false, false).await;
    assert_eq!(next_message(&mut feed).await.message_id, m2.message_id);
}

#[tokio::test]
async fn test_resolve_cursor_rejects_foreign_message() {
    let server = TestServer::start().await;
    let (first, _) = server.start_session().await;
    let (second, _) = server.start_session().await;
    let m = submit(&server, first, "hello", true, false).await;

    let err = server
        .ctx
        .feed
        .resolve_cursor(second, Some(m.message_id))
        .await
        .unwrap_err();
    assert!(matches!(err, caseai_common::Error::Validation(_)));
}

#[tokio::test]
async fn test_messages_during_channel_outage_are_delivered() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let m1 = submit(&server, session, "hello", true, false).await;

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    assert_eq!(next_message(&mut feed).await.message_id, m1.message_id);

    // Drop the channel, then store rows without publishing any hint
    assert!(server.ctx.notifier.close(&session.channel()));
    let mut silent = Vec::new();
    for content in ["during outage 1", "during outage 2"] {
        let stored = db::messages::insert_message(
            &server.ctx.db_pool,
            &NewMessage {
                started_case_id: session,
                persona_id: None,
                content: content.to_string(),
                is_human: false,
                awaiting_user_input: false,
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();
        silent.push(stored.message_id);
    }

    let delivered = vec![
        next_message(&mut feed).await.message_id,
        next_message(&mut feed).await.message_id,
    ];
    assert_eq!(delivered, silent);

    // Resubscribed: hints work again
    let m4 = submit(&server, session, "after outage", false, false).await;
    assert_eq!(next_message(&mut feed).await.message_id, m4.message_id);
}

#[tokio::test]
async fn test_session_end_finishes_stream() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let m1 = submit(&server, session, "hello", true, false).await;

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    assert_eq!(next_message(&mut feed).await.message_id, m1.message_id);

    assert!(db::sessions::end_session(&server.ctx.db_pool, session).await.unwrap());
    server.ctx.notifier.close(&session.channel());

    let end = tokio::time::timeout(WAIT, feed.next()).await.expect("feed stalled");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_ended_session_replays_then_finishes() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let (_, _, m3) = seed_s1(&server, session).await;
    db::sessions::end_session(&server.ctx.db_pool, session).await.unwrap();

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    let mut ids = Vec::new();
    while let Some(item) = tokio::time::timeout(WAIT, feed.next()).await.expect("feed stalled") {
        ids.push(item.unwrap().message_id);
    }
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.last().copied(), Some(m3.message_id));
}

#[tokio::test]
async fn test_dropping_stream_releases_listener() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    submit(&server, session, "hello", true, false).await;

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    next_message(&mut feed).await;
    assert_eq!(server.ctx.notifier.listener_count(&session.channel()), 1);

    drop(feed);
    assert_eq!(server.ctx.notifier.listener_count(&session.channel()), 0);
    assert_eq!(server.ctx.notifier.active_channels(), 0);
}

#[tokio::test]
async fn test_scripted_replies_reach_feed() {
    let server = TestServer::start_with(|ctx| ctx.with_responder(Arc::new(ScriptedResponder::new()))).await;
    let (session, _) = server.start_session().await;

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    let human = submit(&server, session, "What about the risk?", true, false).await;
    assert_eq!(next_message(&mut feed).await.message_id, human.message_id);

    let first = next_message(&mut feed).await;
    let second = next_message(&mut feed).await;
    assert!(!first.is_human && !second.is_human);
    assert!(!first.awaiting_user_input);
    assert!(second.awaiting_user_input);
    assert_eq!(second.persona_role.as_deref(), Some("Discussion Leader"));
}

#[tokio::test]
async fn test_concurrent_submissions_are_totally_ordered() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let writers: Vec<_> = (0..40)
        .map(|i| {
            let ingest = server.ctx.ingest.clone();
            tokio::spawn(async move {
                ingest
                    .submit(SubmitMessage {
                        started_case_id: session.to_string(),
                        content: format!("turn {}", i),
                        is_human: i % 2 == 0,
                        ..Default::default()
                    })
                    .await
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().expect("concurrent submit");
    }

    let stored = db::messages::query_messages(&server.ctx.db_pool, session, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 40);
    for pair in stored.windows(2) {
        assert!(pair[0].order_key() < pair[1].order_key());
        assert!(pair[0].message_id < pair[1].message_id);
    }

    // The live feed agrees with the store
    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    for expected in &stored {
        assert_eq!(next_message(&mut feed).await.message_id, expected.message_id);
    }
}

#[tokio::test]
async fn test_insert_refused_once_session_ended() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    assert!(db::sessions::end_session(&server.ctx.db_pool, session).await.unwrap());

    // Straight to the store, past ingest's own status check
    let result = db::messages::insert_message(
        &server.ctx.db_pool,
        &NewMessage {
            started_case_id: session,
            persona_id: None,
            content: "late".to_string(),
            is_human: true,
            awaiting_user_input: false,
            metadata: serde_json::Value::Null,
        },
    )
    .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 0);
}

#[tokio::test]
async fn test_storage_failure_is_retried_then_reported() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    submit(&server, session, "hello", true, false).await;

    let feed_config = &server.ctx.config.feed;
    let total_backoff: Duration = (0..feed_config.retry_attempts)
        .map(|attempt| feed_config.retry_delay(attempt))
        .sum();

    server.ctx.db_pool.close().await;

    let started = Instant::now();
    let result = server.ctx.feed.fetch_after(session, None).await;
    assert!(matches!(result, Err(Error::Storage(_))));
    assert!(started.elapsed() >= total_backoff);

    let mut feed = Box::pin(server.ctx.feed.subscribe(session, None));
    let item = tokio::time::timeout(WAIT, feed.next())
        .await
        .expect("feed stalled")
        .expect("feed ended without reporting the failure");
    assert!(matches!(item, Err(Error::Storage(_))));

    let end = tokio::time::timeout(WAIT, feed.next()).await.expect("feed stalled");
    assert!(end.is_none());
}
