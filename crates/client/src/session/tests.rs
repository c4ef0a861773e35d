use super::*;
use crate::storage::MemoryStore;
use futures_channel::mpsc::UnboundedReceiver;
use huddle_shared::WsEnvelope;

type Outbox = UnboundedReceiver<WsEnvelope<ClientCommand>>;

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
}

fn sent(outbox: &mut Outbox) -> Vec<ClientCommand> {
    let mut commands = Vec::new();
    while let Ok(Some(envelope)) = outbox.try_next() {
        commands.push(envelope.payload);
    }
    commands
}

/// A logged-in, connected session with its join already drained.
fn connected(name: &str) -> (Session<MemoryStore>, Outbox) {
    let mut session = Session::load(MemoryStore::new());
    session.login(name, None).unwrap();
    let (link, mut outbox) = WsHandle::channel("ws://relay/ws");
    session.connect(link).unwrap();
    assert!(matches!(sent(&mut outbox).as_slice(), [ClientCommand::Join(_)]));
    (session, outbox)
}

/// What the relay turns a command into, and whether the sender hears it too.
fn relayed(cmd: ClientCommand) -> (ServerEvent, bool) {
    match cmd {
        ClientCommand::Join(i) => (ServerEvent::UserJoined(i), true),
        ClientCommand::SendMessage(m) => (ServerEvent::MessageNew(m), true),
        ClientCommand::DeleteMessage(id) => (ServerEvent::MessageDeleted(id), true),
        ClientCommand::Typing(i) => (ServerEvent::Typing(i), false),
        ClientCommand::StopTyping(i) => (ServerEvent::StopTyping(i), false),
    }
}

/// Deliver everything `from` has queued to `from` and `to` per relay rules.
fn pump(
    outbox: &mut Outbox,
    from: &mut Session<MemoryStore>,
    to: &mut Session<MemoryStore>,
    now: DateTime<Utc>,
) {
    for cmd in sent(outbox) {
        let (event, echo) = relayed(cmd);
        if echo {
            from.handle_event(event.clone(), now);
        }
        to.handle_event(event, now);
    }
}

// --- Identity & lifecycle ---

#[test]
fn test_blank_login_is_suppressed() {
    let store = MemoryStore::new();
    let mut session = Session::load(store.clone());

    assert!(session.login("   ", None).is_none());
    assert!(session.identity().is_none());
    assert_eq!(store.snapshot(), PersistedSession::default());
}

#[test]
fn test_login_persists_and_reloads() {
    let store = MemoryStore::new();
    let mut session = Session::load(store.clone());
    let identity = session.login("Alice", Some("data:a".into())).cloned().unwrap();

    assert_eq!(identity.username, "Alice");
    assert!(!identity.user_id.is_empty());

    let restarted = Session::load(store);
    assert_eq!(restarted.identity(), Some(&identity));
    assert_eq!(restarted.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_requires_identity() {
    let mut session = Session::load(MemoryStore::new());
    let (link, _outbox) = WsHandle::channel("ws://relay/ws");

    assert!(matches!(session.connect(link), Err(SessionError::NoIdentity)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_announces_identity() {
    let mut session = Session::load(MemoryStore::new());
    let identity = session.login("Alice", None).cloned().unwrap();
    let (link, mut outbox) = WsHandle::channel("ws://relay/ws");

    session.connect(link).unwrap();
    assert!(session.is_connected());
    assert_eq!(sent(&mut outbox), vec![ClientCommand::Join(identity)]);
}

#[test]
fn test_reconnect_closes_previous_link() {
    let (mut session, _outbox) = connected("Alice");
    let old_id = session.link_id().unwrap();
    let (link, mut outbox) = WsHandle::channel("ws://relay/ws");
    let new_id = link.id();

    session.connect(link).unwrap();
    assert_eq!(sent(&mut outbox).len(), 1);

    // A late loss report for the old connection changes nothing
    assert!(!session.connection_lost(old_id));
    assert!(session.is_connected());
    assert!(session.connection_lost(new_id));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_events_from_replaced_link_are_ignored() {
    let (mut session, _outbox) = connected("Alice");
    let old_id = session.link_id().unwrap();
    let (link, _outbox) = WsHandle::channel("ws://relay/ws");
    let new_id = link.id();
    session.connect(link).unwrap();

    let bob = Identity::new("Bob", None);
    let late = ChatMessage::compose(&bob, "late", at(0));
    assert!(!session.handle_link_event(old_id, ServerEvent::MessageNew(late), at(0)));
    assert!(!session.handle_link_event(old_id, ServerEvent::UserJoined(bob.clone()), at(0)));
    assert!(session.chat().is_empty());
    assert!(session.announcements().is_empty());

    let fresh = ChatMessage::compose(&bob, "fresh", at(1));
    assert!(session.handle_link_event(new_id, ServerEvent::MessageNew(fresh.clone()), at(1)));
    assert!(session.chat().contains(&fresh.id));

    // Nothing is applied once the connection is gone
    session.connection_lost(new_id);
    let after = ServerEvent::UserLeft(bob);
    assert!(!session.handle_link_event(new_id, after, at(2)));
    assert!(session.announcements().is_empty());
}

#[test]
fn test_avatar_update_reannounces() {
    let (mut session, mut outbox) = connected("Alice");

    session.update_avatar(Some("data:new".into())).unwrap();

    let commands = sent(&mut outbox);
    match commands.as_slice() {
        [ClientCommand::Join(identity)] => assert_eq!(identity.avatar.as_deref(), Some("data:new")),
        other => panic!("unexpected commands: {:?}", other),
    }
    let stored = session.store().snapshot().identity.unwrap();
    assert_eq!(stored.avatar.as_deref(), Some("data:new"));
}

#[test]
fn test_avatar_update_offline_only_persists() {
    let mut session = Session::load(MemoryStore::new());
    session.login("Alice", None).unwrap();

    session.update_avatar(Some("data:new".into())).unwrap();
    assert_eq!(
        session.identity().and_then(|i| i.avatar.as_deref()),
        Some("data:new")
    );
}

#[test]
fn test_logout_resets_everything() {
    let (mut session, mut outbox) = connected("Alice");
    let store = session.store().clone();
    let link_id = session.link_id().unwrap();
    let message = ChatMessage::compose(session.identity().unwrap(), "hi", at(0));
    session.handle_event(ServerEvent::MessageNew(message), at(0));
    session.handle_event(ServerEvent::UserJoined(Identity::new("Bob", None)), at(0));
    session.handle_event(ServerEvent::Typing(Identity::new("Bob", None)), at(0));
    session.input("draft", at(0));
    sent(&mut outbox);

    session.logout();

    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.identity().is_none());
    assert!(session.chat().is_empty());
    assert!(session.typing().is_empty());
    assert!(session.announcements().is_empty());
    assert!(session.composer().is_empty());
    assert_eq!(store.snapshot(), PersistedSession::default());
    assert!(sent(&mut outbox).is_empty());
    assert!(!session.connection_lost(link_id));
}

#[test]
fn test_connection_lost_keeps_identity_and_chat() {
    let (mut session, _outbox) = connected("Alice");
    let message = ChatMessage::compose(session.identity().unwrap(), "hi", at(0));
    session.handle_event(ServerEvent::MessageNew(message), at(0));
    session.handle_event(ServerEvent::Typing(Identity::new("Bob", None)), at(0));

    let link_id = session.link_id().unwrap();
    assert!(session.connection_lost(link_id));
    assert!(!session.connection_lost(link_id));

    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.identity().is_some());
    assert_eq!(session.chat().len(), 1);
    assert!(session.typing().is_empty());
}

#[test]
fn test_closed_link_drops_to_disconnected() {
    let (mut session, outbox) = connected("Alice");
    let mut message = ChatMessage::compose(session.identity().unwrap(), "hi", at(0));
    message.id = "m1".into();
    session.handle_event(ServerEvent::MessageNew(message), at(0));
    drop(outbox);

    assert!(matches!(
        session.delete_message("m1"),
        Err(SessionError::LinkClosed)
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.delete_message("m1"),
        Err(SessionError::NotConnected)
    ));
}

// --- Incoming events ---

#[test]
fn test_chat_log_is_persisted_and_restored() {
    let (mut session, _outbox) = connected("Alice");
    let store = session.store().clone();
    let author = session.identity().cloned().unwrap();

    let first = ChatMessage::compose(&author, "one", at(0));
    let second = ChatMessage::compose(&author, "two", at(1));
    session.handle_event(ServerEvent::MessageNew(first.clone()), at(0));
    session.handle_event(ServerEvent::MessageNew(second.clone()), at(1));
    session.handle_event(ServerEvent::MessageDeleted(first.id.clone()), at(2));

    assert_eq!(store.snapshot().chat, vec![second.clone()]);
    let restarted = Session::load(store);
    assert_eq!(restarted.chat().messages(), &[second]);
}

#[test]
fn test_only_own_messages_can_be_deleted() {
    let (mut session, mut outbox) = connected("Alice");
    let bob = Identity::new("Bob", None);
    let theirs = ChatMessage::compose(&bob, "mine, not yours", at(0));
    let ours = ChatMessage::compose(session.identity().unwrap(), "hello", at(1));
    session.handle_event(ServerEvent::MessageNew(theirs.clone()), at(0));
    session.handle_event(ServerEvent::MessageNew(ours.clone()), at(1));

    assert!(!session.is_own(&theirs));
    assert!(session.is_own(&ours));

    assert!(!session.delete_message(&theirs.id).unwrap());
    assert!(!session.delete_message("never-seen").unwrap());
    assert!(sent(&mut outbox).is_empty());
    assert_eq!(session.chat().len(), 2);

    assert!(session.delete_message(&ours.id).unwrap());
    assert_eq!(
        sent(&mut outbox),
        vec![ClientCommand::DeleteMessage(ours.id.clone())]
    );
    // Removal waits for the relayed echo
    assert!(session.chat().contains(&ours.id));
}

#[test]
fn test_foreign_delete_is_refused_while_disconnected() {
    let mut session = Session::load(MemoryStore::new());
    session.login("Alice", None).unwrap();
    let bob = Identity::new("Bob", None);
    let theirs = ChatMessage::compose(&bob, "hi", at(0));
    session.handle_event(ServerEvent::MessageNew(theirs.clone()), at(0));

    assert!(matches!(session.delete_message(&theirs.id), Ok(false)));
}

#[test]
fn test_unknown_delete_is_noop() {
    let (mut session, _outbox) = connected("Alice");
    assert!(!session.handle_event(ServerEvent::MessageDeleted("ghost".into()), at(0)));
}

#[test]
fn test_partial_message_is_kept() {
    let (mut session, _outbox) = connected("Alice");
    let partial: ChatMessage = serde_json::from_str(r#"{"id":"m9","text":"no author"}"#).unwrap();

    assert!(session.handle_event(ServerEvent::MessageNew(partial), at(0)));
    let kept = session.chat().get("m9").unwrap();
    assert!(kept.avatar.is_none());
    assert_eq!(huddle_shared::display::initials(&kept.username), "?");
}

#[test]
fn test_own_typing_is_never_shown() {
    let (mut session, _outbox) = connected("Alice");
    let me = session.identity().cloned().unwrap();

    assert!(!session.handle_event(ServerEvent::Typing(me), at(0)));
    assert!(session.typing().is_empty());

    session.handle_event(ServerEvent::Typing(Identity::new("Bob", None)), at(0));
    assert_eq!(session.typing().users(), vec!["Bob"]);
}

#[test]
fn test_presence_announcements_use_local_time() {
    let (mut session, _outbox) = connected("Alice");
    let bob = Identity::new("Bob", None);

    session.handle_event(ServerEvent::UserJoined(bob.clone()), at(10));
    session.handle_event(ServerEvent::UserLeft(bob.clone()), at(20));

    let kinds: Vec<_> = session
        .announcements()
        .iter()
        .map(|a| (a.kind, a.identity.username.as_str(), a.timestamp))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (AnnouncementKind::Joined, "Bob", at(10)),
            (AnnouncementKind::Left, "Bob", at(20)),
        ]
    );
}

// --- Composer ---

#[test]
fn test_enter_submits_and_stops_typing() {
    let (mut session, mut outbox) = connected("Alice");
    let me = session.identity().cloned().unwrap();

    session.input("hello", at(0));
    let message = session
        .key(KeyInput::Enter { line_break: false }, at(10))
        .unwrap()
        .unwrap();

    assert_eq!(message.text, "hello");
    assert_eq!(message.user_id, me.user_id);
    assert!(session.composer().is_empty());
    assert_eq!(
        sent(&mut outbox),
        vec![
            ClientCommand::Typing(me.clone()),
            ClientCommand::SendMessage(message),
            ClientCommand::StopTyping(me),
        ]
    );

    // The quiet-period timer was disarmed by the submit
    session.tick(at(5000));
    assert!(sent(&mut outbox).is_empty());
}

#[test]
fn test_line_break_modifier_inserts_newline() {
    let (mut session, mut outbox) = connected("Alice");

    session.input("first", at(0));
    assert_eq!(session.key(KeyInput::Enter { line_break: true }, at(1)).unwrap(), None);
    let text = format!("{}second", session.composer());
    session.input(text, at(2));
    let message = session.submit(at(3)).unwrap().unwrap();

    assert_eq!(message.text, "first\nsecond");
    let sends = sent(&mut outbox)
        .into_iter()
        .filter(|c| matches!(c, ClientCommand::SendMessage(_)))
        .count();
    assert_eq!(sends, 1);
}

#[test]
fn test_blank_submit_is_suppressed() {
    let (mut session, mut outbox) = connected("Alice");
    session.input(" \n\t ", at(0));
    sent(&mut outbox);

    assert_eq!(session.submit(at(1)).unwrap(), None);
    assert!(sent(&mut outbox).is_empty());
    assert_eq!(session.composer(), " \n\t ");
}

#[test]
fn test_submit_while_disconnected_keeps_draft() {
    let mut session = Session::load(MemoryStore::new());
    session.login("Alice", None).unwrap();
    session.input("draft", at(0));

    assert!(matches!(session.submit(at(1)), Err(SessionError::NotConnected)));
    assert_eq!(session.composer(), "draft");
}

#[test]
fn test_quiet_period_emits_single_stop() {
    let (mut session, mut outbox) = connected("Alice");
    let me = session.identity().cloned().unwrap();

    session.input("h", at(0));
    session.input("he", at(400));
    assert_eq!(session.next_deadline(), Some(at(1400)));

    session.tick(at(1399));
    assert_eq!(sent(&mut outbox).len(), 2);

    session.tick(at(1400));
    session.tick(at(3000));
    assert_eq!(sent(&mut outbox), vec![ClientCommand::StopTyping(me)]);
    assert_eq!(session.next_deadline(), None);
}

#[test]
fn test_clearing_input_stops_typing() {
    let (mut session, mut outbox) = connected("Alice");
    let me = session.identity().cloned().unwrap();

    session.input("a", at(0));
    session.input("", at(100));
    assert_eq!(
        sent(&mut outbox),
        vec![ClientCommand::Typing(me.clone()), ClientCommand::StopTyping(me)]
    );
    assert_eq!(session.next_deadline(), None);

    session.tick(at(2000));
    assert!(sent(&mut outbox).is_empty());
}

#[test]
fn test_clearing_idle_input_sends_nothing() {
    let (mut session, mut outbox) = connected("Alice");

    session.input("   ", at(0));
    session.input("", at(100));
    assert!(sent(&mut outbox).is_empty());
    assert_eq!(session.next_deadline(), None);
    assert!(session.composer().is_empty());
}

// --- Two-client scenarios ---

#[test]
fn test_scenario_message_then_delete() {
    let (mut alice, mut alice_out) = connected("Alice");
    let (mut bob, _bob_out) = connected("Bob");

    let mut message = ChatMessage::compose(alice.identity().unwrap(), "hi", at(0));
    message.id = "m1".into();
    alice.link.as_ref().unwrap().send(ClientCommand::SendMessage(message)).unwrap();
    pump(&mut alice_out, &mut alice, &mut bob, at(0));

    for log in [alice.chat(), bob.chat()] {
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("m1").map(|m| m.text.as_str()), Some("hi"));
    }

    assert!(!bob.delete_message("m1").unwrap());
    assert!(alice.delete_message("m1").unwrap());
    pump(&mut alice_out, &mut alice, &mut bob, at(1));

    assert!(alice.chat().is_empty());
    assert!(bob.chat().is_empty());
}

#[test]
fn test_scenario_typing_expires_after_quiescence() {
    let (mut alice, _alice_out) = connected("Alice");
    let (mut bob, mut bob_out) = connected("Bob");

    // Bob types for 200ms, then stops hitting keys
    for (ms, text) in [(0, "h"), (100, "he"), (200, "hey")] {
        bob.input(text, at(ms));
        pump(&mut bob_out, &mut bob, &mut alice, at(ms));
    }
    assert!(bob.typing().is_empty());

    alice.tick(at(1100));
    assert!(alice.typing().contains("Bob"));

    // Either path removes Bob at the end of the quiet period: Alice's own
    // expiry, or the stop Bob's timer sends
    bob.tick(at(1200));
    alice.tick(at(1200));
    assert!(!alice.typing().contains("Bob"));
    pump(&mut bob_out, &mut bob, &mut alice, at(1200));
    assert!(!alice.typing().contains("Bob"));
}

#[test]
fn test_scenario_submit_clears_typing_before_timeout() {
    let (mut alice, _alice_out) = connected("Alice");
    let (mut bob, mut bob_out) = connected("Bob");

    bob.input("o", at(0));
    bob.input("ok", at(10));
    pump(&mut bob_out, &mut bob, &mut alice, at(10));
    assert!(alice.typing().contains("Bob"));

    bob.submit(at(20)).unwrap();
    pump(&mut bob_out, &mut bob, &mut alice, at(20));
    assert!(!alice.typing().contains("Bob"));
    assert_eq!(alice.chat().len(), 1);
    assert_eq!(bob.chat().len(), 1);
}

#[test]
fn test_scenario_abrupt_departure() {
    let (mut alice, mut alice_out) = connected("Alice");
    let (mut bob, _bob_out) = connected("Bob");

    let message = ChatMessage::compose(alice.identity().unwrap(), "bye", at(0));
    alice.link.as_ref().unwrap().send(ClientCommand::SendMessage(message)).unwrap();
    pump(&mut alice_out, &mut alice, &mut bob, at(0));

    // The relay notices Alice's socket died
    let departed = alice.identity().cloned().unwrap();
    bob.handle_event(ServerEvent::UserLeft(departed.clone()), at(500));

    let left: Vec<_> = bob
        .announcements()
        .iter()
        .filter(|a| a.kind == AnnouncementKind::Left)
        .collect();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].identity, departed);
    assert_eq!(bob.chat().len(), 1);
}
