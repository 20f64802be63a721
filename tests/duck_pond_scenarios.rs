//! End-to-end scenarios for the relay engine.
//!
//! An in-memory platform stands in for Discord: it holds messages and members,
//! applies the bot's own reactions to the stored messages, and records every
//! webhook post, so each test drives the engine exactly like the gateway
//! handler would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use duck_pond::channels::{MessageStore, ProxyChannel};
use duck_pond::config::{COMPLETION_SYMBOL, DUCK_SYMBOL, RelayConfig};
use duck_pond::error::RelayError;
use duck_pond::pond::EmojiMatcher;
use duck_pond::pond::model::{
    Actor, Attachment, ChannelId, EmojiValue, GuildId, Message, MessageId, Notice, NoticeColour,
    Polarity, ProxyIdentity, Reaction, ReactionEvent, UserId,
};
use duck_pond::pond::relay::IRRETRIEVABLE_ATTACHMENT;
use duck_pond::pond::{IgnoreReason, Outcome, RelayEngine};

const BOT_ID: UserId = 999;
const STAFF_ROLE: u64 = 100;
const MEMBER_ROLE: u64 = 200;
const GUILD: GuildId = 1;
const CHANNEL: ChannelId = 2;
const DUCKY_YELLOW: u64 = 574_590_645_734_932_490;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Post {
    Text(String),
    File(String),
    Notice(Notice),
}

#[derive(Default)]
struct Pond {
    messages: Mutex<HashMap<MessageId, Message>>,
    members: Mutex<HashMap<UserId, Actor>>,
    posts: Mutex<Vec<(Post, ProxyIdentity)>>,
    fetches: AtomicUsize,
    /// Every fetch fails with a transport error while set.
    unavailable: AtomicBool,
}

impl Pond {
    fn new() -> Arc<Self> {
        let pond = Self::default();
        pond.join(Actor::new(BOT_ID, "Duck Pond").with_roles([STAFF_ROLE]).bot());
        Arc::new(pond)
    }

    fn join(&self, actor: Actor) {
        self.members.lock().unwrap().insert(actor.id, actor);
    }

    fn post_message(
        &self,
        id: MessageId,
        author: Actor,
        content: &str,
        attachments: Vec<Attachment>,
    ) {
        self.join(author.clone());
        self.messages.lock().unwrap().insert(
            id,
            Message {
                id,
                channel_id: CHANNEL,
                guild_id: Some(GUILD),
                author,
                content: content.into(),
                attachments,
                reactions: vec![],
            },
        );
    }

    fn react(&self, message_id: MessageId, emoji: &EmojiValue, user_id: UserId) {
        let actor = self.members.lock().unwrap()[&user_id].clone();
        let mut messages = self.messages.lock().unwrap();
        let message = messages.get_mut(&message_id).unwrap();
        match message.reactions.iter_mut().find(|r| &r.emoji == emoji) {
            Some(reaction) => {
                if !reaction.reactors.iter().any(|a| a.id == user_id) {
                    reaction.reactors.push(actor);
                }
            }
            None => message.reactions.push(Reaction::new(emoji.clone(), vec![actor])),
        }
    }

    fn unreact(&self, message_id: MessageId, emoji: &EmojiValue, user_id: UserId) {
        let mut messages = self.messages.lock().unwrap();
        let message = messages.get_mut(&message_id).unwrap();
        for reaction in message.reactions.iter_mut().filter(|r| &r.emoji == emoji) {
            reaction.reactors.retain(|a| a.id != user_id);
        }
        message.reactions.retain(|r| !r.reactors.is_empty());
    }

    fn delete_message(&self, message_id: MessageId) {
        self.messages.lock().unwrap().remove(&message_id);
    }

    fn is_marked(&self, message_id: MessageId) -> bool {
        let messages = self.messages.lock().unwrap();
        messages[&message_id]
            .reactors_of(&EmojiValue::symbol(COMPLETION_SYMBOL))
            .iter()
            .any(|a| a.id == BOT_ID)
    }

    fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn identities(&self) -> Vec<ProxyIdentity> {
        self.posts.lock().unwrap().iter().map(|(_, i)| i.clone()).collect()
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for Pond {
    fn self_id(&self) -> UserId {
        BOT_ID
    }

    async fn fetch_message(
        &self,
        _guild_id: Option<GuildId>,
        _channel_id: ChannelId,
        message_id: MessageId,
        matcher: &EmojiMatcher,
    ) -> Result<Message, RelayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RelayError::delivery("fetch member", "HTTP 503"));
        }
        let mut message = self
            .messages
            .lock()
            .unwrap()
            .get(&message_id)
            .cloned()
            .ok_or_else(|| RelayError::not_found("message", message_id))?;
        message.reactions.retain(|r| matcher.is_relevant(&r.emoji));
        Ok(message)
    }

    async fn fetch_actor(
        &self,
        _guild_id: Option<GuildId>,
        user_id: UserId,
    ) -> Result<Actor, RelayError> {
        self.members
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RelayError::not_found("member", user_id))
    }

    async fn add_reaction(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        emoji: &EmojiValue,
    ) -> Result<(), RelayError> {
        if !self.messages.lock().unwrap().contains_key(&message_id) {
            return Err(RelayError::not_found("message", message_id));
        }
        self.react(message_id, emoji, BOT_ID);
        Ok(())
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, RelayError> {
        if attachment.url.contains("expired") {
            return Err(RelayError::authorization_lost(&attachment.filename, "HTTP 403"));
        }
        Ok(vec![0u8; attachment.size as usize])
    }
}

#[async_trait]
impl ProxyChannel for Pond {
    async fn send_text(&self, content: &str, identity: &ProxyIdentity) -> Result<(), RelayError> {
        // Widen the window between "not marked yet" and "marked".
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.posts
            .lock()
            .unwrap()
            .push((Post::Text(content.into()), identity.clone()));
        Ok(())
    }

    async fn send_attachment(
        &self,
        filename: &str,
        _bytes: Vec<u8>,
        identity: &ProxyIdentity,
    ) -> Result<(), RelayError> {
        self.posts
            .lock()
            .unwrap()
            .push((Post::File(filename.into()), identity.clone()));
        Ok(())
    }

    async fn send_notice(&self, notice: &Notice, identity: &ProxyIdentity) -> Result<(), RelayError> {
        self.posts
            .lock()
            .unwrap()
            .push((Post::Notice(notice.clone()), identity.clone()));
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn duck() -> EmojiValue {
    EmojiValue::symbol(DUCK_SYMBOL)
}

fn checkmark() -> EmojiValue {
    EmojiValue::symbol(COMPLETION_SYMBOL)
}

fn staff(id: UserId) -> Actor {
    Actor::new(id, format!("staff-{id}")).with_roles([STAFF_ROLE, MEMBER_ROLE])
}

fn member(id: UserId) -> Actor {
    Actor::new(id, format!("member-{id}")).with_roles([MEMBER_ROLE])
}

fn config() -> RelayConfig {
    RelayConfig::new(42, [STAFF_ROLE])
        .with_threshold(5)
        .with_custom_emojis((0..4).map(|n| DUCKY_YELLOW + n))
}

fn engine_with(pond: &Arc<Pond>, config: RelayConfig) -> Arc<RelayEngine> {
    Arc::new(RelayEngine::new(
        Arc::new(config),
        Arc::clone(pond) as Arc<dyn MessageStore>,
        Arc::clone(pond) as Arc<dyn ProxyChannel>,
    ))
}

fn event(
    message_id: MessageId,
    actor_id: UserId,
    emoji: EmojiValue,
    polarity: Polarity,
) -> ReactionEvent {
    ReactionEvent {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        message_id,
        actor_id,
        emoji,
        polarity,
    }
}

/// React on the platform, then deliver the gateway event for it.
async fn add(
    pond: &Pond,
    engine: &RelayEngine,
    message_id: MessageId,
    user_id: UserId,
    emoji: EmojiValue,
) -> Outcome {
    pond.react(message_id, &emoji, user_id);
    let event = event(message_id, user_id, emoji, Polarity::Added);
    tokio::time::timeout(TEST_TIMEOUT, engine.on_reaction(&event))
        .await
        .expect("evaluation timed out")
}

/// Remove a reaction on the platform, then deliver the gateway event for it.
async fn remove(
    pond: &Pond,
    engine: &RelayEngine,
    message_id: MessageId,
    user_id: UserId,
    emoji: EmojiValue,
) -> Outcome {
    pond.unreact(message_id, &emoji, user_id);
    let event = event(message_id, user_id, emoji, Polarity::Removed);
    tokio::time::timeout(TEST_TIMEOUT, engine.on_reaction(&event))
        .await
        .expect("evaluation timed out")
}

fn seed_staff(pond: &Pond, ids: impl IntoIterator<Item = UserId>) {
    for id in ids {
        pond.join(staff(id));
    }
}

// ── Relaying ────────────────────────────────────────────────────────

#[tokio::test]
async fn fifth_staff_duck_relays_once_and_marks() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "look at this", vec![]);

    for (n, id) in (1..=4).enumerate() {
        let outcome = add(&pond, &engine, 10, id, duck()).await;
        assert_eq!(outcome, Outcome::BelowThreshold { count: n + 1 });
    }
    assert!(pond.posts().is_empty());

    let outcome = add(&pond, &engine, 10, 5, duck()).await;
    assert!(matches!(outcome, Outcome::Relayed { marked: true, .. }));
    assert_eq!(pond.posts(), vec![Post::Text("look at this".into())]);
    assert_eq!(pond.identities()[0].display_name, "Quackers");
    assert!(pond.is_marked(10));
}

#[tokio::test]
async fn custom_duck_emojis_count_toward_threshold() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "mixed ducks", vec![]);

    for id in 1..=4 {
        add(&pond, &engine, 10, id, EmojiValue::custom(DUCKY_YELLOW + id % 4)).await;
    }
    let outcome = add(&pond, &engine, 10, 5, duck()).await;

    assert!(matches!(outcome, Outcome::Relayed { .. }));
    assert_eq!(pond.posts().len(), 1);
}

#[tokio::test]
async fn one_staffer_with_every_duck_counts_once() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, [1]);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    add(&pond, &engine, 10, 1, duck()).await;
    let mut last = None;
    for offset in 0..4 {
        let emoji = EmojiValue::custom(DUCKY_YELLOW + offset);
        last = Some(add(&pond, &engine, 10, 1, emoji).await);
    }

    assert_eq!(last, Some(Outcome::BelowThreshold { count: 1 }));
    assert!(pond.posts().is_empty());
    assert!(!pond.is_marked(10));
}

#[tokio::test]
async fn untrusted_ducks_do_not_count() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=4);
    for id in 20..=22 {
        pond.join(member(id));
    }
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    for id in 20..=22 {
        let outcome = add(&pond, &engine, 10, id, duck()).await;
        assert_eq!(outcome, Outcome::Ignored(IgnoreReason::ActorUntrusted));
    }
    let mut last = None;
    for id in 1..=4 {
        last = Some(add(&pond, &engine, 10, id, duck()).await);
    }

    assert_eq!(last, Some(Outcome::BelowThreshold { count: 4 }));
    assert!(pond.posts().is_empty());
}

#[tokio::test]
async fn irretrievable_attachment_becomes_a_notice() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(
        10,
        Actor::new(50, "Quackers"),
        "",
        vec![Attachment {
            id: 7,
            filename: "duck.png".into(),
            size: 1024,
            url: "https://cdn.example/expired/duck.png".into(),
        }],
    );

    let mut last = None;
    for id in 1..=5 {
        last = Some(add(&pond, &engine, 10, id, duck()).await);
    }

    let Some(Outcome::Relayed { report, marked }) = last else {
        panic!("expected relay, got {last:?}");
    };
    assert!(marked);
    assert!(!report.text_delivered);
    assert_eq!(report.notices_delivered, 1);

    let posts = pond.posts();
    assert_eq!(posts.len(), 1);
    let Post::Notice(notice) = &posts[0] else {
        panic!("expected a notice, got {posts:?}");
    };
    assert_eq!(notice.description, IRRETRIEVABLE_ATTACHMENT);
    assert_eq!(notice.colour, NoticeColour::Error);
    assert!(pond.is_marked(10));
}

#[tokio::test]
async fn text_and_files_are_posted_as_the_author() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    let author = Actor::new(50, "Discord Duck").with_avatar("https://cdn.example/avatar.png");
    let files = (1..=2)
        .map(|id| Attachment {
            id,
            filename: format!("pic{id}.png"),
            size: 2048,
            url: format!("https://cdn.example/pic{id}.png"),
        })
        .collect();
    pond.post_message(10, author, "two pictures", files);

    for id in 1..=5 {
        add(&pond, &engine, 10, id, duck()).await;
    }

    assert_eq!(
        pond.posts(),
        vec![
            Post::Text("two pictures".into()),
            Post::File("pic1.png".into()),
            Post::File("pic2.png".into()),
        ]
    );
    for identity in pond.identities() {
        assert!(!identity.display_name.to_lowercase().contains("discord"));
        assert_eq!(identity.avatar_url.as_deref(), Some("https://cdn.example/avatar.png"));
    }
}

// ── Idempotence ─────────────────────────────────────────────────────

#[tokio::test]
async fn relayed_message_is_never_relayed_again() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=7);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    for id in 1..=5 {
        add(&pond, &engine, 10, id, duck()).await;
    }
    for id in 6..=7 {
        let outcome = add(&pond, &engine, 10, id, duck()).await;
        assert_eq!(outcome, Outcome::AlreadyRelayed);
    }

    assert_eq!(pond.posts().len(), 1);
}

#[tokio::test]
async fn redelivered_event_does_not_relay_twice() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    for id in 1..=5 {
        add(&pond, &engine, 10, id, duck()).await;
    }
    let again = engine
        .on_reaction_added(&event(10, 5, duck(), Polarity::Added))
        .await;

    assert_eq!(again, Outcome::AlreadyRelayed);
    assert_eq!(pond.posts().len(), 1);
}

#[tokio::test]
async fn concurrent_events_relay_exactly_once() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=8);
    pond.post_message(10, Actor::new(50, "Quackers"), "popular", vec![]);
    for id in 1..=8 {
        pond.react(10, &duck(), id);
    }

    let events: Vec<_> = (1..=8)
        .map(|id| event(10, id, duck(), Polarity::Added))
        .collect();
    let outcomes = tokio::time::timeout(
        TEST_TIMEOUT,
        join_all(events.iter().map(|e| engine.on_reaction_added(e))),
    )
    .await
    .expect("evaluations timed out");

    let relayed = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Relayed { .. }))
        .count();
    assert_eq!(relayed, 1);
    assert_eq!(
        outcomes.iter().filter(|o| **o == Outcome::AlreadyRelayed).count(),
        7
    );
    assert_eq!(pond.posts().len(), 1);
}

// ── Checkmark maintenance ───────────────────────────────────────────

#[tokio::test]
async fn removed_checkmark_is_restored_above_threshold() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    for id in 1..=5 {
        add(&pond, &engine, 10, id, duck()).await;
    }
    assert!(pond.is_marked(10));

    let outcome = remove(&pond, &engine, 10, BOT_ID, checkmark()).await;

    assert_eq!(outcome, Outcome::MarkerRestored);
    assert!(pond.is_marked(10));
    assert_eq!(pond.posts().len(), 1);
}

#[tokio::test]
async fn removed_checkmark_stays_off_below_threshold() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=3);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    for id in 1..=3 {
        pond.react(10, &duck(), id);
    }
    pond.react(10, &checkmark(), BOT_ID);

    let outcome = remove(&pond, &engine, 10, BOT_ID, checkmark()).await;

    assert_eq!(outcome, Outcome::MarkerLeftOff { count: 3 });
    assert!(!pond.is_marked(10));
}

#[tokio::test]
async fn removing_a_duck_is_not_a_checkmark_event() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, [1]);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    pond.react(10, &duck(), 1);

    let outcome = remove(&pond, &engine, 10, 1, duck()).await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::NotCompletionSymbol));
    assert_eq!(pond.fetches(), 0);
}

#[tokio::test]
async fn platform_failure_during_removal_does_not_leave_checkmark_off() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    for id in 1..=5 {
        add(&pond, &engine, 10, id, duck()).await;
    }

    pond.set_unavailable(true);
    let outcome = remove(&pond, &engine, 10, BOT_ID, checkmark()).await;
    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::FetchFailed));

    // The next evaluation sees the full count again and heals the message.
    pond.set_unavailable(false);
    let event = event(10, BOT_ID, checkmark(), Polarity::Removed);
    assert_eq!(engine.on_reaction(&event).await, Outcome::MarkerRestored);
    assert!(pond.is_marked(10));
    assert_eq!(pond.posts().len(), 1);
}

#[tokio::test]
async fn platform_failure_never_relays() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, 1..=5);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    for id in 1..=4 {
        add(&pond, &engine, 10, id, duck()).await;
    }

    pond.set_unavailable(true);
    let outcome = add(&pond, &engine, 10, 5, duck()).await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::FetchFailed));
    assert!(pond.posts().is_empty());
}

// ── Ignored events ──────────────────────────────────────────────────

#[tokio::test]
async fn non_trigger_emoji_does_no_io() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, [1]);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    let outcome = add(&pond, &engine, 10, 1, EmojiValue::symbol("\u{1F44D}")).await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::NotTriggerEmoji));
    assert_eq!(pond.fetches(), 0);
}

#[tokio::test]
async fn bot_reactions_are_ignored() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    pond.join(staff(77).bot());
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    let outcome = add(&pond, &engine, 10, 77, duck()).await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::ActorIsBot));
}

#[tokio::test]
async fn unknown_reactor_is_ignored() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    let outcome = engine
        .on_reaction_added(&event(10, 404, duck(), Polarity::Added))
        .await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::ActorUnknown));
}

#[tokio::test]
async fn foreign_guild_is_ignored_before_fetching() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config().with_guild(GUILD + 1));
    seed_staff(&pond, [1]);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    let outcome = add(&pond, &engine, 10, 1, duck()).await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::ForeignGuild));
    assert_eq!(pond.fetches(), 0);
}

#[tokio::test]
async fn deleted_message_is_ignored() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config());
    seed_staff(&pond, [1]);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);
    pond.react(10, &duck(), 1);
    pond.delete_message(10);

    let outcome = engine
        .on_reaction_added(&event(10, 1, duck(), Polarity::Added))
        .await;

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::MessageGone));
    assert!(pond.posts().is_empty());
}

#[tokio::test]
async fn threshold_is_configurable() {
    let pond = Pond::new();
    let engine = engine_with(&pond, config().with_threshold(2));
    seed_staff(&pond, 1..=2);
    pond.post_message(10, Actor::new(50, "Quackers"), "hi", vec![]);

    add(&pond, &engine, 10, 1, duck()).await;
    let outcome = add(&pond, &engine, 10, 2, duck()).await;

    assert!(matches!(outcome, Outcome::Relayed { .. }));
}
