//! Conversation history integration tests

use banter::conversation::{
    ConversationKey, ConversationStore, DEFAULT_MAX_HISTORY, Message, Role, Speaker, SystemPrompts,
};

fn user(n: usize) -> Message {
    Message::user(Speaker::Mention(1), format!("m{n}"))
}

fn contents(track: &[Message]) -> Vec<String> {
    track.iter().map(|m| m.content().to_string()).collect()
}

#[test]
fn test_overflow_keeps_most_recent() {
    let store = ConversationStore::new(DEFAULT_MAX_HISTORY, SystemPrompts::new("S"));
    let key = ConversationKey::text(1, Some(2));

    for n in 0..DEFAULT_MAX_HISTORY + 5 {
        store.append(&key, user(n));
    }

    let track = store.history(&key);
    assert_eq!(track.len(), DEFAULT_MAX_HISTORY);
    assert_eq!(track[0], Message::system("S"));

    let expected: Vec<String> = (6..DEFAULT_MAX_HISTORY + 5).map(|n| format!("m{n}")).collect();
    assert_eq!(contents(&track[1..]), expected);
}

#[test]
fn test_invariants_hold_for_any_sequence() {
    for max in [2, 3, 5, 20] {
        let store = ConversationStore::new(max, SystemPrompts::new("S"));
        let key = ConversationKey::voice(9);

        for n in 0..50 {
            let message = match n % 3 {
                0 => user(n),
                1 => Message::assistant(format!("r{n}")),
                _ => Message::user(Speaker::Name("kevin".to_string()), format!("k{n}")),
            };
            store.append(&key, message);

            let track = store.history(&key);
            assert_eq!(track[0].role(), Role::System, "max={max} n={n}");
            assert!(track.len() <= max, "max={max} n={n} len={}", track.len());
            assert!(
                track[1..].iter().all(|m| m.role() != Role::System),
                "system prompt duplicated"
            );
        }
    }
}

#[test]
fn test_window_is_read_only() {
    let store = ConversationStore::new(4, SystemPrompts::new("S"));
    let key = ConversationKey::text(1, None);
    for n in 0..3 {
        store.append(&key, user(n));
    }
    let before = store.history(&key);

    let probe = Message::user(Speaker::Mention(2), "probe");
    let first = store.window_for(&key, &probe);
    let second = store.window_for(&key, &probe);

    assert_eq!(first, second);
    assert_eq!(store.history(&key), before);
    assert_eq!(first.last(), Some(&probe));
    assert_eq!(contents(&first), vec!["S", "m0", "m1", "m2", "probe"]);
}

#[test]
fn test_window_is_bounded_like_history() {
    let store = ConversationStore::new(3, SystemPrompts::new("S"));
    let key = ConversationKey::text(1, None);
    for n in 0..10 {
        store.append(&key, user(n));
    }

    let window = store.window_for(&key, &user(99));
    assert_eq!(contents(&window), vec!["S", "m8", "m9", "m99"]);
}

#[test]
fn test_window_on_untouched_track() {
    let store = ConversationStore::new(20, SystemPrompts::new("S"));
    let key = ConversationKey::text(3, Some(4));

    let window = store.window_for(&key, &user(0));
    assert_eq!(contents(&window), vec!["S", "m0"]);
    assert!(store.is_empty(&key));
}

#[test]
fn test_tracks_are_independent() {
    let store = ConversationStore::new(20, SystemPrompts::new("S").with_voice("V"));
    let text = ConversationKey::text(10, Some(10));
    let voice = ConversationKey::voice(10);

    store.append(&text, user(1));
    store.append(&voice, Message::user(Speaker::Name("alice".to_string()), "hi"));
    store.append(&voice, Message::assistant("hello alice"));

    assert_eq!(store.len(&text), 2);
    assert_eq!(store.len(&voice), 3);
    assert_eq!(store.history(&text)[0].content(), "S");
    assert_eq!(store.history(&voice)[0].content(), "V");

    store.reset(&voice);
    assert_eq!(store.len(&voice), 1);
    assert_eq!(store.len(&text), 2);
}

#[test]
fn test_guild_prompt_selected_by_scope() {
    let prompts = SystemPrompts::new("default").with_guild(77, "guild seventy-seven");
    let store = ConversationStore::new(20, prompts);

    let in_guild = ConversationKey::text(1, Some(77));
    let elsewhere = ConversationKey::text(2, Some(78));
    let dm = ConversationKey::text(3, None);

    for key in [&in_guild, &elsewhere, &dm] {
        store.append(key, user(0));
    }

    assert_eq!(store.history(&in_guild)[0].content(), "guild seventy-seven");
    assert_eq!(store.history(&elsewhere)[0].content(), "default");
    assert_eq!(store.history(&dm)[0].content(), "default");

    store.reset(&in_guild);
    assert_eq!(store.history(&in_guild), vec![Message::system("guild seventy-seven")]);
}

#[test]
fn test_concurrent_appends_respect_cap() {
    let store = std::sync::Arc::new(ConversationStore::new(8, SystemPrompts::new("S")));
    let key = ConversationKey::text(1, None);

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 0..100 {
                    store.append(&key, user(t * 1000 + n));
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let track = store.history(&key);
    assert_eq!(track.len(), 8);
    assert_eq!(track[0].role(), Role::System);
}
