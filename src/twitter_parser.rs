use crate::twitter_message::{EventEnvelope, Tweet, User};
use serde_json::Value;

/// One decoded stream message, tagged by what it carries.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Tweet(Box<Tweet>),
    Follow(EventEnvelope),
    Favorite(FavoriteEvent),
    Mute(User),
    Unmute(User),
    /// The friend id list sent when a stream opens; not rendered.
    FriendsSnapshot,
    /// Any shape we do not render; skipped without complaint.
    Unrecognized,
}

/// A favorite notification paired with the tweet it refers to.
#[derive(Debug, Clone)]
pub struct FavoriteEvent {
    pub event: EventEnvelope,
    pub tweet: Tweet,
}

/// Classify a decoded object by field presence: an `event` discriminator first,
/// then a `text` field for tweets, then the `friends` snapshot.
pub fn classify(object: Value) -> StreamEvent {
    let Value::Object(map) = object else {
        return StreamEvent::Unrecognized;
    };

    if let Some(name) = map.get("event").and_then(Value::as_str).map(str::to_owned) {
        return classify_event(&name, map);
    }

    if map.contains_key("text") {
        return match serde_json::from_value::<Tweet>(Value::Object(map)) {
            Ok(tweet) => StreamEvent::Tweet(Box::new(tweet)),
            Err(e) => {
                tracing::debug!("skipping undecodable tweet: {e}");
                StreamEvent::Unrecognized
            }
        };
    }

    if map.contains_key("friends") {
        return StreamEvent::FriendsSnapshot;
    }

    StreamEvent::Unrecognized
}

fn classify_event(name: &str, mut map: serde_json::Map<String, Value>) -> StreamEvent {
    let target_object = map.remove("target_object");
    let envelope: EventEnvelope = match serde_json::from_value(Value::Object(map)) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("skipping undecodable {name} event: {e}");
            return StreamEvent::Unrecognized;
        }
    };

    match name {
        "favorite" => {
            let Some(tweet) = target_object.and_then(|t| serde_json::from_value::<Tweet>(t).ok())
            else {
                return StreamEvent::Unrecognized;
            };
            StreamEvent::Favorite(FavoriteEvent {
                event: envelope,
                tweet,
            })
        }
        "follow" => StreamEvent::Follow(envelope),
        "mute" => StreamEvent::Mute(envelope.target),
        "unmute" => StreamEvent::Unmute(envelope.target),
        _ => StreamEvent::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_plain_tweet() {
        let event = classify(json!({"id_str": "1", "text": "hello", "user": {"id_str": "9"}}));
        match event {
            StreamEvent::Tweet(tweet) => {
                assert_eq!(tweet.text, "hello");
                assert_eq!(tweet.user.id_str, "9");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_favorite_pairs_event_and_tweet() {
        let input = json!({
            "event": "favorite",
            "source": {"id_str": "1", "screen_name": "fan"},
            "target": {"id_str": "2", "screen_name": "author"},
            "target_object": {"id_str": "77", "text": "liked", "user": {"id_str": "2"}},
            "created_at": "Wed Feb 24 12:34:56 +0000 2016"
        });
        let original = input.clone();

        match classify(input.clone()) {
            StreamEvent::Favorite(fav) => {
                assert_eq!(fav.event.source.screen_name, "fan");
                assert_eq!(fav.tweet.id_str, "77");
                assert_eq!(fav.tweet.user.id_str, "2");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(input, original);
    }

    #[test]
    fn test_classify_favorite_without_tweet_is_ignored() {
        let event = classify(json!({"event": "favorite", "source": {}, "target": {}}));
        assert!(matches!(event, StreamEvent::Unrecognized));
    }

    #[test]
    fn test_classify_follow() {
        let event = classify(json!({
            "event": "follow",
            "source": {"screen_name": "a"},
            "target": {"screen_name": "b"}
        }));
        match event {
            StreamEvent::Follow(envelope) => {
                assert_eq!(envelope.source.screen_name, "a");
                assert_eq!(envelope.target.screen_name, "b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_mute_and_unmute() {
        let mute = classify(json!({"event": "mute", "target": {"id_str": "42"}}));
        assert!(matches!(mute, StreamEvent::Mute(ref u) if u.id_str == "42"));

        let unmute = classify(json!({"event": "unmute", "target": {"id_str": "42"}}));
        assert!(matches!(unmute, StreamEvent::Unmute(ref u) if u.id_str == "42"));
    }

    #[test]
    fn test_classify_friends_and_unknown() {
        assert!(matches!(
            classify(json!({"friends": [1, 2, 3]})),
            StreamEvent::FriendsSnapshot
        ));
        assert!(matches!(
            classify(json!({"delete": {"status": {"id": 1}}})),
            StreamEvent::Unrecognized
        ));
        assert!(matches!(
            classify(json!({"event": "unfavorite", "source": {}, "target": {}})),
            StreamEvent::Unrecognized
        ));
        assert!(matches!(classify(json!([1, 2])), StreamEvent::Unrecognized));
    }
}
