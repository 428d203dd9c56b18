//! Transaction classifier
//!
//! Walks the ordered event stream one event at a time and decides, against
//! the current target set, whether the event registers new reward-relevant
//! content, earns its sender a reward, or matches nothing. The decision
//! policy is a strict priority order; earlier rules win:
//!
//! 1. owner post/comment   -> reward OWNER_POST/OWNER_COMMENT + register target
//! 2. owner like            -> register liked content as a `user` target
//! 3. comment matching a `user` target -> reward LIKED + upgrade the target
//! 4. like on an `owner` target        -> reward LIKE
//! 5. comment replying to an `owner` target -> reward COMMENT
//!
//! Rule 3 outranks 4/5: once an owner has liked a comment, that comment's
//! author is rewarded via LIKED even when the comment also replies to an
//! owner post. Missing or malformed ids degrade to `NoMatch`, never an
//! error.

use std::collections::HashSet;

use tracing::warn;

use crate::error::MannaError;
use crate::feed::{Event, EventKind};
use crate::rewards::RewardKind;

/// Target role: content authored by a monitored owner, or content authored
/// by anyone else but liked by an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::User => "user",
        }
    }
}

/// A target registration to apply to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReg {
    /// None for records seeded without an originating event (owner likes)
    pub event_id: Option<String>,
    pub content_id: Option<String>,
    pub role: Role,
    pub sender_key: Option<String>,
}

/// Attach the commenter's identity to a previously seeded `user` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUpgrade {
    pub content_id: String,
    pub event_id: String,
    pub sender_key: String,
}

/// A reward earned by the event's sender, plus any target mutation the
/// same event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTrigger {
    pub kind: RewardKind,
    pub target_content_id: Option<String>,
    pub registration: Option<TargetReg>,
    pub upgrade: Option<TargetUpgrade>,
}

/// Tagged classification result; the priority order above made visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NoMatch,
    Registered(TargetReg),
    Reward(RewardTrigger),
}

/// Membership view over the registered targets. The store implements this
/// over the live transaction; tests use an in-memory set.
pub trait TargetLookup {
    fn is_target(&self, content_id: &str, role: Role) -> Result<bool, MannaError>;
}

/// Liked-object resolution: legacy counters nest the liked item one level
/// deeper; the nested form wins when present.
fn liked_object_id(event: &Event) -> Option<String> {
    event
        .content
        .nested_object_id
        .clone()
        .or_else(|| event.content.object_id.clone())
}

/// Classify one event against the owner set and the registered targets.
pub fn classify(
    event: &Event,
    owners: &HashSet<String>,
    targets: &dyn TargetLookup,
) -> Result<Classification, MannaError> {
    if matches!(event.kind, EventKind::Other) {
        return Ok(Classification::NoMatch);
    }

    let content_id = event.content.object_id.clone();
    if content_id.is_none() {
        // Anomalous but not fatal; visibility only.
        warn!(event_id = %event.id, kind = event.kind.as_str(), "Event has no content id");
    }

    let is_owner = owners.contains(&event.sender_key);

    if is_owner {
        return Ok(match event.kind {
            EventKind::Post | EventKind::Comment => {
                let kind = if event.kind == EventKind::Post {
                    RewardKind::OwnerPost
                } else {
                    RewardKind::OwnerComment
                };
                Classification::Reward(RewardTrigger {
                    kind,
                    target_content_id: content_id.clone(),
                    registration: Some(TargetReg {
                        event_id: Some(event.id.clone()),
                        content_id,
                        role: Role::Owner,
                        sender_key: Some(event.sender_key.clone()),
                    }),
                    upgrade: None,
                })
            }
            // Owner liked something: mark it reward-eligible for its author.
            // No reward for the owner's like itself.
            EventKind::Counter => Classification::Registered(TargetReg {
                event_id: None,
                content_id: liked_object_id(event),
                role: Role::User,
                sender_key: None,
            }),
            _ => Classification::NoMatch,
        });
    }

    // Rule 3: a comment an owner liked before it materialized
    if event.kind == EventKind::Comment {
        if let Some(ref cid) = content_id {
            if targets.is_target(cid, Role::User)? {
                return Ok(Classification::Reward(RewardTrigger {
                    kind: RewardKind::Liked,
                    target_content_id: Some(cid.clone()),
                    registration: None,
                    upgrade: Some(TargetUpgrade {
                        content_id: cid.clone(),
                        event_id: event.id.clone(),
                        sender_key: event.sender_key.clone(),
                    }),
                }));
            }
        }
    }

    // Rule 4: a like on owner content
    if event.kind == EventKind::Counter {
        if let Some(liked_id) = liked_object_id(event) {
            if targets.is_target(&liked_id, Role::Owner)? {
                return Ok(Classification::Reward(RewardTrigger {
                    kind: RewardKind::Like,
                    target_content_id: Some(liked_id),
                    registration: None,
                    upgrade: None,
                }));
            }
        }
        return Ok(Classification::NoMatch);
    }

    // Rule 5: a comment replying to owner content
    if event.kind == EventKind::Comment {
        if let Some(ref reply_to) = event.content.in_reply_to {
            if targets.is_target(reply_to, Role::Owner)? {
                return Ok(Classification::Reward(RewardTrigger {
                    kind: RewardKind::Comment,
                    target_content_id: Some(reply_to.clone()),
                    registration: None,
                    upgrade: None,
                }));
            }
        }
    }

    Ok(Classification::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EventContent;

    struct FakeTargets(HashSet<(String, &'static str)>);

    impl FakeTargets {
        fn new() -> Self {
            Self(HashSet::new())
        }

        fn with(mut self, content_id: &str, role: Role) -> Self {
            self.0.insert((content_id.to_string(), role.as_str()));
            self
        }
    }

    impl TargetLookup for FakeTargets {
        fn is_target(&self, content_id: &str, role: Role) -> Result<bool, MannaError> {
            Ok(self.0.contains(&(content_id.to_string(), role.as_str())))
        }
    }

    fn owners() -> HashSet<String> {
        ["owner-key".to_string()].into_iter().collect()
    }

    fn event(id: &str, sender: &str, kind: EventKind, content: EventContent) -> Event {
        Event {
            id: id.to_string(),
            sender_key: sender.to_string(),
            timestamp: 1_684_100_000,
            kind,
            content,
        }
    }

    fn with_object(id: &str) -> EventContent {
        EventContent {
            object_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_owner_post_registers_and_rewards() {
        let c = classify(
            &event("t1", "owner-key", EventKind::Post, with_object("p1")),
            &owners(),
            &FakeTargets::new(),
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => {
                assert_eq!(trigger.kind, RewardKind::OwnerPost);
                assert_eq!(trigger.target_content_id.as_deref(), Some("p1"));
                let reg = trigger.registration.unwrap();
                assert_eq!(reg.role, Role::Owner);
                assert_eq!(reg.event_id.as_deref(), Some("t1"));
            }
            other => panic!("expected reward, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_comment_rewards_owner_comment() {
        let c = classify(
            &event("t1", "owner-key", EventKind::Comment, EventContent {
                object_id: Some("c1".to_string()),
                in_reply_to: Some("p0".to_string()),
                nested_object_id: None,
            }),
            &owners(),
            &FakeTargets::new(),
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => assert_eq!(trigger.kind, RewardKind::OwnerComment),
            other => panic!("expected reward, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_like_seeds_user_target_without_reward() {
        let c = classify(
            &event("t1", "owner-key", EventKind::Counter, with_object("c1")),
            &owners(),
            &FakeTargets::new(),
        )
        .unwrap();

        match c {
            Classification::Registered(reg) => {
                assert_eq!(reg.role, Role::User);
                assert_eq!(reg.content_id.as_deref(), Some("c1"));
                assert_eq!(reg.event_id, None);
                assert_eq!(reg.sender_key, None);
            }
            other => panic!("expected registration, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_relation_is_no_match() {
        let c = classify(
            &event("t1", "owner-key", EventKind::Relation, EventContent::default()),
            &owners(),
            &FakeTargets::new(),
        )
        .unwrap();
        assert_eq!(c, Classification::NoMatch);
    }

    #[test]
    fn test_liked_takes_priority_over_comment() {
        // C1 was liked by an owner (user target) AND replies to an owner
        // post. LIKED must win.
        let targets = FakeTargets::new()
            .with("c1", Role::User)
            .with("p1", Role::Owner);

        let c = classify(
            &event("t9", "user-key", EventKind::Comment, EventContent {
                object_id: Some("c1".to_string()),
                in_reply_to: Some("p1".to_string()),
                nested_object_id: None,
            }),
            &owners(),
            &targets,
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => {
                assert_eq!(trigger.kind, RewardKind::Liked);
                let up = trigger.upgrade.unwrap();
                assert_eq!(up.content_id, "c1");
                assert_eq!(up.sender_key, "user-key");
            }
            other => panic!("expected LIKED, got {:?}", other),
        }
    }

    #[test]
    fn test_like_on_owner_target() {
        let targets = FakeTargets::new().with("p1", Role::Owner);

        let c = classify(
            &event("t2", "user-key", EventKind::Counter, with_object("p1")),
            &owners(),
            &targets,
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => {
                assert_eq!(trigger.kind, RewardKind::Like);
                assert_eq!(trigger.target_content_id.as_deref(), Some("p1"));
            }
            other => panic!("expected LIKE, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_nested_counter_id_wins() {
        let targets = FakeTargets::new().with("p1", Role::Owner);

        let c = classify(
            &event("t2", "user-key", EventKind::Counter, EventContent {
                object_id: Some("wrapper".to_string()),
                in_reply_to: None,
                nested_object_id: Some("p1".to_string()),
            }),
            &owners(),
            &targets,
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => {
                assert_eq!(trigger.kind, RewardKind::Like);
                assert_eq!(trigger.target_content_id.as_deref(), Some("p1"));
            }
            other => panic!("expected LIKE, got {:?}", other),
        }
    }

    #[test]
    fn test_counter_never_falls_through_to_comment_rule() {
        // A like on unregistered content is NoMatch even though its id
        // happens to match an owner target under the comment rule's field.
        let targets = FakeTargets::new().with("p1", Role::Owner);

        let c = classify(
            &event("t2", "user-key", EventKind::Counter, with_object("unknown")),
            &owners(),
            &targets,
        )
        .unwrap();
        assert_eq!(c, Classification::NoMatch);
    }

    #[test]
    fn test_comment_on_owner_target() {
        let targets = FakeTargets::new().with("p1", Role::Owner);

        let c = classify(
            &event("t3", "user-key", EventKind::Comment, EventContent {
                object_id: Some("c1".to_string()),
                in_reply_to: Some("p1".to_string()),
                nested_object_id: None,
            }),
            &owners(),
            &targets,
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => assert_eq!(trigger.kind, RewardKind::Comment),
            other => panic!("expected COMMENT, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_ids_degrade_to_no_match() {
        let targets = FakeTargets::new().with("p1", Role::Owner);

        // Counter with no id at all
        let c = classify(
            &event("t4", "user-key", EventKind::Counter, EventContent::default()),
            &owners(),
            &targets,
        )
        .unwrap();
        assert_eq!(c, Classification::NoMatch);

        // Comment with no inreplyto
        let c = classify(
            &event("t5", "user-key", EventKind::Comment, with_object("c9")),
            &owners(),
            &targets,
        )
        .unwrap();
        assert_eq!(c, Classification::NoMatch);
    }

    #[test]
    fn test_idless_owner_post_still_rewards() {
        let c = classify(
            &event("t6", "owner-key", EventKind::Post, EventContent::default()),
            &owners(),
            &FakeTargets::new(),
        )
        .unwrap();

        match c {
            Classification::Reward(trigger) => {
                assert_eq!(trigger.kind, RewardKind::OwnerPost);
                assert_eq!(trigger.target_content_id, None);
                assert_eq!(trigger.registration.unwrap().content_id, None);
            }
            other => panic!("expected reward, got {:?}", other),
        }
    }
}
